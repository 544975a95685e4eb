//! rlp-server - Record label platform backend
//!
//! Starts the HTTP API, the voting sweeper and the weekly digest schedule.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rlp_common::config::{
    resolve_secret, CompiledDefaults, RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use rlp_common::db::{self as common_db, get_setting_or};
use rlp_common::events::EventBus;
use rlp_server::services::digest::DigestService;
use rlp_server::services::discord::DiscordWebhook;
use rlp_server::services::email::ResendClient;
use rlp_server::services::openai::OpenAiClient;
use rlp_server::services::playht::{PlayHtClient, PollSettings};
use rlp_server::services::retry::RetryConfig;
use rlp_server::services::scheduler::{spawn_digest_scheduler, spawn_voting_sweeper, WeeklyCadence};
use rlp_server::services::Notifier;
use rlp_server::{build_router, AppState, DEFAULT_EVENT_CAPACITY};

const MODULE_NAME: &str = "rlp-server";

/// Command-line arguments for rlp-server
#[derive(Parser, Debug)]
#[command(name = "rlp-server")]
#[command(about = "Record label platform: DAO governance, studio booking and weekly digests")]
#[command(version)]
struct Args {
    /// Root folder holding the database (overrides env and config)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// TOML config file (default: ~/.config/rlp/rlp-server.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:5780
    #[arg(short, long, env = "RLP_BIND")]
    bind: Option<String>,
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_config_file(args.config.clone());
    let config = resolver.load_config();

    init_tracing(&config)?;

    // Log build identification immediately after tracing init
    info!(
        "Starting rlp-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if let Some(path) = resolver.config_path() {
        info!("Config file: {}", path.display());
    }

    let root_folder = resolver.resolve_with(&config);
    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());
    let pool = common_db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let event_bus = EventBus::new(DEFAULT_EVENT_CAPACITY);
    let notifier = build_notifier(&config);
    let digests = build_digest_service(&config, &pool, &event_bus).await?;

    let heartbeat_secs: u64 = get_setting_or(&pool, common_db::EVENT_HEARTBEAT_SECS, 15).await?;
    let sweep_secs: u64 = get_setting_or(&pool, common_db::VOTING_SWEEP_INTERVAL_SECS, 60).await?;

    let shutdown = CancellationToken::new();
    let mut jobs = vec![spawn_voting_sweeper(
        pool.clone(),
        event_bus.clone(),
        notifier.clone(),
        Duration::from_secs(sweep_secs.max(1)),
        shutdown.clone(),
    )];

    if config.digest.enabled {
        match WeeklyCadence::from_config(&config.digest) {
            Ok(cadence) => jobs.push(spawn_digest_scheduler(digests.clone(), cadence, shutdown.clone())),
            Err(e) => warn!("Weekly digest disabled: {}", e),
        }
    } else {
        info!("Weekly digest schedule disabled in config");
    }

    let state = AppState::new(pool.clone(), event_bus, notifier, digests)
        .with_heartbeat(Duration::from_secs(heartbeat_secs.max(1)));
    let app = build_router(state);

    let bind = args
        .bind
        .or(config.bind_address.clone())
        .unwrap_or_else(|| CompiledDefaults::for_current_platform().bind_address);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("rlp-server listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    for job in jobs {
        let _ = job.await;
    }
    pool.close().await;

    info!("Server shutdown complete");
    Ok(())
}

fn build_notifier(config: &TomlConfig) -> Notifier {
    let integrations = &config.integrations;

    let discord = resolve_secret("RLP_DISCORD_WEBHOOK_URL", integrations.discord_webhook_url.as_ref())
        .and_then(|url| match DiscordWebhook::new(url) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("Discord notifications disabled: {}", e);
                None
            }
        });
    let email = resolve_secret("RLP_RESEND_API_KEY", integrations.resend_api_key.as_ref()).and_then(|key| {
        match ResendClient::new(
            key,
            integrations.email_from.clone(),
            integrations.resend_base_url.clone(),
        ) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("Email notifications disabled: {}", e);
                None
            }
        }
    });

    let notifier = Notifier::new(discord, email);
    info!(
        discord = notifier.discord_enabled(),
        email = notifier.email_enabled(),
        "Notification integrations"
    );
    notifier
}

async fn build_digest_service(
    config: &TomlConfig,
    pool: &sqlx::SqlitePool,
    event_bus: &EventBus,
) -> Result<DigestService> {
    let integrations = &config.integrations;

    let retry = RetryConfig {
        max_attempts: get_setting_or(pool, common_db::OPENAI_MAX_ATTEMPTS, 3).await?,
        base_delay_ms: get_setting_or(pool, common_db::OPENAI_RETRY_BASE_MS, 500).await?,
        ..RetryConfig::default()
    };
    let openai = match resolve_secret("RLP_OPENAI_API_KEY", integrations.openai_api_key.as_ref()) {
        Some(key) => Some(
            OpenAiClient::new(
                key,
                integrations.openai_base_url.clone(),
                integrations.openai_model.clone(),
                retry,
            )
            .context("Failed to build OpenAI client")?,
        ),
        None => {
            info!("No OpenAI key configured; digests use the built-in summary");
            None
        }
    };

    let poll = PollSettings {
        interval: Duration::from_millis(get_setting_or(pool, common_db::PLAYHT_POLL_INTERVAL_MS, 2000).await?),
        max_polls: get_setting_or(pool, common_db::PLAYHT_MAX_POLLS, 30).await?,
    };
    let playht = match (
        resolve_secret("RLP_PLAYHT_USER_ID", integrations.playht_user_id.as_ref()),
        resolve_secret("RLP_PLAYHT_API_KEY", integrations.playht_api_key.as_ref()),
    ) {
        (Some(user_id), Some(api_key)) => Some(
            PlayHtClient::new(
                user_id,
                api_key,
                integrations.playht_voice.clone(),
                integrations.playht_base_url.clone(),
                poll,
            )
            .context("Failed to build Play.ht client")?,
        ),
        _ => None,
    };
    if config.digest.narrate && playht.is_none() {
        warn!("Digest narration requested but Play.ht credentials are missing");
    }

    Ok(DigestService::new(
        pool.clone(),
        event_bus.clone(),
        openai,
        playht,
        config.digest.narrate,
    ))
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
