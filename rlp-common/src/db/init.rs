//! Database initialization
//!
//! Creates the SQLite file on first run, applies pragmas, creates every
//! table idempotently, runs migrations and seeds defaults. Uniqueness
//! (one vote per wallet per proposal, one digest per week) and the
//! funding ceiling are enforced by the schema as well as in code.

use crate::studio::{RoomPricing, StudioRoom};
use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (creating if needed) the platform database at `db_path`
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    prepare_schema(&pool).await?;
    Ok(pool)
}

/// In-memory database with the full schema, for tests and tooling
///
/// Limited to one connection: every SQLite `:memory:` connection is a
/// separate database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    prepare_schema(&pool).await?;
    Ok(pool)
}

async fn prepare_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;

    // Governance
    create_members_table(pool).await?;
    create_proposals_table(pool).await?;
    create_votes_table(pool).await?;
    create_treasury_table(pool).await?;

    // Studio
    create_room_pricing_table(pool).await?;
    create_studio_sessions_table(pool).await?;

    // Digests
    create_digests_table(pool).await?;

    crate::db::migrations::run_migrations(pool).await?;

    crate::db::settings::init_default_settings(pool).await?;
    seed_room_pricing(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores runtime configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_members_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dao_members (
            wallet_address TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            email TEXT,
            tier TEXT NOT NULL CHECK (tier IN ('Bronze', 'Silver', 'Gold', 'Platinum')),
            active INTEGER NOT NULL DEFAULT 1,
            joined_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_proposals_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dao_proposals (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            category TEXT NOT NULL,
            proposer_wallet TEXT NOT NULL REFERENCES dao_members(wallet_address),
            funding_goal_cents INTEGER NOT NULL CHECK (funding_goal_cents > 0),
            current_funding_cents INTEGER NOT NULL DEFAULT 0
                CHECK (current_funding_cents >= 0 AND current_funding_cents <= funding_goal_cents),
            status TEXT NOT NULL DEFAULT 'draft',
            quorum_weight INTEGER NOT NULL,
            approval_threshold INTEGER NOT NULL,
            voting_duration_days INTEGER NOT NULL,
            votes_for_weight INTEGER NOT NULL DEFAULT 0,
            votes_against_weight INTEGER NOT NULL DEFAULT 0,
            votes_abstain_weight INTEGER NOT NULL DEFAULT 0,
            voter_count INTEGER NOT NULL DEFAULT 0,
            voting_starts_at TEXT,
            voting_ends_at TEXT,
            closed_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_proposals_status ON dao_proposals(status)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_votes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dao_votes (
            id TEXT PRIMARY KEY,
            proposal_id TEXT NOT NULL REFERENCES dao_proposals(id),
            voter_wallet TEXT NOT NULL REFERENCES dao_members(wallet_address),
            choice TEXT NOT NULL CHECK (choice IN ('for', 'against', 'abstain')),
            tier TEXT NOT NULL,
            weight INTEGER NOT NULL CHECK (weight > 0),
            reason TEXT,
            cast_at TEXT NOT NULL,
            UNIQUE (proposal_id, voter_wallet)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_treasury_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dao_treasury (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK (kind IN ('inflow', 'outflow')),
            amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
            description TEXT NOT NULL,
            category TEXT NOT NULL,
            proposal_id TEXT REFERENCES dao_proposals(id),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_room_pricing_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS room_pricing (
            room TEXT PRIMARY KEY,
            hourly_rate_cents INTEGER NOT NULL CHECK (hourly_rate_cents >= 0),
            half_day_rate_cents INTEGER NOT NULL CHECK (half_day_rate_cents >= 0),
            full_day_rate_cents INTEGER NOT NULL CHECK (full_day_rate_cents >= 0),
            active INTEGER NOT NULL DEFAULT 1,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_studio_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS studio_sessions (
            id TEXT PRIMARY KEY,
            room TEXT NOT NULL REFERENCES room_pricing(room),
            session_date TEXT NOT NULL,
            start_hour INTEGER NOT NULL,
            duration_hours INTEGER NOT NULL CHECK (duration_hours > 0),
            booker_name TEXT NOT NULL,
            booker_email TEXT NOT NULL,
            artist_name TEXT,
            notes TEXT,
            total_cents INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_studio_sessions_day ON studio_sessions(room, session_date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_digests_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ai_digests (
            id TEXT PRIMARY KEY,
            week_start TEXT NOT NULL UNIQUE,
            week_end TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            stats_json TEXT NOT NULL,
            model TEXT,
            audio_url TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert default rates for any room without a pricing row
async fn seed_room_pricing(pool: &SqlitePool) -> Result<()> {
    for room in StudioRoom::ALL {
        let pricing = RoomPricing::default_for(room);
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO room_pricing
                (room, hourly_rate_cents, half_day_rate_cents, full_day_rate_cents, active)
            VALUES (?, ?, ?, ?, 1)
            "#,
        )
        .bind(room.as_str())
        .bind(pricing.hourly_rate_cents)
        .bind(pricing.half_day_rate_cents)
        .bind(pricing.full_day_rate_cents)
        .execute(pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            info!("Seeded pricing for {}", room.display_name());
        }
    }
    Ok(())
}
