//! Runtime settings stored in the `settings` table
//!
//! Values are text; typed accessors parse them and fall back to the
//! supplied default when a row is missing or malformed.

use crate::Result;
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{info, warn};

pub const VOTING_SWEEP_INTERVAL_SECS: &str = "voting_sweep_interval_secs";
pub const OPENAI_MAX_ATTEMPTS: &str = "openai_max_attempts";
pub const OPENAI_RETRY_BASE_MS: &str = "openai_retry_base_ms";
pub const PLAYHT_POLL_INTERVAL_MS: &str = "playht_poll_interval_ms";
pub const PLAYHT_MAX_POLLS: &str = "playht_max_polls";
pub const EVENT_HEARTBEAT_SECS: &str = "event_heartbeat_secs";

/// Ensure every runtime setting exists; NULL values are reset
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // Governance
    ensure_setting(pool, VOTING_SWEEP_INTERVAL_SECS, "60").await?;

    // Digest generation
    ensure_setting(pool, OPENAI_MAX_ATTEMPTS, "3").await?;
    ensure_setting(pool, OPENAI_RETRY_BASE_MS, "500").await?;
    ensure_setting(pool, PLAYHT_POLL_INTERVAL_MS, "2000").await?;
    ensure_setting(pool, PLAYHT_MAX_POLLS, "30").await?;

    // Event stream
    ensure_setting(pool, EVENT_HEARTBEAT_SECS, "15").await?;

    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// A missing row is created; a NULL value is reset to the default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match value {
        None => {
            // OR IGNORE: two pools may initialize the same file concurrently
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;
            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
        Some(None) => {
            sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
                .bind(default_value)
                .bind(key)
                .execute(pool)
                .await?;
            warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}

/// Raw setting value, if present and non-NULL
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
    Ok(value.flatten())
}

/// Typed setting with fallback
pub async fn get_setting_or<T>(pool: &SqlitePool, key: &str, default: T) -> Result<T>
where
    T: FromStr,
{
    Ok(match get_setting(pool, key).await? {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!("Setting '{}' has unparseable value '{}'; using default", key, raw);
                default
            }
        },
        None => default,
    })
}

pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}
