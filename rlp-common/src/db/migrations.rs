//! Versioned schema migrations
//!
//! Tables are created with their current shape by `init`, so each
//! migration checks for the change it makes before applying it. That keeps
//! fresh databases and upgraded ones converging on the same schema.
//! Never edit a released migration; add a new one.

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Increment when adding a migration
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Latest applied version, 0 when none
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    Ok(())
}

async fn has_column(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

/// v1: record when a proposal's voting closed
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    if has_column(pool, "dao_proposals", "closed_at").await? {
        return Ok(());
    }
    sqlx::query("ALTER TABLE dao_proposals ADD COLUMN closed_at TEXT")
        .execute(pool)
        .await?;
    info!("  Added closed_at column to dao_proposals");
    Ok(())
}

/// v2: lookup indexes for vote listings, ledger ordering and session status
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_votes_proposal ON dao_votes(proposal_id, cast_at)",
        "CREATE INDEX IF NOT EXISTS idx_treasury_created ON dao_treasury(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_studio_sessions_status ON studio_sessions(status)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
