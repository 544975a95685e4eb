//! `ai_digests` table

use chrono::{DateTime, Utc};
use rlp_common::{time, Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{parse_column, parse_uuid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestStatus {
    Pending,
    Generated,
    Narrated,
    Failed,
}

impl DigestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestStatus::Pending => "pending",
            DigestStatus::Generated => "generated",
            DigestStatus::Narrated => "narrated",
            DigestStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DigestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DigestStatus::Pending),
            "generated" => Ok(DigestStatus::Generated),
            "narrated" => Ok(DigestStatus::Narrated),
            "failed" => Ok(DigestStatus::Failed),
            other => Err(format!("Unknown digest status: {}", other)),
        }
    }
}

/// A weekly digest row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    pub id: Uuid,
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub title: String,
    pub content: String,
    pub stats: serde_json::Value,
    /// Model that wrote the text; None for the built-in fallback
    pub model: Option<String>,
    pub audio_url: Option<String>,
    pub status: DigestStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SELECT_DIGEST: &str = r#"
    SELECT id, week_start, week_end, title, content, stats_json, model, audio_url,
           status, error, created_at, updated_at
    FROM ai_digests
"#;

fn digest_from_row(row: &SqliteRow) -> Result<Digest> {
    let stats_json: String = row.try_get("stats_json")?;
    Ok(Digest {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        week_start: time::parse_db(&row.try_get::<String, _>("week_start")?)?,
        week_end: time::parse_db(&row.try_get::<String, _>("week_end")?)?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        stats: serde_json::from_str(&stats_json)
            .map_err(|e| Error::Internal(format!("Invalid stored digest stats: {}", e)))?,
        model: row.try_get("model")?,
        audio_url: row.try_get("audio_url")?,
        status: parse_column(&row.try_get::<String, _>("status")?)?,
        error: row.try_get("error")?,
        created_at: time::parse_db(&row.try_get::<String, _>("created_at")?)?,
        updated_at: time::parse_db(&row.try_get::<String, _>("updated_at")?)?,
    })
}

/// Insert or replace the digest for `digest.week_start`
///
/// Regenerating a week keeps the original id and created_at.
pub async fn upsert_digest(pool: &SqlitePool, digest: &Digest) -> Result<Digest> {
    let stats_json = serde_json::to_string(&digest.stats)
        .map_err(|e| Error::Internal(format!("Serialize digest stats failed: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO ai_digests (
            id, week_start, week_end, title, content, stats_json, model, audio_url,
            status, error, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(week_start) DO UPDATE SET
            week_end = excluded.week_end,
            title = excluded.title,
            content = excluded.content,
            stats_json = excluded.stats_json,
            model = excluded.model,
            audio_url = excluded.audio_url,
            status = excluded.status,
            error = excluded.error,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(digest.id.to_string())
    .bind(time::to_db(digest.week_start))
    .bind(time::to_db(digest.week_end))
    .bind(&digest.title)
    .bind(&digest.content)
    .bind(stats_json)
    .bind(&digest.model)
    .bind(&digest.audio_url)
    .bind(digest.status.as_str())
    .bind(&digest.error)
    .bind(time::to_db(digest.created_at))
    .bind(time::to_db(digest.updated_at))
    .execute(pool)
    .await?;

    get_by_week(pool, digest.week_start)
        .await?
        .ok_or_else(|| Error::Internal("Digest vanished after upsert".to_string()))
}

pub async fn get_by_week(pool: &SqlitePool, week_start: DateTime<Utc>) -> Result<Option<Digest>> {
    let row = sqlx::query(&format!("{} WHERE week_start = ?", SELECT_DIGEST))
        .bind(time::to_db(week_start))
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(digest_from_row).transpose()
}

pub async fn latest_digest(pool: &SqlitePool) -> Result<Option<Digest>> {
    let row = sqlx::query(&format!("{} ORDER BY week_start DESC LIMIT 1", SELECT_DIGEST))
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(digest_from_row).transpose()
}

pub async fn list_digests(pool: &SqlitePool, limit: i64) -> Result<Vec<Digest>> {
    let rows = sqlx::query(&format!("{} ORDER BY week_start DESC LIMIT ?", SELECT_DIGEST))
        .bind(limit)
        .fetch_all(pool)
        .await?;
    rows.iter().map(digest_from_row).collect()
}

/// Attach narration (or a narration failure) to the digest generation
/// stamped `generated_at`
///
/// Returns false when the week was regenerated in the meantime; the
/// result then belongs to text that no longer exists and is dropped.
pub async fn set_narration(
    pool: &SqlitePool,
    id: Uuid,
    generated_at: DateTime<Utc>,
    audio_url: Option<&str>,
    status: DigestStatus,
    error: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let updated = sqlx::query(
        r#"
        UPDATE ai_digests
        SET audio_url = COALESCE(?, audio_url), status = ?, error = ?, updated_at = ?
        WHERE id = ? AND updated_at = ?
        "#,
    )
    .bind(audio_url)
    .bind(status.as_str())
    .bind(error)
    .bind(time::to_db(now))
    .bind(id.to_string())
    .bind(time::to_db(generated_at))
    .execute(pool)
    .await?
    .rows_affected();
    Ok(updated > 0)
}
