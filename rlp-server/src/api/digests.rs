//! Weekly digest endpoints

use axum::{
    extract::State,
    Json,
};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use rlp_common::time;

use super::{parse_param, ApiQuery};
use crate::db;
use crate::db::digests::Digest;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const DEFAULT_LIMIT: i64 = 12;

#[derive(Debug, Deserialize)]
pub struct DigestQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateQuery {
    /// Any date inside the wanted week; defaults to the current week
    pub week_start: Option<String>,
}

/// GET /api/digests?limit=
pub async fn list_digests(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<DigestQuery>,
) -> ApiResult<Json<Vec<Digest>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 100);
    Ok(Json(db::digests::list_digests(&state.db, limit).await?))
}

/// GET /api/digests/latest
pub async fn latest_digest(State(state): State<AppState>) -> ApiResult<Json<Digest>> {
    db::digests::latest_digest(&state.db)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No digest has been generated yet".to_string()))
}

/// POST /api/digests/generate?week_start=YYYY-MM-DD
///
/// Generates (or regenerates) synchronously and returns the stored digest.
pub async fn generate_digest(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<GenerateQuery>,
) -> ApiResult<Json<Digest>> {
    let anchor = match parse_param::<NaiveDate>("week_start", query.week_start.as_deref())? {
        Some(date) => date.and_time(NaiveTime::MIN).and_utc(),
        None => time::now(),
    };
    Ok(Json(state.digests.generate(anchor).await?))
}
