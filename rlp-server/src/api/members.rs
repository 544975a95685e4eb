//! Member registry endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use rlp_common::events::PlatformEvent;
use rlp_common::governance::{Member, MembershipTier, NewMember};
use rlp_common::time;
use rlp_common::validation::normalize_wallet;

use super::{parse_param, ApiJson, ApiQuery};
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Paged};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct MemberQuery {
    pub tier: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TierUpdate {
    pub tier: MembershipTier,
}

pub(crate) fn wallet_param(raw: &str) -> ApiResult<String> {
    normalize_wallet(raw).ok_or_else(|| ApiError::BadRequest(format!("Invalid wallet address: {}", raw)))
}

/// POST /api/members
pub async fn create_member(
    State(state): State<AppState>,
    ApiJson(mut input): ApiJson<NewMember>,
) -> ApiResult<(StatusCode, Json<Member>)> {
    input.validate()?;
    let member = db::members::insert_member(&state.db, &input, time::now()).await?;

    info!(wallet = %member.wallet_address, tier = %member.tier, "Member joined");
    state.event_bus.emit_lossy(PlatformEvent::MemberJoined {
        wallet_address: member.wallet_address.clone(),
        display_name: member.display_name.clone(),
        tier: member.tier,
        timestamp: member.joined_at,
    });

    Ok((StatusCode::CREATED, Json(member)))
}

/// GET /api/members?tier=&page=&per_page=
pub async fn list_members(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<MemberQuery>,
) -> ApiResult<Json<Paged<Member>>> {
    let tier = parse_param::<MembershipTier>("tier", query.tier.as_deref())?;
    let pagination = calculate_pagination(query.page, query.per_page);
    let page = db::members::list_members(&state.db, tier, pagination.per_page, pagination.offset).await?;
    Ok(Json(Paged::new(page.items, pagination, page.total)))
}

/// GET /api/members/:wallet
pub async fn get_member(State(state): State<AppState>, Path(wallet): Path<String>) -> ApiResult<Json<Member>> {
    let wallet = wallet_param(&wallet)?;
    Ok(Json(db::members::get_member(&state.db, &wallet).await?))
}

/// PUT /api/members/:wallet/tier
pub async fn update_tier(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
    ApiJson(update): ApiJson<TierUpdate>,
) -> ApiResult<Json<Member>> {
    let wallet = wallet_param(&wallet)?;
    let (old_tier, member) = db::members::update_tier(&state.db, &wallet, update.tier, time::now()).await?;

    if old_tier != member.tier {
        info!(wallet = %wallet, old = %old_tier, new = %member.tier, "Member tier changed");
        state.event_bus.emit_lossy(PlatformEvent::MemberTierChanged {
            wallet_address: wallet,
            old_tier,
            new_tier: member.tier,
            timestamp: member.updated_at,
        });
    }
    Ok(Json(member))
}
