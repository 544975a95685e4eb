//! Proposal lifecycle endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use rlp_common::csv::{format_cents, CsvWriter};
use rlp_common::events::PlatformEvent;
use rlp_common::governance::{
    NewProposal, Proposal, ProposalCategory, ProposalResults, ProposalStatus,
};
use rlp_common::time;
use rlp_common::treasury::TreasuryTransaction;

use super::{csv_response, parse_id, parse_param, ApiJson, ApiQuery};
use crate::db;
use crate::db::proposals::ProposalFilter;
use crate::error::ApiResult;
use crate::pagination::{calculate_pagination, Paged};
use crate::services::scheduler::close_and_announce;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProposalQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct FundRequest {
    pub amount_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct FundResponse {
    pub proposal: Proposal,
    pub transaction: TreasuryTransaction,
    pub balance_cents: i64,
    pub fully_funded: bool,
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub proposal_id: Uuid,
    pub status: ProposalStatus,
    pub voting_active: bool,
    pub funding_percentage: f64,
    pub results: ProposalResults,
}

#[derive(Debug, Serialize)]
pub struct CloseResponse {
    pub proposal: Proposal,
    pub results: ProposalResults,
}

fn announce_transition(state: &AppState, old_status: ProposalStatus, proposal: &Proposal) {
    info!(
        proposal_id = %proposal.id,
        from = %old_status,
        to = %proposal.status,
        "Proposal status changed"
    );
    state.event_bus.emit_lossy(PlatformEvent::ProposalStatusChanged {
        proposal_id: proposal.id,
        title: proposal.title.clone(),
        old_status,
        new_status: proposal.status,
        timestamp: proposal.updated_at,
    });
}

/// POST /api/proposals
pub async fn create_proposal(
    State(state): State<AppState>,
    ApiJson(mut input): ApiJson<NewProposal>,
) -> ApiResult<(StatusCode, Json<Proposal>)> {
    input.validate()?;
    let proposal = db::proposals::insert_proposal(&state.db, &input, time::now()).await?;

    info!(proposal_id = %proposal.id, status = %proposal.status, "Proposal created");
    state.event_bus.emit_lossy(PlatformEvent::ProposalCreated {
        proposal_id: proposal.id,
        title: proposal.title.clone(),
        status: proposal.status,
        timestamp: proposal.created_at,
    });
    if proposal.status == ProposalStatus::Submitted {
        state.notifier.proposal_submitted(&proposal);
    }

    Ok((StatusCode::CREATED, Json(proposal)))
}

/// GET /api/proposals?status=&category=&page=&per_page=
pub async fn list_proposals(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ProposalQuery>,
) -> ApiResult<Json<Paged<Proposal>>> {
    let filter = ProposalFilter {
        status: parse_param::<ProposalStatus>("status", query.status.as_deref())?,
        category: parse_param::<ProposalCategory>("category", query.category.as_deref())?,
    };
    let pagination = calculate_pagination(query.page, query.per_page);
    let page =
        db::proposals::list_proposals(&state.db, filter, pagination.per_page, pagination.offset).await?;
    Ok(Json(Paged::new(page.items, pagination, page.total)))
}

/// GET /api/proposals/:id
pub async fn get_proposal(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Proposal>> {
    let id = parse_id(&id)?;
    Ok(Json(db::proposals::get_proposal(&state.db, id).await?))
}

/// POST /api/proposals/:id/submit
pub async fn submit_proposal(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Proposal>> {
    let id = parse_id(&id)?;
    let (old, proposal) =
        db::proposals::transition(&state.db, id, ProposalStatus::Submitted, time::now()).await?;
    announce_transition(&state, old, &proposal);
    state.notifier.proposal_submitted(&proposal);
    Ok(Json(proposal))
}

/// POST /api/proposals/:id/open-voting
pub async fn open_voting(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Proposal>> {
    let id = parse_id(&id)?;
    let proposal = db::proposals::open_voting(&state.db, id, time::now()).await?;
    announce_transition(&state, ProposalStatus::Submitted, &proposal);
    state.notifier.voting_opened(&proposal);
    Ok(Json(proposal))
}

/// POST /api/proposals/:id/close
///
/// Closes voting immediately, even if the window has not ended.
pub async fn close_voting(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<CloseResponse>> {
    let id = parse_id(&id)?;
    let (proposal, results) = close_and_announce(&state.db, &state.event_bus, &state.notifier, id).await?;
    Ok(Json(CloseResponse { proposal, results }))
}

/// POST /api/proposals/:id/cancel
pub async fn cancel_proposal(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Proposal>> {
    let id = parse_id(&id)?;
    let (old, proposal) =
        db::proposals::transition(&state.db, id, ProposalStatus::Cancelled, time::now()).await?;
    announce_transition(&state, old, &proposal);
    Ok(Json(proposal))
}

/// POST /api/proposals/:id/complete
pub async fn complete_proposal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Proposal>> {
    let id = parse_id(&id)?;
    let (old, proposal) =
        db::proposals::transition(&state.db, id, ProposalStatus::Completed, time::now()).await?;
    announce_transition(&state, old, &proposal);
    Ok(Json(proposal))
}

/// POST /api/proposals/:id/fund
pub async fn fund_proposal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<FundRequest>,
) -> ApiResult<Json<FundResponse>> {
    let id = parse_id(&id)?;
    let outcome = db::proposals::fund_proposal(&state.db, id, request.amount_cents, time::now()).await?;
    let proposal = &outcome.proposal;

    info!(
        proposal_id = %id,
        amount_cents = request.amount_cents,
        funded_cents = proposal.current_funding_cents,
        goal_cents = proposal.funding_goal_cents,
        "Proposal funded"
    );
    state.event_bus.emit_lossy(PlatformEvent::ProposalFunded {
        proposal_id: id,
        title: proposal.title.clone(),
        amount_cents: request.amount_cents,
        current_funding_cents: proposal.current_funding_cents,
        funding_goal_cents: proposal.funding_goal_cents,
        timestamp: proposal.updated_at,
    });
    state.event_bus.emit_lossy(PlatformEvent::TreasuryTransactionRecorded {
        transaction_id: outcome.transaction.id,
        kind: outcome.transaction.kind,
        amount_cents: outcome.transaction.amount_cents,
        balance_cents: outcome.balance_cents,
        timestamp: outcome.transaction.created_at,
    });
    if outcome.fully_funded {
        announce_transition(&state, ProposalStatus::Approved, proposal);
        state.notifier.funding_reached(proposal);
    }

    Ok(Json(FundResponse {
        proposal: outcome.proposal,
        transaction: outcome.transaction,
        balance_cents: outcome.balance_cents,
        fully_funded: outcome.fully_funded,
    }))
}

/// GET /api/proposals/:id/results
///
/// Live tally while voting is open, final result afterwards.
pub async fn get_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ResultsResponse>> {
    let id = parse_id(&id)?;
    let proposal = db::proposals::get_proposal(&state.db, id).await?;
    Ok(Json(ResultsResponse {
        proposal_id: proposal.id,
        status: proposal.status,
        voting_active: proposal.is_voting_active(time::now()),
        funding_percentage: proposal.funding_percentage(),
        results: proposal.results(),
    }))
}

/// GET /api/proposals/export.csv
pub async fn export_proposals(State(state): State<AppState>) -> ApiResult<Response> {
    let proposals = db::proposals::all_proposals(&state.db).await?;

    let mut csv = CsvWriter::with_headers(&[
        "id",
        "title",
        "category",
        "status",
        "proposer_wallet",
        "funding_goal",
        "current_funding",
        "votes_for_weight",
        "votes_against_weight",
        "votes_abstain_weight",
        "voter_count",
        "created_at",
    ]);
    for p in &proposals {
        csv.write_record([
            p.id.to_string(),
            p.title.clone(),
            p.category.to_string(),
            p.status.to_string(),
            p.proposer_wallet.clone(),
            format_cents(p.funding_goal_cents),
            format_cents(p.current_funding_cents),
            p.votes_for_weight.to_string(),
            p.votes_against_weight.to_string(),
            p.votes_abstain_weight.to_string(),
            p.voter_count.to_string(),
            time::to_db(p.created_at),
        ]);
    }
    Ok(csv_response("proposals.csv", csv.finish()))
}
