//! Ballot endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use tracing::info;

use rlp_common::csv::CsvWriter;
use rlp_common::events::PlatformEvent;
use rlp_common::governance::{CastVote, Vote};
use rlp_common::time;

use super::{csv_response, parse_id, ApiJson};
use crate::db;
use crate::error::ApiResult;
use crate::AppState;

/// POST /api/proposals/:id/votes
pub async fn cast_vote(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(mut input): ApiJson<CastVote>,
) -> ApiResult<(StatusCode, Json<Vote>)> {
    let id = parse_id(&id)?;
    input.validate()?;
    let outcome = db::votes::cast_vote(&state.db, id, &input, time::now()).await?;
    let vote = &outcome.vote;

    info!(
        proposal_id = %id,
        voter = %vote.voter_wallet,
        choice = %vote.choice,
        weight = vote.weight,
        "Vote cast"
    );
    state.event_bus.emit_lossy(PlatformEvent::VoteCast {
        proposal_id: id,
        voter_wallet: vote.voter_wallet.clone(),
        choice: vote.choice,
        weight: vote.weight,
        votes_for_weight: outcome.proposal.votes_for_weight,
        votes_against_weight: outcome.proposal.votes_against_weight,
        votes_abstain_weight: outcome.proposal.votes_abstain_weight,
        timestamp: vote.cast_at,
    });
    state.notifier.vote_cast(&outcome.voter, vote, &outcome.proposal);

    Ok((StatusCode::CREATED, Json(outcome.vote)))
}

/// GET /api/proposals/:id/votes
pub async fn list_votes(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Vec<Vote>>> {
    let id = parse_id(&id)?;
    Ok(Json(db::votes::list_votes(&state.db, id).await?))
}

/// GET /api/proposals/:id/votes.csv
pub async fn export_votes(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let votes = db::votes::list_votes(&state.db, id).await?;

    let mut csv = CsvWriter::with_headers(&[
        "vote_id",
        "voter_wallet",
        "choice",
        "tier",
        "weight",
        "reason",
        "cast_at",
    ]);
    for v in &votes {
        csv.write_record([
            v.id.to_string(),
            v.voter_wallet.clone(),
            v.choice.to_string(),
            v.tier.to_string(),
            v.weight.to_string(),
            v.reason.clone().unwrap_or_default(),
            time::to_db(v.cast_at),
        ]);
    }
    Ok(csv_response(&format!("votes-{}.csv", id), csv.finish()))
}
