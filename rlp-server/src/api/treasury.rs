//! Treasury ledger endpoints

use axum::{extract::State, http::StatusCode, response::Response, Json};
use serde::Serialize;
use tracing::info;

use rlp_common::csv::{format_cents, CsvWriter};
use rlp_common::events::PlatformEvent;
use rlp_common::time;
use rlp_common::treasury::{
    running_balances, summarize, LedgerLine, NewTransaction, TreasurySummary, TreasuryTransaction,
};

use super::{csv_response, ApiJson};
use crate::db;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RecordedTransaction {
    pub transaction: TreasuryTransaction,
    pub balance_cents: i64,
}

/// GET /api/treasury
///
/// Full ledger, oldest first, each entry with the balance after it.
pub async fn ledger(State(state): State<AppState>) -> ApiResult<Json<Vec<LedgerLine>>> {
    let transactions = db::treasury::list_transactions(&state.db).await?;
    Ok(Json(running_balances(&transactions)?))
}

/// POST /api/treasury
pub async fn record_transaction(
    State(state): State<AppState>,
    ApiJson(mut input): ApiJson<NewTransaction>,
) -> ApiResult<(StatusCode, Json<RecordedTransaction>)> {
    input.validate()?;
    let (transaction, balance_cents) =
        db::treasury::record_transaction(&state.db, &input, time::now()).await?;

    info!(
        transaction_id = %transaction.id,
        kind = %transaction.kind,
        amount_cents = transaction.amount_cents,
        balance_cents,
        "Treasury transaction recorded"
    );
    state.event_bus.emit_lossy(PlatformEvent::TreasuryTransactionRecorded {
        transaction_id: transaction.id,
        kind: transaction.kind,
        amount_cents: transaction.amount_cents,
        balance_cents,
        timestamp: transaction.created_at,
    });

    Ok((
        StatusCode::CREATED,
        Json(RecordedTransaction {
            transaction,
            balance_cents,
        }),
    ))
}

/// GET /api/treasury/summary
pub async fn summary(State(state): State<AppState>) -> ApiResult<Json<TreasurySummary>> {
    let transactions = db::treasury::list_transactions(&state.db).await?;
    Ok(Json(summarize(&transactions)?))
}

/// GET /api/treasury/export.csv
pub async fn export_ledger(State(state): State<AppState>) -> ApiResult<Response> {
    let transactions = db::treasury::list_transactions(&state.db).await?;

    let mut csv = CsvWriter::with_headers(&[
        "id",
        "date",
        "kind",
        "category",
        "description",
        "amount",
        "balance",
        "proposal_id",
    ]);
    for line in running_balances(&transactions)? {
        let t = &line.transaction;
        csv.write_record([
            t.id.to_string(),
            time::to_db(t.created_at),
            t.kind.to_string(),
            t.category.clone(),
            t.description.clone(),
            format_cents(t.kind.signed(t.amount_cents)),
            format_cents(line.balance_after_cents),
            t.proposal_id.map(|id| id.to_string()).unwrap_or_default(),
        ]);
    }
    Ok(csv_response("treasury.csv", csv.finish()))
}
