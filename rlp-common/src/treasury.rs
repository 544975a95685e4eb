//! Treasury ledger
//!
//! The treasury is an append-only list of inflow/outflow transactions.
//! Balance is never stored; it is derived by folding the ledger in
//! chronological order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::validation::ValidationErrors;
use crate::{Error, Result};

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Inflow,
    Outflow,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Inflow => "inflow",
            TransactionKind::Outflow => "outflow",
        }
    }

    /// Signed effect of `amount_cents` on the balance
    pub fn signed(&self, amount_cents: i64) -> i64 {
        match self {
            TransactionKind::Inflow => amount_cents,
            TransactionKind::Outflow => -amount_cents,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "inflow" => Ok(TransactionKind::Inflow),
            "outflow" => Ok(TransactionKind::Outflow),
            other => Err(format!("Unknown transaction kind: {}", other)),
        }
    }
}

/// A ledger entry (`dao_treasury` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreasuryTransaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    /// Always positive; direction comes from `kind`
    pub amount_cents: i64,
    pub description: String,
    pub category: String,
    /// Proposal funded by this outflow, if any
    pub proposal_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Ledger entry with the balance after it was applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerLine {
    #[serde(flatten)]
    pub transaction: TreasuryTransaction,
    pub balance_after_cents: i64,
}

/// Totals across the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasurySummary {
    pub total_inflow_cents: i64,
    pub total_outflow_cents: i64,
    pub balance_cents: i64,
    pub transaction_count: i64,
}

/// Largest single ledger entry (10M currency units)
pub const AMOUNT_MAX_CENTS: i64 = 1_000_000_000;

/// Manual ledger entry payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub amount_cents: i64,
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "general".to_string()
}

impl NewTransaction {
    pub fn validate(&mut self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check_range("amount_cents", self.amount_cents, 1, AMOUNT_MAX_CENTS);
        errors.check_length("description", &self.description, 3, 500);
        errors.check_length("category", &self.category, 1, 50);
        self.description = self.description.trim().to_string();
        self.category = self.category.trim().to_lowercase();
        errors.into_result()
    }
}

/// Balance after applying one entry; errors instead of wrapping
pub fn apply(balance_cents: i64, kind: TransactionKind, amount_cents: i64) -> Result<i64> {
    balance_cents
        .checked_add(kind.signed(amount_cents))
        .ok_or_else(overflow)
}

fn overflow() -> Error {
    Error::InvalidInput("Treasury total out of range".to_string())
}

/// Sort chronologically and attach the running balance to each entry
///
/// Entries with equal timestamps keep their input order.
pub fn running_balances(transactions: &[TreasuryTransaction]) -> Result<Vec<LedgerLine>> {
    let mut ordered: Vec<&TreasuryTransaction> = transactions.iter().collect();
    ordered.sort_by_key(|t| t.created_at);

    let mut balance = 0i64;
    ordered
        .into_iter()
        .map(|t| -> Result<LedgerLine> {
            balance = apply(balance, t.kind, t.amount_cents)?;
            Ok(LedgerLine {
                transaction: t.clone(),
                balance_after_cents: balance,
            })
        })
        .collect()
}

pub fn summarize(transactions: &[TreasuryTransaction]) -> Result<TreasurySummary> {
    transactions
        .iter()
        .try_fold(TreasurySummary::default(), |mut summary, t| -> Result<TreasurySummary> {
            let total = match t.kind {
                TransactionKind::Inflow => &mut summary.total_inflow_cents,
                TransactionKind::Outflow => &mut summary.total_outflow_cents,
            };
            *total = total.checked_add(t.amount_cents).ok_or_else(overflow)?;
            summary.balance_cents = apply(summary.balance_cents, t.kind, t.amount_cents)?;
            summary.transaction_count += 1;
            Ok(summary)
        })
}

/// Reject an outflow the treasury cannot cover
pub fn check_outflow(balance_cents: i64, amount_cents: i64) -> Result<()> {
    if amount_cents > balance_cents {
        return Err(Error::Conflict(format!(
            "Treasury balance {} cannot cover outflow of {}",
            balance_cents, amount_cents
        )));
    }
    Ok(())
}
