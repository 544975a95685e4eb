//! `dao_treasury` ledger

use chrono::{DateTime, Utc};
use rlp_common::treasury::{apply, check_outflow, NewTransaction, TransactionKind, TreasuryTransaction};
use rlp_common::{time, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor, SqlitePool};
use uuid::Uuid;

use super::{parse_column, parse_uuid};

fn transaction_from_row(row: &SqliteRow) -> Result<TreasuryTransaction> {
    let proposal_id: Option<String> = row.try_get("proposal_id")?;
    Ok(TreasuryTransaction {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        kind: parse_column(&row.try_get::<String, _>("kind")?)?,
        amount_cents: row.try_get("amount_cents")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        proposal_id: proposal_id.as_deref().map(parse_uuid).transpose()?,
        created_at: time::parse_db(&row.try_get::<String, _>("created_at")?)?,
    })
}

/// Current balance: inflows minus outflows
pub async fn balance<'e, E>(executor: E) -> Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let balance: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(CASE kind WHEN 'inflow' THEN amount_cents ELSE -amount_cents END), 0)
        FROM dao_treasury
        "#,
    )
    .fetch_one(executor)
    .await?;
    Ok(balance)
}

pub(crate) async fn insert_transaction<'e, E>(executor: E, tx: &TreasuryTransaction) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO dao_treasury (id, kind, amount_cents, description, category, proposal_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(tx.id.to_string())
    .bind(tx.kind.as_str())
    .bind(tx.amount_cents)
    .bind(&tx.description)
    .bind(&tx.category)
    .bind(tx.proposal_id.map(|id| id.to_string()))
    .bind(time::to_db(tx.created_at))
    .execute(executor)
    .await?;
    Ok(())
}

/// Append a manual ledger entry, returning it with the new balance
///
/// Outflows larger than the balance are rejected, as is any entry that
/// would take the balance out of range.
pub async fn record_transaction(
    pool: &SqlitePool,
    input: &NewTransaction,
    now: DateTime<Utc>,
) -> Result<(TreasuryTransaction, i64)> {
    let mut db_tx = pool.begin().await?;

    let current = balance(&mut *db_tx).await?;
    if input.kind == TransactionKind::Outflow {
        check_outflow(current, input.amount_cents)?;
    }
    let new_balance = apply(current, input.kind, input.amount_cents)?;

    let transaction = TreasuryTransaction {
        id: Uuid::new_v4(),
        kind: input.kind,
        amount_cents: input.amount_cents,
        description: input.description.clone(),
        category: input.category.clone(),
        proposal_id: None,
        created_at: now,
    };
    insert_transaction(&mut *db_tx, &transaction).await?;

    db_tx.commit().await?;
    Ok((transaction, new_balance))
}

/// Whole ledger in chronological order
pub async fn list_transactions(pool: &SqlitePool) -> Result<Vec<TreasuryTransaction>> {
    let rows = sqlx::query(
        r#"
        SELECT id, kind, amount_cents, description, category, proposal_id, created_at
        FROM dao_treasury
        ORDER BY created_at, rowid
        "#,
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(transaction_from_row).collect()
}

/// Inflow and outflow totals for `[start, end)`
pub async fn flow_between(
    pool: &SqlitePool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(i64, i64)> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(SUM(CASE kind WHEN 'inflow' THEN amount_cents ELSE 0 END), 0) AS inflow,
            COALESCE(SUM(CASE kind WHEN 'outflow' THEN amount_cents ELSE 0 END), 0) AS outflow
        FROM dao_treasury
        WHERE created_at >= ? AND created_at < ?
        "#,
    )
    .bind(time::to_db(start))
    .bind(time::to_db(end))
    .fetch_one(pool)
    .await?;
    Ok((row.try_get("inflow")?, row.try_get("outflow")?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlp_common::db::init_memory_database;
    use rlp_common::treasury::{running_balances, summarize};
    use rlp_common::Error;

    fn entry(kind: TransactionKind, amount: i64) -> NewTransaction {
        NewTransaction {
            kind,
            amount_cents: amount,
            description: "Ledger entry".to_string(),
            category: "general".to_string(),
        }
    }

    #[tokio::test]
    async fn test_balance_follows_ledger() {
        let pool = init_memory_database().await.unwrap();
        assert_eq!(balance(&pool).await.unwrap(), 0);

        let (_, after) = record_transaction(&pool, &entry(TransactionKind::Inflow, 5_000), time::now())
            .await
            .unwrap();
        assert_eq!(after, 5_000);
        let (_, after) = record_transaction(&pool, &entry(TransactionKind::Outflow, 1_500), time::now())
            .await
            .unwrap();
        assert_eq!(after, 3_500);
        assert_eq!(balance(&pool).await.unwrap(), 3_500);

        let ledger = list_transactions(&pool).await.unwrap();
        let lines = running_balances(&ledger).unwrap();
        assert_eq!(lines.last().unwrap().balance_after_cents, 3_500);
        assert_eq!(summarize(&ledger).unwrap().total_outflow_cents, 1_500);
    }

    #[tokio::test]
    async fn test_overdraw_rejected() {
        let pool = init_memory_database().await.unwrap();
        record_transaction(&pool, &entry(TransactionKind::Inflow, 100), time::now())
            .await
            .unwrap();
        let err = record_transaction(&pool, &entry(TransactionKind::Outflow, 101), time::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(list_transactions(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_entry_not_committed() {
        let pool = init_memory_database().await.unwrap();
        record_transaction(&pool, &entry(TransactionKind::Inflow, i64::MAX - 10), time::now())
            .await
            .unwrap();
        let err = record_transaction(&pool, &entry(TransactionKind::Inflow, 11), time::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(list_transactions(&pool).await.unwrap().len(), 1);
        assert_eq!(balance(&pool).await.unwrap(), i64::MAX - 10);
    }

    #[tokio::test]
    async fn test_flow_window() {
        let pool = init_memory_database().await.unwrap();
        let now = time::now();
        let old = now - chrono::Duration::days(30);
        record_transaction(&pool, &entry(TransactionKind::Inflow, 700), old).await.unwrap();
        record_transaction(&pool, &entry(TransactionKind::Inflow, 300), now).await.unwrap();
        record_transaction(&pool, &entry(TransactionKind::Outflow, 200), now).await.unwrap();

        let (inflow, outflow) = flow_between(&pool, now - chrono::Duration::days(1), now + chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!((inflow, outflow), (300, 200));
    }
}
