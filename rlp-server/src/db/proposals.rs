//! `dao_proposals` table and lifecycle transitions

use chrono::{DateTime, Duration, Utc};
use rlp_common::governance::{
    check_contribution, evaluate, tally, NewProposal, Proposal, ProposalCategory, ProposalResults,
    ProposalStatus,
};
use rlp_common::treasury::{check_outflow, TransactionKind, TreasuryTransaction};
use rlp_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor, SqlitePool};
use uuid::Uuid;

use super::members::fetch_member;
use super::{parse_column, parse_optional_ts, parse_uuid, Page};

const SELECT_PROPOSAL: &str = r#"
    SELECT id, title, description, category, proposer_wallet, funding_goal_cents,
           current_funding_cents, status, quorum_weight, approval_threshold,
           voting_duration_days, votes_for_weight, votes_against_weight,
           votes_abstain_weight, voter_count, voting_starts_at, voting_ends_at,
           created_at, updated_at
    FROM dao_proposals
"#;

fn proposal_from_row(row: &SqliteRow) -> Result<Proposal> {
    Ok(Proposal {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: parse_column(&row.try_get::<String, _>("category")?)?,
        proposer_wallet: row.try_get("proposer_wallet")?,
        funding_goal_cents: row.try_get("funding_goal_cents")?,
        current_funding_cents: row.try_get("current_funding_cents")?,
        status: parse_column(&row.try_get::<String, _>("status")?)?,
        quorum_weight: row.try_get("quorum_weight")?,
        approval_threshold: row.try_get("approval_threshold")?,
        voting_duration_days: row.try_get("voting_duration_days")?,
        votes_for_weight: row.try_get("votes_for_weight")?,
        votes_against_weight: row.try_get("votes_against_weight")?,
        votes_abstain_weight: row.try_get("votes_abstain_weight")?,
        voter_count: row.try_get("voter_count")?,
        voting_starts_at: parse_optional_ts(row.try_get("voting_starts_at")?)?,
        voting_ends_at: parse_optional_ts(row.try_get("voting_ends_at")?)?,
        created_at: time::parse_db(&row.try_get::<String, _>("created_at")?)?,
        updated_at: time::parse_db(&row.try_get::<String, _>("updated_at")?)?,
    })
}

/// Listing filters
#[derive(Debug, Clone, Copy, Default)]
pub struct ProposalFilter {
    pub status: Option<ProposalStatus>,
    pub category: Option<ProposalCategory>,
}

pub async fn fetch_proposal<'e, E>(executor: E, id: Uuid) -> Result<Option<Proposal>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_PROPOSAL))
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(proposal_from_row).transpose()
}

async fn require_proposal<'e, E>(executor: E, id: Uuid) -> Result<Proposal>
where
    E: SqliteExecutor<'e>,
{
    fetch_proposal(executor, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Proposal {}", id)))
}

pub async fn get_proposal(pool: &SqlitePool, id: Uuid) -> Result<Proposal> {
    require_proposal(pool, id).await
}

fn check_transition(proposal: &Proposal, next: ProposalStatus) -> Result<()> {
    if proposal.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(Error::Conflict(format!(
            "Proposal {} cannot move from {} to {}",
            proposal.id, proposal.status, next
        )))
    }
}

/// Create a proposal as draft, or submitted when `input.submit` is set
///
/// The proposer must be an active member.
pub async fn insert_proposal(
    pool: &SqlitePool,
    input: &NewProposal,
    now: DateTime<Utc>,
) -> Result<Proposal> {
    let mut tx = pool.begin().await?;

    let proposer = fetch_member(&mut *tx, &input.proposer_wallet)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Member {}", input.proposer_wallet)))?;
    if !proposer.active {
        return Err(Error::Conflict(format!(
            "Member {} is not active",
            proposer.wallet_address
        )));
    }

    let status = if input.submit {
        ProposalStatus::Submitted
    } else {
        ProposalStatus::Draft
    };

    let proposal = Proposal {
        id: Uuid::new_v4(),
        title: input.title.clone(),
        description: input.description.clone(),
        category: input.category,
        proposer_wallet: input.proposer_wallet.clone(),
        funding_goal_cents: input.funding_goal_cents,
        current_funding_cents: 0,
        status,
        quorum_weight: input.quorum_weight,
        approval_threshold: input.approval_threshold,
        voting_duration_days: input.voting_duration_days,
        votes_for_weight: 0,
        votes_against_weight: 0,
        votes_abstain_weight: 0,
        voter_count: 0,
        voting_starts_at: None,
        voting_ends_at: None,
        created_at: now,
        updated_at: now,
    };

    let ts = time::to_db(now);
    sqlx::query(
        r#"
        INSERT INTO dao_proposals (
            id, title, description, category, proposer_wallet, funding_goal_cents,
            current_funding_cents, status, quorum_weight, approval_threshold,
            voting_duration_days, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(proposal.id.to_string())
    .bind(&proposal.title)
    .bind(&proposal.description)
    .bind(proposal.category.as_str())
    .bind(&proposal.proposer_wallet)
    .bind(proposal.funding_goal_cents)
    .bind(proposal.status.as_str())
    .bind(proposal.quorum_weight)
    .bind(proposal.approval_threshold)
    .bind(proposal.voting_duration_days)
    .bind(&ts)
    .bind(&ts)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(proposal)
}

pub async fn list_proposals(
    pool: &SqlitePool,
    filter: ProposalFilter,
    limit: i64,
    offset: i64,
) -> Result<Page<Proposal>> {
    let status = filter.status.map(|s| s.as_str());
    let category = filter.category.map(|c| c.as_str());
    let condition = "(?1 IS NULL OR status = ?1) AND (?2 IS NULL OR category = ?2)";

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM dao_proposals WHERE {}", condition))
            .bind(status)
            .bind(category)
            .fetch_one(pool)
            .await?;

    let rows = sqlx::query(&format!(
        "{} WHERE {} ORDER BY created_at DESC, id LIMIT ?3 OFFSET ?4",
        SELECT_PROPOSAL, condition
    ))
    .bind(status)
    .bind(category)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let items = rows.iter().map(proposal_from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page { items, total })
}

/// Every proposal, newest first (CSV export)
pub async fn all_proposals(pool: &SqlitePool) -> Result<Vec<Proposal>> {
    let rows = sqlx::query(&format!("{} ORDER BY created_at DESC, id", SELECT_PROPOSAL))
        .fetch_all(pool)
        .await?;
    rows.iter().map(proposal_from_row).collect()
}

/// Plain status change for transitions with no side data
/// (submit, cancel, complete). Returns the previous status.
pub async fn transition(
    pool: &SqlitePool,
    id: Uuid,
    next: ProposalStatus,
    now: DateTime<Utc>,
) -> Result<(ProposalStatus, Proposal)> {
    let mut tx = pool.begin().await?;

    let mut proposal = require_proposal(&mut *tx, id).await?;
    check_transition(&proposal, next)?;
    let previous = proposal.status;

    let closed_at = (next == ProposalStatus::Cancelled).then(|| time::to_db(now));
    sqlx::query(
        "UPDATE dao_proposals SET status = ?, updated_at = ?, closed_at = COALESCE(?, closed_at) WHERE id = ?",
    )
    .bind(next.as_str())
    .bind(time::to_db(now))
    .bind(closed_at)
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    proposal.status = next;
    proposal.updated_at = now;
    Ok((previous, proposal))
}

/// submitted → active_voting; the window runs `voting_duration_days` from now
pub async fn open_voting(pool: &SqlitePool, id: Uuid, now: DateTime<Utc>) -> Result<Proposal> {
    let mut tx = pool.begin().await?;

    let mut proposal = require_proposal(&mut *tx, id).await?;
    check_transition(&proposal, ProposalStatus::ActiveVoting)?;

    let ends_at = now + Duration::days(proposal.voting_duration_days);
    sqlx::query(
        r#"
        UPDATE dao_proposals
        SET status = ?, voting_starts_at = ?, voting_ends_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(ProposalStatus::ActiveVoting.as_str())
    .bind(time::to_db(now))
    .bind(time::to_db(ends_at))
    .bind(time::to_db(now))
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    proposal.status = ProposalStatus::ActiveVoting;
    proposal.voting_starts_at = Some(now);
    proposal.voting_ends_at = Some(ends_at);
    proposal.updated_at = now;
    Ok(proposal)
}

/// Close voting and record the outcome
///
/// The tally is recomputed from `dao_votes` inside the transaction, so the
/// stored result always agrees with the ballots. Closing before the window
/// ends is allowed (manual close).
pub async fn close_voting(
    pool: &SqlitePool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<(Proposal, ProposalResults)> {
    let mut tx = pool.begin().await?;

    let mut proposal = require_proposal(&mut *tx, id).await?;
    if proposal.status != ProposalStatus::ActiveVoting {
        return Err(Error::Conflict(format!(
            "Proposal {} is {}, not in active voting",
            id, proposal.status
        )));
    }

    let votes = super::votes::fetch_votes(&mut *tx, id).await?;
    let counted = tally(&votes);
    let results = evaluate(&counted, proposal.quorum_weight, proposal.approval_threshold);
    let outcome = results.outcome();

    sqlx::query(
        r#"
        UPDATE dao_proposals
        SET status = ?, votes_for_weight = ?, votes_against_weight = ?,
            votes_abstain_weight = ?, voter_count = ?, closed_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(outcome.as_str())
    .bind(counted.for_weight)
    .bind(counted.against_weight)
    .bind(counted.abstain_weight)
    .bind(counted.voter_count)
    .bind(time::to_db(now))
    .bind(time::to_db(now))
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    proposal.status = outcome;
    proposal.votes_for_weight = counted.for_weight;
    proposal.votes_against_weight = counted.against_weight;
    proposal.votes_abstain_weight = counted.abstain_weight;
    proposal.voter_count = counted.voter_count;
    proposal.updated_at = now;
    Ok((proposal, results))
}

/// Ids of proposals whose voting window has passed but are still open
pub async fn expired_voting(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM dao_proposals WHERE status = ? AND voting_ends_at IS NOT NULL AND voting_ends_at <= ?",
    )
    .bind(ProposalStatus::ActiveVoting.as_str())
    .bind(time::to_db(now))
    .fetch_all(pool)
    .await?;
    ids.iter().map(|id| parse_uuid(id)).collect()
}

/// Proposal counts for a reporting window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProposalActivity {
    pub created: i64,
    pub approved: i64,
    pub rejected: i64,
}

/// Proposals created, and voting outcomes recorded, in `[start, end)`
///
/// Approved proposals that were later funded or completed still count as
/// approved in the window where their vote closed.
pub async fn activity_between(
    pool: &SqlitePool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<ProposalActivity> {
    let (start, end) = (time::to_db(start), time::to_db(end));
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN created_at >= ?1 AND created_at < ?2 THEN 1 ELSE 0 END), 0) AS created,
            COALESCE(SUM(CASE WHEN closed_at >= ?1 AND closed_at < ?2
                AND status IN ('approved', 'funded', 'completed') THEN 1 ELSE 0 END), 0) AS approved,
            COALESCE(SUM(CASE WHEN closed_at >= ?1 AND closed_at < ?2
                AND status = 'rejected' THEN 1 ELSE 0 END), 0) AS rejected
        FROM dao_proposals
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_one(pool)
    .await?;
    Ok(ProposalActivity {
        created: row.try_get("created")?,
        approved: row.try_get("approved")?,
        rejected: row.try_get("rejected")?,
    })
}

/// Result of a funding contribution
#[derive(Debug, Clone)]
pub struct FundingOutcome {
    pub proposal: Proposal,
    pub transaction: TreasuryTransaction,
    pub balance_cents: i64,
    /// The contribution completed the goal and moved the proposal to funded
    pub fully_funded: bool,
}

/// Pay `amount_cents` from the treasury toward an approved proposal
///
/// Writes the outflow ledger row, raises the proposal's funding, and moves
/// it to funded once the goal is reached. Fails without writing anything
/// if the amount would overshoot the goal or exceed the treasury balance.
pub async fn fund_proposal(
    pool: &SqlitePool,
    id: Uuid,
    amount_cents: i64,
    now: DateTime<Utc>,
) -> Result<FundingOutcome> {
    let mut tx = pool.begin().await?;

    let mut proposal = require_proposal(&mut *tx, id).await?;
    if proposal.status != ProposalStatus::Approved {
        return Err(Error::Conflict(format!(
            "Proposal {} is {}; only approved proposals can be funded",
            id, proposal.status
        )));
    }
    check_contribution(
        proposal.current_funding_cents,
        proposal.funding_goal_cents,
        amount_cents,
    )?;

    let balance = super::treasury::balance(&mut *tx).await?;
    check_outflow(balance, amount_cents)?;

    let transaction = TreasuryTransaction {
        id: Uuid::new_v4(),
        kind: TransactionKind::Outflow,
        amount_cents,
        description: format!("Funding: {}", proposal.title),
        category: "proposal_funding".to_string(),
        proposal_id: Some(id),
        created_at: now,
    };
    super::treasury::insert_transaction(&mut *tx, &transaction).await?;

    let new_funding = proposal.current_funding_cents + amount_cents;
    let fully_funded = new_funding == proposal.funding_goal_cents;
    let status = if fully_funded {
        ProposalStatus::Funded
    } else {
        proposal.status
    };

    sqlx::query(
        "UPDATE dao_proposals SET current_funding_cents = ?, status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(new_funding)
    .bind(status.as_str())
    .bind(time::to_db(now))
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    proposal.current_funding_cents = new_funding;
    proposal.status = status;
    proposal.updated_at = now;
    Ok(FundingOutcome {
        proposal,
        transaction,
        balance_cents: balance - amount_cents,
        fully_funded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::members::insert_member;
    use crate::db::treasury::record_transaction;
    use rlp_common::db::init_memory_database;
    use rlp_common::governance::{MembershipTier, NewMember};
    use rlp_common::treasury::NewTransaction;

    const WALLET: &str = "0x00000000000000000000000000000000000000aa";

    async fn setup() -> SqlitePool {
        let pool = init_memory_database().await.unwrap();
        let member = NewMember {
            wallet_address: WALLET.to_string(),
            display_name: "Proposer".to_string(),
            email: None,
            tier: MembershipTier::Silver,
        };
        insert_member(&pool, &member, time::now()).await.unwrap();
        pool
    }

    fn new_proposal(goal: i64) -> NewProposal {
        NewProposal {
            title: "Tour van repairs".to_string(),
            description: "Fix the transmission on the label tour van before spring".to_string(),
            category: ProposalCategory::ArtistFunding,
            proposer_wallet: WALLET.to_string(),
            funding_goal_cents: goal,
            voting_duration_days: 3,
            quorum_weight: 1,
            approval_threshold: 50,
            submit: true,
        }
    }

    async fn approved(pool: &SqlitePool, goal: i64) -> Proposal {
        let p = insert_proposal(pool, &new_proposal(goal), time::now()).await.unwrap();
        open_voting(pool, p.id, time::now()).await.unwrap();
        sqlx::query("UPDATE dao_proposals SET status = 'approved' WHERE id = ?")
            .bind(p.id.to_string())
            .execute(pool)
            .await
            .unwrap();
        get_proposal(pool, p.id).await.unwrap()
    }

    async fn deposit(pool: &SqlitePool, amount: i64) {
        let input = NewTransaction {
            kind: TransactionKind::Inflow,
            amount_cents: amount,
            description: "Merch sales".to_string(),
            category: "merch".to_string(),
        };
        record_transaction(pool, &input, time::now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_proposer_rejected() {
        let pool = setup().await;
        let mut input = new_proposal(1_000);
        input.proposer_wallet = "0x00000000000000000000000000000000000000bb".to_string();
        let err = insert_proposal(&pool, &input, time::now()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_open_voting_sets_window() {
        let pool = setup().await;
        let now = time::now();
        let p = insert_proposal(&pool, &new_proposal(1_000), now).await.unwrap();
        assert_eq!(p.status, ProposalStatus::Submitted);

        let opened = open_voting(&pool, p.id, now).await.unwrap();
        assert_eq!(opened.voting_ends_at, Some(now + Duration::days(3)));

        let stored = get_proposal(&pool, p.id).await.unwrap();
        assert_eq!(stored, opened);

        // Cannot open twice
        assert!(matches!(
            open_voting(&pool, p.id, now).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_draft_cannot_skip_submit() {
        let pool = setup().await;
        let mut input = new_proposal(1_000);
        input.submit = false;
        let p = insert_proposal(&pool, &input, time::now()).await.unwrap();
        assert_eq!(p.status, ProposalStatus::Draft);
        assert!(open_voting(&pool, p.id, time::now()).await.is_err());

        let (old, submitted) = transition(&pool, p.id, ProposalStatus::Submitted, time::now())
            .await
            .unwrap();
        assert_eq!(old, ProposalStatus::Draft);
        assert_eq!(submitted.status, ProposalStatus::Submitted);
    }

    #[tokio::test]
    async fn test_close_without_votes_rejects() {
        let pool = setup().await;
        let p = insert_proposal(&pool, &new_proposal(1_000), time::now()).await.unwrap();
        open_voting(&pool, p.id, time::now()).await.unwrap();

        let (closed, results) = close_voting(&pool, p.id, time::now()).await.unwrap();
        assert!(!results.quorum_met);
        assert_eq!(closed.status, ProposalStatus::Rejected);
    }

    #[tokio::test]
    async fn test_expired_voting_listed() {
        let pool = setup().await;
        let start = time::now() - Duration::days(10);
        let p = insert_proposal(&pool, &new_proposal(1_000), start).await.unwrap();
        open_voting(&pool, p.id, start).await.unwrap();

        let expired = expired_voting(&pool, time::now()).await.unwrap();
        assert_eq!(expired, vec![p.id]);
        assert!(expired_voting(&pool, start).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_funding_reaches_goal() {
        let pool = setup().await;
        deposit(&pool, 10_000).await;
        let p = approved(&pool, 5_000).await;

        let first = fund_proposal(&pool, p.id, 2_000, time::now()).await.unwrap();
        assert!(!first.fully_funded);
        assert_eq!(first.proposal.status, ProposalStatus::Approved);
        assert_eq!(first.balance_cents, 8_000);

        let second = fund_proposal(&pool, p.id, 3_000, time::now()).await.unwrap();
        assert!(second.fully_funded);
        assert_eq!(second.proposal.status, ProposalStatus::Funded);
        assert_eq!(second.proposal.current_funding_cents, 5_000);
        assert_eq!(second.transaction.proposal_id, Some(p.id));
    }

    #[tokio::test]
    async fn test_funding_overshoot_writes_nothing() {
        let pool = setup().await;
        deposit(&pool, 10_000).await;
        let p = approved(&pool, 5_000).await;

        let err = fund_proposal(&pool, p.id, 6_000, time::now()).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let stored = get_proposal(&pool, p.id).await.unwrap();
        assert_eq!(stored.current_funding_cents, 0);
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dao_treasury")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_funding_limited_by_balance() {
        let pool = setup().await;
        deposit(&pool, 1_000).await;
        let p = approved(&pool, 5_000).await;

        let err = fund_proposal(&pool, p.id, 2_000, time::now()).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_listing_filters() {
        let pool = setup().await;
        insert_proposal(&pool, &new_proposal(1_000), time::now()).await.unwrap();
        let mut draft = new_proposal(2_000);
        draft.submit = false;
        draft.category = ProposalCategory::Marketing;
        insert_proposal(&pool, &draft, time::now()).await.unwrap();

        let filter = ProposalFilter {
            status: Some(ProposalStatus::Draft),
            category: None,
        };
        let page = list_proposals(&pool, filter, 50, 0).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].category, ProposalCategory::Marketing);

        let filter = ProposalFilter {
            status: None,
            category: Some(ProposalCategory::ArtistFunding),
        };
        assert_eq!(list_proposals(&pool, filter, 50, 0).await.unwrap().total, 1);
        assert_eq!(all_proposals(&pool).await.unwrap().len(), 2);
    }
}
