//! `dao_votes` table

use chrono::{DateTime, Utc};
use rlp_common::governance::{CastVote, Member, Proposal, Vote, VoteChoice};
use rlp_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor, SqlitePool};
use uuid::Uuid;

use super::members::fetch_member;
use super::proposals::fetch_proposal;
use super::{parse_column, parse_uuid};

fn vote_from_row(row: &SqliteRow) -> Result<Vote> {
    Ok(Vote {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        proposal_id: parse_uuid(&row.try_get::<String, _>("proposal_id")?)?,
        voter_wallet: row.try_get("voter_wallet")?,
        choice: parse_column(&row.try_get::<String, _>("choice")?)?,
        tier: parse_column(&row.try_get::<String, _>("tier")?)?,
        weight: row.try_get("weight")?,
        reason: row.try_get("reason")?,
        cast_at: time::parse_db(&row.try_get::<String, _>("cast_at")?)?,
    })
}

/// Ballots for a proposal in cast order
pub async fn fetch_votes<'e, E>(executor: E, proposal_id: Uuid) -> Result<Vec<Vote>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query(
        r#"
        SELECT id, proposal_id, voter_wallet, choice, tier, weight, reason, cast_at
        FROM dao_votes
        WHERE proposal_id = ?
        ORDER BY cast_at, rowid
        "#,
    )
    .bind(proposal_id.to_string())
    .fetch_all(executor)
    .await?;
    rows.iter().map(vote_from_row).collect()
}

pub async fn list_votes(pool: &SqlitePool, proposal_id: Uuid) -> Result<Vec<Vote>> {
    fetch_proposal(pool, proposal_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Proposal {}", proposal_id)))?;
    fetch_votes(pool, proposal_id).await
}

/// Accepted ballot with the voter and the proposal's updated tallies
#[derive(Debug, Clone)]
pub struct CastOutcome {
    pub vote: Vote,
    pub voter: Member,
    pub proposal: Proposal,
}

/// Record a ballot and add its weight to the proposal tallies
///
/// Weight comes from the voter's tier at this moment. The proposal must be
/// in an open voting window, the voter an active member, and a wallet may
/// vote once per proposal; the unique index backs that last rule if two
/// ballots race.
pub async fn cast_vote(
    pool: &SqlitePool,
    proposal_id: Uuid,
    input: &CastVote,
    now: DateTime<Utc>,
) -> Result<CastOutcome> {
    let mut tx = pool.begin().await?;

    let mut proposal = fetch_proposal(&mut *tx, proposal_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Proposal {}", proposal_id)))?;
    if !proposal.is_voting_active(now) {
        return Err(Error::Conflict(format!(
            "Voting is not open for proposal {}",
            proposal_id
        )));
    }

    let voter = fetch_member(&mut *tx, &input.voter_wallet)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Member {}", input.voter_wallet)))?;
    if !voter.active {
        return Err(Error::Conflict(format!(
            "Member {} is not active",
            voter.wallet_address
        )));
    }

    let already: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM dao_votes WHERE proposal_id = ? AND voter_wallet = ?)",
    )
    .bind(proposal_id.to_string())
    .bind(&input.voter_wallet)
    .fetch_one(&mut *tx)
    .await?;
    if already {
        return Err(Error::Conflict(format!(
            "{} has already voted on proposal {}",
            input.voter_wallet, proposal_id
        )));
    }

    let vote = Vote {
        id: Uuid::new_v4(),
        proposal_id,
        voter_wallet: voter.wallet_address.clone(),
        choice: input.choice,
        tier: voter.tier,
        weight: i64::from(voter.vote_weight()),
        reason: input.reason.clone(),
        cast_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO dao_votes (id, proposal_id, voter_wallet, choice, tier, weight, reason, cast_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(vote.id.to_string())
    .bind(proposal_id.to_string())
    .bind(&vote.voter_wallet)
    .bind(vote.choice.as_str())
    .bind(vote.tier.as_str())
    .bind(vote.weight)
    .bind(&vote.reason)
    .bind(time::to_db(now))
    .execute(&mut *tx)
    .await?;

    let column = match vote.choice {
        VoteChoice::For => "votes_for_weight",
        VoteChoice::Against => "votes_against_weight",
        VoteChoice::Abstain => "votes_abstain_weight",
    };
    sqlx::query(&format!(
        "UPDATE dao_proposals SET {col} = {col} + ?, voter_count = voter_count + 1, updated_at = ? WHERE id = ?",
        col = column
    ))
    .bind(vote.weight)
    .bind(time::to_db(now))
    .bind(proposal_id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let mut counted = proposal.tally();
    counted.record(vote.choice, vote.weight);
    proposal.votes_for_weight = counted.for_weight;
    proposal.votes_against_weight = counted.against_weight;
    proposal.votes_abstain_weight = counted.abstain_weight;
    proposal.voter_count = counted.voter_count;
    proposal.updated_at = now;

    Ok(CastOutcome {
        vote,
        voter,
        proposal,
    })
}

/// Ballots and their total weight cast in `[start, end)`
pub async fn votes_between(
    pool: &SqlitePool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(i64, i64)> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS ballots, COALESCE(SUM(weight), 0) AS weight FROM dao_votes WHERE cast_at >= ? AND cast_at < ?",
    )
    .bind(time::to_db(start))
    .bind(time::to_db(end))
    .fetch_one(pool)
    .await?;
    Ok((row.try_get("ballots")?, row.try_get("weight")?))
}
