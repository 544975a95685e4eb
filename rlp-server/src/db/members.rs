//! `dao_members` table

use chrono::{DateTime, Utc};
use rlp_common::governance::{Member, MembershipTier, NewMember};
use rlp_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor, SqlitePool};

use super::{parse_column, Page};

const SELECT_MEMBER: &str = r#"
    SELECT wallet_address, display_name, email, tier, active, joined_at, updated_at
    FROM dao_members
"#;

fn member_from_row(row: &SqliteRow) -> Result<Member> {
    Ok(Member {
        wallet_address: row.try_get("wallet_address")?,
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        tier: parse_column(&row.try_get::<String, _>("tier")?)?,
        active: row.try_get("active")?,
        joined_at: time::parse_db(&row.try_get::<String, _>("joined_at")?)?,
        updated_at: time::parse_db(&row.try_get::<String, _>("updated_at")?)?,
    })
}

/// Register a member; `input` must already be validated
pub async fn insert_member(pool: &SqlitePool, input: &NewMember, now: DateTime<Utc>) -> Result<Member> {
    let mut tx = pool.begin().await?;

    if fetch_member(&mut *tx, &input.wallet_address).await?.is_some() {
        return Err(Error::Conflict(format!(
            "Wallet {} is already a member",
            input.wallet_address
        )));
    }

    let ts = time::to_db(now);
    sqlx::query(
        r#"
        INSERT INTO dao_members (wallet_address, display_name, email, tier, active, joined_at, updated_at)
        VALUES (?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(&input.wallet_address)
    .bind(&input.display_name)
    .bind(&input.email)
    .bind(input.tier.as_str())
    .bind(&ts)
    .bind(&ts)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Member {
        wallet_address: input.wallet_address.clone(),
        display_name: input.display_name.clone(),
        email: input.email.clone(),
        tier: input.tier,
        active: true,
        joined_at: now,
        updated_at: now,
    })
}

pub async fn fetch_member<'e, E>(executor: E, wallet: &str) -> Result<Option<Member>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(&format!("{} WHERE wallet_address = ?", SELECT_MEMBER))
        .bind(wallet)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(member_from_row).transpose()
}

pub async fn get_member(pool: &SqlitePool, wallet: &str) -> Result<Member> {
    fetch_member(pool, wallet)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Member {}", wallet)))
}

pub async fn list_members(
    pool: &SqlitePool,
    tier: Option<MembershipTier>,
    limit: i64,
    offset: i64,
) -> Result<Page<Member>> {
    let tier = tier.map(|t| t.as_str());

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM dao_members WHERE (?1 IS NULL OR tier = ?1)",
    )
    .bind(tier)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query(&format!(
        "{} WHERE (?1 IS NULL OR tier = ?1) ORDER BY joined_at, wallet_address LIMIT ?2 OFFSET ?3",
        SELECT_MEMBER
    ))
    .bind(tier)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let items = rows.iter().map(member_from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page { items, total })
}

/// Change a member's tier, returning the previous tier
///
/// Votes already cast keep the weight they were cast with.
pub async fn update_tier(
    pool: &SqlitePool,
    wallet: &str,
    tier: MembershipTier,
    now: DateTime<Utc>,
) -> Result<(MembershipTier, Member)> {
    let mut tx = pool.begin().await?;

    let mut member = fetch_member(&mut *tx, wallet)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Member {}", wallet)))?;
    let old_tier = member.tier;

    sqlx::query("UPDATE dao_members SET tier = ?, updated_at = ? WHERE wallet_address = ?")
        .bind(tier.as_str())
        .bind(time::to_db(now))
        .bind(wallet)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    member.tier = tier;
    member.updated_at = now;
    Ok((old_tier, member))
}
