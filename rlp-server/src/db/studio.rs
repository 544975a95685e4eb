//! `room_pricing` and `studio_sessions` tables

use chrono::{DateTime, NaiveDate, Utc};
use rlp_common::studio::{
    check_conflict, quote, NewBooking, RoomPricing, SessionStatus, StudioRoom, StudioSession,
};
use rlp_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor, SqlitePool};
use uuid::Uuid;

use super::{parse_column, parse_uuid};

const SELECT_SESSION: &str = r#"
    SELECT id, room, session_date, start_hour, duration_hours, booker_name, booker_email,
           artist_name, notes, total_cents, status, created_at, updated_at
    FROM studio_sessions
"#;

fn pricing_from_row(row: &SqliteRow) -> Result<RoomPricing> {
    Ok(RoomPricing {
        room: parse_column(&row.try_get::<String, _>("room")?)?,
        hourly_rate_cents: row.try_get("hourly_rate_cents")?,
        half_day_rate_cents: row.try_get("half_day_rate_cents")?,
        full_day_rate_cents: row.try_get("full_day_rate_cents")?,
        active: row.try_get("active")?,
    })
}

fn session_from_row(row: &SqliteRow) -> Result<StudioSession> {
    let date: String = row.try_get("session_date")?;
    Ok(StudioSession {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        room: parse_column(&row.try_get::<String, _>("room")?)?,
        session_date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| Error::Internal(format!("Invalid stored date '{}': {}", date, e)))?,
        start_hour: row.try_get("start_hour")?,
        duration_hours: row.try_get("duration_hours")?,
        booker_name: row.try_get("booker_name")?,
        booker_email: row.try_get("booker_email")?,
        artist_name: row.try_get("artist_name")?,
        notes: row.try_get("notes")?,
        total_cents: row.try_get("total_cents")?,
        status: parse_column(&row.try_get::<String, _>("status")?)?,
        created_at: time::parse_db(&row.try_get::<String, _>("created_at")?)?,
        updated_at: time::parse_db(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub async fn list_pricing(pool: &SqlitePool) -> Result<Vec<RoomPricing>> {
    let rows = sqlx::query(
        "SELECT room, hourly_rate_cents, half_day_rate_cents, full_day_rate_cents, active FROM room_pricing",
    )
    .fetch_all(pool)
    .await?;
    let mut pricing = rows.iter().map(pricing_from_row).collect::<Result<Vec<_>>>()?;
    pricing.sort_by_key(|p| StudioRoom::ALL.iter().position(|r| *r == p.room));
    Ok(pricing)
}

pub async fn get_pricing<'e, E>(executor: E, room: StudioRoom) -> Result<RoomPricing>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT room, hourly_rate_cents, half_day_rate_cents, full_day_rate_cents, active FROM room_pricing WHERE room = ?",
    )
    .bind(room.as_str())
    .fetch_optional(executor)
    .await?;
    match row {
        Some(row) => pricing_from_row(&row),
        None => Err(Error::NotFound(format!("Pricing for {}", room))),
    }
}

/// Replace a room's rates and availability flag
pub async fn update_pricing(pool: &SqlitePool, pricing: &RoomPricing) -> Result<RoomPricing> {
    let updated = sqlx::query(
        r#"
        UPDATE room_pricing
        SET hourly_rate_cents = ?, half_day_rate_cents = ?, full_day_rate_cents = ?,
            active = ?, updated_at = CURRENT_TIMESTAMP
        WHERE room = ?
        "#,
    )
    .bind(pricing.hourly_rate_cents)
    .bind(pricing.half_day_rate_cents)
    .bind(pricing.full_day_rate_cents)
    .bind(pricing.active)
    .bind(pricing.room.as_str())
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(Error::NotFound(format!("Pricing for {}", pricing.room)));
    }
    Ok(pricing.clone())
}

/// All sessions for one room on one date, any status
pub async fn sessions_for_day<'e, E>(
    executor: E,
    room: StudioRoom,
    date: NaiveDate,
) -> Result<Vec<StudioSession>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query(&format!(
        "{} WHERE room = ? AND session_date = ? ORDER BY start_hour",
        SELECT_SESSION
    ))
    .bind(room.as_str())
    .bind(date_key(date))
    .fetch_all(executor)
    .await?;
    rows.iter().map(session_from_row).collect()
}

pub async fn list_sessions(
    pool: &SqlitePool,
    date: Option<NaiveDate>,
    room: Option<StudioRoom>,
) -> Result<Vec<StudioSession>> {
    let rows = sqlx::query(&format!(
        "{} WHERE (?1 IS NULL OR session_date = ?1) AND (?2 IS NULL OR room = ?2) ORDER BY session_date, start_hour, room",
        SELECT_SESSION
    ))
    .bind(date.map(date_key))
    .bind(room.map(|r| r.as_str()))
    .fetch_all(pool)
    .await?;
    rows.iter().map(session_from_row).collect()
}

pub async fn get_session<'e, E>(executor: E, id: Uuid) -> Result<StudioSession>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_SESSION))
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;
    match row {
        Some(row) => session_from_row(&row),
        None => Err(Error::NotFound(format!("Studio session {}", id))),
    }
}

/// Book a validated request
///
/// The conflict scan and the insert share one transaction.
pub async fn create_session(
    pool: &SqlitePool,
    request: &NewBooking,
    now: DateTime<Utc>,
) -> Result<StudioSession> {
    let mut tx = pool.begin().await?;

    let pricing = get_pricing(&mut *tx, request.room).await?;
    if !pricing.active {
        return Err(Error::Conflict(format!(
            "{} is not currently bookable",
            request.room.display_name()
        )));
    }

    let existing = sessions_for_day(&mut *tx, request.room, request.session_date).await?;
    check_conflict(request, &existing)?;

    let session = StudioSession {
        id: Uuid::new_v4(),
        room: request.room,
        session_date: request.session_date,
        start_hour: request.start_hour,
        duration_hours: request.duration_hours,
        booker_name: request.booker_name.clone(),
        booker_email: request.booker_email.clone(),
        artist_name: request.artist_name.clone(),
        notes: request.notes.clone(),
        total_cents: quote(&pricing, request.duration_hours),
        status: SessionStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    let ts = time::to_db(now);
    sqlx::query(
        r#"
        INSERT INTO studio_sessions (
            id, room, session_date, start_hour, duration_hours, booker_name, booker_email,
            artist_name, notes, total_cents, status, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session.id.to_string())
    .bind(session.room.as_str())
    .bind(date_key(session.session_date))
    .bind(session.start_hour)
    .bind(session.duration_hours)
    .bind(&session.booker_name)
    .bind(&session.booker_email)
    .bind(&session.artist_name)
    .bind(&session.notes)
    .bind(session.total_cents)
    .bind(session.status.as_str())
    .bind(&ts)
    .bind(&ts)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(session)
}

/// Move a booking to `next`, returning the previous status
pub async fn set_session_status(
    pool: &SqlitePool,
    id: Uuid,
    next: SessionStatus,
    now: DateTime<Utc>,
) -> Result<(SessionStatus, StudioSession)> {
    let mut tx = pool.begin().await?;

    let mut session = get_session(&mut *tx, id).await?;
    if !session.status.can_transition_to(next) {
        return Err(Error::Conflict(format!(
            "Studio session {} cannot move from {} to {}",
            id, session.status, next
        )));
    }
    let previous = session.status;

    sqlx::query("UPDATE studio_sessions SET status = ?, updated_at = ? WHERE id = ?")
        .bind(next.as_str())
        .bind(time::to_db(now))
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    session.status = next;
    session.updated_at = now;
    Ok((previous, session))
}

/// Live bookings created in `[start, end)`: (count, booked hours)
pub async fn bookings_between(
    pool: &SqlitePool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(i64, i64)> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS sessions, COALESCE(SUM(duration_hours), 0) AS hours
        FROM studio_sessions
        WHERE created_at >= ? AND created_at < ? AND status != 'cancelled'
        "#,
    )
    .bind(time::to_db(start))
    .bind(time::to_db(end))
    .fetch_one(pool)
    .await?;
    Ok((row.try_get("sessions")?, row.try_get("hours")?))
}
