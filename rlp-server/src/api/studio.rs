//! Studio rooms, availability and bookings

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use rlp_common::csv::{format_cents, CsvWriter};
use rlp_common::events::PlatformEvent;
use rlp_common::studio::{
    available_slots, NewBooking, RoomPricing, SessionStatus, StudioRoom, StudioSession, RATE_MAX_CENTS,
};
use rlp_common::time;
use rlp_common::validation::ValidationErrors;

use super::{csv_response, parse_id, parse_param, require_param, ApiJson, ApiQuery};
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RoomView {
    pub display_name: &'static str,
    #[serde(flatten)]
    pub pricing: RoomPricing,
}

#[derive(Debug, Deserialize)]
pub struct PricingUpdate {
    pub hourly_rate_cents: i64,
    pub half_day_rate_cents: i64,
    pub full_day_rate_cents: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub room: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SlotView {
    pub start_hour: u32,
    pub end_hour: u32,
    pub label: String,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct Availability {
    pub room: StudioRoom,
    pub date: NaiveDate,
    pub bookable: bool,
    pub slots: Vec<SlotView>,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub date: Option<String>,
    pub room: Option<String>,
}

/// GET /api/studio/rooms
pub async fn list_rooms(State(state): State<AppState>) -> ApiResult<Json<Vec<RoomView>>> {
    let rooms = db::studio::list_pricing(&state.db)
        .await?
        .into_iter()
        .map(|pricing| RoomView {
            display_name: pricing.room.display_name(),
            pricing,
        })
        .collect();
    Ok(Json(rooms))
}

/// PUT /api/studio/rooms/:room
pub async fn update_room(
    State(state): State<AppState>,
    Path(room): Path<String>,
    ApiJson(update): ApiJson<PricingUpdate>,
) -> ApiResult<Json<RoomPricing>> {
    let room: StudioRoom = room.parse().map_err(ApiError::NotFound)?;

    let mut errors = ValidationErrors::new();
    for (field, value) in [
        ("hourly_rate_cents", update.hourly_rate_cents),
        ("half_day_rate_cents", update.half_day_rate_cents),
        ("full_day_rate_cents", update.full_day_rate_cents),
    ] {
        errors.check_range(field, value, 0, RATE_MAX_CENTS);
    }
    errors.into_result()?;

    let pricing = db::studio::update_pricing(
        &state.db,
        &RoomPricing {
            room,
            hourly_rate_cents: update.hourly_rate_cents,
            half_day_rate_cents: update.half_day_rate_cents,
            full_day_rate_cents: update.full_day_rate_cents,
            active: update.active,
        },
    )
    .await?;

    info!(room = %room, active = pricing.active, "Room pricing updated");
    state.event_bus.emit_lossy(PlatformEvent::RoomPricingUpdated {
        room,
        hourly_rate_cents: pricing.hourly_rate_cents,
        half_day_rate_cents: pricing.half_day_rate_cents,
        full_day_rate_cents: pricing.full_day_rate_cents,
        timestamp: time::now(),
    });
    Ok(Json(pricing))
}

/// GET /api/studio/availability?room=&date=
pub async fn availability(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AvailabilityQuery>,
) -> ApiResult<Json<Availability>> {
    let room: StudioRoom = require_param("room", query.room.as_deref())?;
    let date: NaiveDate = require_param("date", query.date.as_deref())?;

    let pricing = db::studio::get_pricing(&state.db, room).await?;
    let bookings = db::studio::sessions_for_day(&state.db, room, date).await?;
    let slots = available_slots(room, date, &bookings)
        .into_iter()
        .map(|slot| SlotView {
            start_hour: slot.start_hour,
            end_hour: slot.end_hour,
            label: slot.label(),
            available: slot.available && pricing.active,
        })
        .collect();

    Ok(Json(Availability {
        room,
        date,
        bookable: pricing.active,
        slots,
    }))
}

/// POST /api/studio/sessions
pub async fn create_session(
    State(state): State<AppState>,
    ApiJson(mut request): ApiJson<NewBooking>,
) -> ApiResult<(StatusCode, Json<StudioSession>)> {
    let now = time::now();
    request.validate(now)?;
    let session = db::studio::create_session(&state.db, &request, now).await?;

    info!(
        session_id = %session.id,
        room = %session.room,
        date = %session.session_date,
        start_hour = session.start_hour,
        hours = session.duration_hours,
        "Studio session booked"
    );
    state.event_bus.emit_lossy(PlatformEvent::StudioSessionBooked {
        session_id: session.id,
        room: session.room,
        session_date: session.session_date,
        start_hour: session.start_hour,
        duration_hours: session.duration_hours,
        booker_name: session.booker_name.clone(),
        total_cents: session.total_cents,
        timestamp: session.created_at,
    });
    state.notifier.booking_created(&session);

    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/studio/sessions?date=&room=
pub async fn list_sessions(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SessionQuery>,
) -> ApiResult<Json<Vec<StudioSession>>> {
    let date = parse_param::<NaiveDate>("date", query.date.as_deref())?;
    let room = parse_param::<StudioRoom>("room", query.room.as_deref())?;
    Ok(Json(db::studio::list_sessions(&state.db, date, room).await?))
}

async fn change_status(state: &AppState, id: &str, next: SessionStatus) -> ApiResult<Json<StudioSession>> {
    let id = parse_id(id)?;
    let (old_status, session) = db::studio::set_session_status(&state.db, id, next, time::now()).await?;

    info!(session_id = %id, from = %old_status, to = %next, "Studio session status changed");
    state.event_bus.emit_lossy(PlatformEvent::StudioSessionStatusChanged {
        session_id: id,
        old_status,
        new_status: next,
        timestamp: session.updated_at,
    });
    Ok(Json(session))
}

/// POST /api/studio/sessions/:id/confirm
pub async fn confirm_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<StudioSession>> {
    change_status(&state, &id, SessionStatus::Confirmed).await
}

/// POST /api/studio/sessions/:id/cancel
pub async fn cancel_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<StudioSession>> {
    change_status(&state, &id, SessionStatus::Cancelled).await
}

/// POST /api/studio/sessions/:id/complete
pub async fn complete_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<StudioSession>> {
    change_status(&state, &id, SessionStatus::Completed).await
}

/// GET /api/studio/sessions/export.csv
pub async fn export_sessions(State(state): State<AppState>) -> ApiResult<Response> {
    let sessions = db::studio::list_sessions(&state.db, None, None).await?;

    let mut csv = CsvWriter::with_headers(&[
        "id",
        "room",
        "date",
        "start",
        "end",
        "hours",
        "booker_name",
        "booker_email",
        "artist_name",
        "total",
        "status",
        "notes",
    ]);
    for s in &sessions {
        csv.write_record([
            s.id.to_string(),
            s.room.display_name().to_string(),
            s.session_date.to_string(),
            format!("{:02}:00", s.start_hour),
            format!("{:02}:00", s.end_hour()),
            s.duration_hours.to_string(),
            s.booker_name.clone(),
            s.booker_email.clone(),
            s.artist_name.clone().unwrap_or_default(),
            format_cents(s.total_cents),
            s.status.to_string(),
            s.notes.clone().unwrap_or_default(),
        ]);
    }
    Ok(csv_response("studio-sessions.csv", csv.finish()))
}
