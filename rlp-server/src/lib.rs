//! rlp-server library
//!
//! HTTP API for the record label platform: DAO governance, treasury,
//! studio booking and weekly digests. The binary in `main.rs` wires
//! configuration, integrations and background jobs around [`build_router`].

use axum::Router;
use sqlx::SqlitePool;
use std::time::{Duration, Instant};
use tower_http::trace::TraceLayer;

use rlp_common::events::EventBus;

pub mod api;
pub mod db;
pub mod error;
pub mod pagination;
pub mod services;

use services::digest::DigestService;
use services::Notifier;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(15);

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub notifier: Notifier,
    pub digests: DigestService,
    /// SSE heartbeat interval
    pub heartbeat: Duration,
    pub startup_time: Instant,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, notifier: Notifier, digests: DigestService) -> Self {
        Self {
            db,
            event_bus,
            notifier,
            digests,
            heartbeat: DEFAULT_HEARTBEAT,
            startup_time: Instant::now(),
        }
    }

    /// State with every outbound integration disabled
    pub fn without_integrations(db: SqlitePool) -> Self {
        let event_bus = EventBus::new(DEFAULT_EVENT_CAPACITY);
        let digests = DigestService::new(db.clone(), event_bus.clone(), None, None, false);
        Self::new(db, event_bus, Notifier::disabled(), digests)
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use api::{digests, events, members, proposals, studio, treasury, votes};
    use axum::routing::{get, post, put};

    let governance = Router::new()
        .route("/api/members", post(members::create_member).get(members::list_members))
        .route("/api/members/:wallet", get(members::get_member))
        .route("/api/members/:wallet/tier", put(members::update_tier))
        .route(
            "/api/proposals",
            post(proposals::create_proposal).get(proposals::list_proposals),
        )
        .route("/api/proposals/export.csv", get(proposals::export_proposals))
        .route("/api/proposals/:id", get(proposals::get_proposal))
        .route("/api/proposals/:id/submit", post(proposals::submit_proposal))
        .route("/api/proposals/:id/open-voting", post(proposals::open_voting))
        .route("/api/proposals/:id/close", post(proposals::close_voting))
        .route("/api/proposals/:id/cancel", post(proposals::cancel_proposal))
        .route("/api/proposals/:id/complete", post(proposals::complete_proposal))
        .route("/api/proposals/:id/fund", post(proposals::fund_proposal))
        .route("/api/proposals/:id/results", get(proposals::get_results))
        .route("/api/proposals/:id/votes", post(votes::cast_vote).get(votes::list_votes))
        .route("/api/proposals/:id/votes.csv", get(votes::export_votes))
        .route("/api/treasury", get(treasury::ledger).post(treasury::record_transaction))
        .route("/api/treasury/summary", get(treasury::summary))
        .route("/api/treasury/export.csv", get(treasury::export_ledger));

    let studio = Router::new()
        .route("/api/studio/rooms", get(studio::list_rooms))
        .route("/api/studio/rooms/:room", put(studio::update_room))
        .route("/api/studio/availability", get(studio::availability))
        .route(
            "/api/studio/sessions",
            post(studio::create_session).get(studio::list_sessions),
        )
        .route("/api/studio/sessions/export.csv", get(studio::export_sessions))
        .route("/api/studio/sessions/:id/confirm", post(studio::confirm_session))
        .route("/api/studio/sessions/:id/cancel", post(studio::cancel_session))
        .route("/api/studio/sessions/:id/complete", post(studio::complete_session));

    let digest = Router::new()
        .route("/api/digests", get(digests::list_digests))
        .route("/api/digests/latest", get(digests::latest_digest))
        .route("/api/digests/generate", post(digests::generate_digest));

    Router::new()
        .merge(governance)
        .merge(studio)
        .merge(digest)
        .route("/events", get(events::event_stream))
        .merge(api::health::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
