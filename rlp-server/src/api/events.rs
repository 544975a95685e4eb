//! Server-Sent Events for platform activity

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /events
///
/// Streams every `PlatformEvent` as JSON, named by its type, after an
/// initial `ConnectionStatus` event.
pub async fn event_stream(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    rlp_common::sse::event_bus_sse_stream(&state.event_bus, state.heartbeat)
}
