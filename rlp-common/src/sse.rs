//! Server-Sent Events stream over the event bus

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::events::EventBus;

/// SSE stream forwarding every [`crate::events::PlatformEvent`]
///
/// Sends a `ConnectionStatus` event first, then platform events as they
/// arrive, with a heartbeat comment every `heartbeat` interval. A lagging
/// client skips the dropped events and keeps streaming.
pub fn event_bus_sse_stream(
    bus: &EventBus,
    heartbeat: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = bus.subscribe();
    info!("New SSE client connected ({} subscribers)", bus.subscriber_count());

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("ConnectionStatus").data("connected"));

        let mut ticker = tokio::time::interval(heartbeat);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(json) => yield Ok(Event::default().event(event.event_type()).data(json)),
                        Err(e) => warn!("SSE: failed to serialize {}: {}", event.event_type(), e),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("SSE: client lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => {
                        info!("SSE: event bus closed");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(heartbeat).text("heartbeat"))
}
