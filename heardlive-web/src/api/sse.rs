//! Server-Sent Events for session changes
//!
//! Streams the browser session's [`SessionEvent`]s so open tabs notice
//! sign-in and sign-out. A heartbeat comment keeps proxies from closing
//! an idle stream.

use axum::{
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use futures::stream::Stream;
use heardlive_common::events::SessionEvent;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::session::BrowserSession;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

fn to_event(event: &SessionEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(data) => Event::default().event(event.event_type()).data(data),
        Err(e) => {
            warn!(error = %e, "Failed to serialize session event");
            Event::default().comment("unserializable event")
        }
    }
}

/// GET /events
pub async fn event_stream(
    Extension(session): Extension<Arc<BrowserSession>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(session_id = %session.id, "SSE client connected");
    let mut rx = session.auth.client().events().subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("ConnectionStatus").data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => yield Ok(to_event(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped = skipped, "SSE client lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
