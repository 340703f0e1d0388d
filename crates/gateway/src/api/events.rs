//! `GET /api/v1/events?sessionId=…` — live agent events over SSE.
//!
//! Opens with a `connected` hello, then relays the session's bus events
//! until the client goes away. One SSE event per bus emit; the event name
//! is always `message`, the data is the JSON payload. Closing the stream
//! only drops the subscription — the running turn is not cancelled.

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::bus::AgentEvent;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

pub async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    let session_id = query.session_id;
    let mut rx = state.bus.subscribe(&session_id);

    tracing::debug!(session_id = %session_id, "sse subscriber attached");

    let stream = async_stream::stream! {
        let hello = AgentEvent::Connected { session_id: session_id.clone() };
        yield Ok::<_, std::convert::Infallible>(sse_event(&hello));

        loop {
            match rx.recv().await {
                Ok(event) => yield Ok(sse_event(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    // Slow subscriber: resume at the oldest retained
                    // event rather than stalling the emitter.
                    tracing::warn!(session_id = %session_id, skipped, "sse subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_event(event: &AgentEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to serialize agent event");
        String::from("{}")
    });
    Event::default().event("message").data(data)
}
