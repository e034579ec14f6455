//! Server-Sent Events support
//!
//! One `step` event per completed controller step, then a single `done` or
//! `error` event.

use crate::runtime::{AdvanceStream, AgentError, StepUpdate};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;

/// Convert an advance stream to an SSE response.
///
/// The advance stream is dropped when the client disconnects, which stops
/// the run after its in-flight step.
pub fn sse_stream(updates: AdvanceStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let run_id = updates.run_id().to_string();

    let events = stream::unfold(Some(updates), move |updates| {
        let run_id = run_id.clone();
        async move {
            let mut updates = updates?;
            match updates.next().await {
                Some(Ok(update)) => Some((step_event(&update), Some(updates))),
                Some(Err(e)) => Some((error_event(&e), None)),
                None => Some((done_event(&run_id), None)),
            }
        }
    })
    .map(Ok);

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn step_event(update: &StepUpdate) -> Event {
    match serde_json::to_string(update) {
        Ok(data) => Event::default().event("step").data(data),
        Err(e) => Event::default().event("error").data(
            json!({
                "type": "error",
                "message": format!("Failed to encode step: {e}"),
                "retryable": false
            })
            .to_string(),
        ),
    }
}

fn error_event(error: &AgentError) -> Event {
    Event::default().event("error").data(
        json!({
            "type": "error",
            "message": error.to_string(),
            "retryable": error.is_retryable()
        })
        .to_string(),
    )
}

fn done_event(run_id: &str) -> Event {
    Event::default().event("done").data(
        json!({
            "type": "done",
            "run_id": run_id
        })
        .to_string(),
    )
}
