//! Read handler
//!
//! Streams response envelopes as Server-Sent Events until the session is
//! stopped. Dropping the connection does not stop reading.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use obd_core::ResponseEnvelope;
use serde::Deserialize;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use crate::state::AppState;

/// Query parameters for read
#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    /// Comma-separated command names to narrow the sample set
    pub commands: Option<String>,
}

/// GET /obd/v1/read
///
/// Example: GET /obd/v1/read?commands=SPEED,RPM
pub async fn read(
    State(state): State<AppState>,
    Query(query): Query<ReadQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let commands = query.commands.as_deref().map(parse_commands);
    let envelopes = state.session().read(commands).await;

    let events = envelopes
        .filter_map(|envelope| sample_event(&envelope).map(Ok::<_, Infallible>));

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// One `sample` event per envelope; envelopes that fail to encode are
/// logged and skipped
fn sample_event(envelope: &ResponseEnvelope) -> Option<Event> {
    let event = Event::default().event("sample").id(envelope.seq.to_string());
    match event.json_data(envelope) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(seq = envelope.seq, error = %e, "Cannot encode envelope, event skipped");
            None
        }
    }
}

fn parse_commands(commands: &str) -> Vec<String> {
    commands
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use obd_core::LinkStatus;

    #[test]
    fn test_sample_event_encodes_envelope() {
        let envelope = ResponseEnvelope::status(LinkStatus::new(true, false))
            .with_seq(7)
            .with_error("OBD communication error: timeout");
        let event = sample_event(&envelope).expect("envelope encodes");

        let rendered = format!("{:?}", event);
        assert!(rendered.contains("sample"));
        assert!(rendered.contains("OBD communication error: timeout"));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_commands("SPEED, RPM,,"), vec!["SPEED", "RPM"]);
        assert!(parse_commands("").is_empty());
    }
}
