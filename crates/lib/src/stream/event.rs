//! Stream payloads and how they change the target assistant message.

use crate::session::{MessageId, SessionState};
use crate::stream::Frame;
use serde::Deserialize;
use serde_json::Value;

/// End-of-stream marker some backends send as a bare data line.
const DONE_MARKER: &str = "[DONE]";

/// One decoded stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental token(s) to append.
    Append(String),
    /// Full corrected content replacing what was streamed so far.
    Replace(String),
    /// Backend-reported failure; no further payloads of the dispatch are applied.
    Error(String),
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    replace: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl Payload {
    fn into_event(self) -> Option<StreamEvent> {
        if let Some(err) = self.error.and_then(error_message) {
            return Some(StreamEvent::Error(err));
        }
        let text = self.text?;
        if self.replace.as_ref().is_some_and(truthy) {
            Some(StreamEvent::Replace(text))
        } else {
            Some(StreamEvent::Append(text))
        }
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn error_message(v: Value) -> Option<String> {
    if !truthy(&v) {
        return None;
    }
    match v {
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Parse every `data:` payload of a frame into events.
///
/// Each line is parsed on its own first. A line whose JSON ends early is held; when a
/// following data line of the same frame does not parse by itself, it is tried joined to
/// the held text (SSE multi-line data). Held text that never completes is dropped.
/// Malformed payloads are logged and skipped.
pub fn events_from_frame(frame: &Frame) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    let mut held: Option<String> = None;
    for line in &frame.data {
        if line.trim() == DONE_MARKER {
            continue;
        }
        let alone = match serde_json::from_str::<Payload>(line) {
            Ok(p) => {
                if let Some(prev) = held.take() {
                    log::debug!("dropping incomplete stream payload ({} bytes)", prev.len());
                }
                events.extend(p.into_event());
                continue;
            }
            Err(e) => e,
        };
        if let Some(prev) = held.take() {
            let joined = format!("{}\n{}", prev, line);
            match serde_json::from_str::<Payload>(&joined) {
                Ok(p) => {
                    events.extend(p.into_event());
                    continue;
                }
                Err(e) if e.is_eof() => {
                    held = Some(joined);
                    continue;
                }
                Err(e) => log::debug!("dropping malformed stream payload: {}", e),
            }
        }
        if alone.is_eof() {
            held = Some(line.clone());
        } else {
            log::debug!("dropping malformed stream payload: {}", alone);
        }
    }
    if let Some(rest) = held {
        log::debug!("dropping incomplete stream payload ({} bytes)", rest.len());
    }
    events
}

/// Outcome of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Continue,
    /// The backend reported an error; ignore the rest of this dispatch's payloads.
    Halt,
}

/// Apply `event` to the assistant message `target`.
pub fn apply_event(state: &mut SessionState, target: MessageId, event: StreamEvent) -> Applied {
    match event {
        StreamEvent::Error(message) => {
            state.set_error(Some(message));
            Applied::Halt
        }
        StreamEvent::Replace(full) => {
            state.mutate(target, |m| m.content = full);
            Applied::Continue
        }
        StreamEvent::Append(delta) => {
            state.mutate(target, |m| m.content.push_str(&delta));
            Applied::Continue
        }
    }
}
