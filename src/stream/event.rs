//! Event Dispatcher
//!
//! Parses a decoded frame into one of the five protocol events and routes it
//! to the matching callback.

use crate::models::{GovernanceResult, InterruptRequest, ThinkingStep};
use crate::stream::StreamError;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Event name and raw data of one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub event: String,
    pub data: String,
}

/// Semantic event carried by a frame
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Thinking(ThinkingStep),
    /// Opaque progress payload, only meaningful to the UI
    Progress(Value),
    Interrupt(InterruptRequest),
    Complete(Box<GovernanceResult>),
    /// Backend-reported failure, from `error` or an unsuccessful `complete`
    Error(String),
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Thinking(_) => "thinking",
            StreamEvent::Progress(_) => "progress",
            StreamEvent::Interrupt(_) => "interrupt",
            StreamEvent::Complete(_) => "complete",
            StreamEvent::Error(_) => "error",
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletePayload {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: Option<String>,
}

/// Locate the `event:` and `data:` lines of a frame. Multiple `data:` lines
/// are joined with newlines. Returns None when either is missing.
pub fn split_frame(frame: &str) -> Option<RawFrame> {
    let mut event = None;
    let mut data: Option<String> = None;

    for line in frame.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            if event.is_none() {
                event = Some(name.trim().to_string());
            }
        } else if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }

    match (event, data) {
        (Some(event), Some(data)) if !event.is_empty() => Some(RawFrame { event, data }),
        _ => None,
    }
}

/// Parse one frame.
///
/// `Ok(None)` means the frame is skipped: either line is missing, or the
/// event name is unknown. Unparseable data is a protocol error.
pub fn parse_frame(frame: &str) -> Result<Option<StreamEvent>, StreamError> {
    let Some(raw) = split_frame(frame) else {
        debug!("Skipping frame without event/data lines");
        return Ok(None);
    };

    let data: Value = serde_json::from_str(&raw.data).map_err(|e| protocol(&raw.event, e))?;

    let event = match raw.event.as_str() {
        "thinking" => StreamEvent::Thinking(
            serde_json::from_value(data).map_err(|e| protocol(&raw.event, e))?,
        ),
        "progress" => StreamEvent::Progress(data),
        "interrupt" => StreamEvent::Interrupt(
            serde_json::from_value(data).map_err(|e| protocol(&raw.event, e))?,
        ),
        "complete" => {
            let payload: CompletePayload =
                serde_json::from_value(data).map_err(|e| protocol(&raw.event, e))?;
            match payload.data {
                Some(result) if payload.success && !result.is_null() => {
                    let result: GovernanceResult =
                        serde_json::from_value(result).map_err(|e| protocol(&raw.event, e))?;
                    StreamEvent::Complete(Box::new(result))
                }
                _ => StreamEvent::Error(
                    payload.error.unwrap_or_else(|| "Analysis failed".to_string()),
                ),
            }
        }
        "error" => {
            let payload: ErrorPayload =
                serde_json::from_value(data).map_err(|e| protocol(&raw.event, e))?;
            StreamEvent::Error(payload.message.unwrap_or_else(|| "Unknown error".to_string()))
        }
        other => {
            debug!("Ignoring unknown event '{}'", other);
            return Ok(None);
        }
    };

    Ok(Some(event))
}

fn protocol(event: &str, err: serde_json::Error) -> StreamError {
    StreamError::Protocol {
        event: event.to_string(),
        message: err.to_string(),
    }
}

/// Callbacks for dispatched events
pub trait EventHandler {
    fn on_thinking(&mut self, step: &ThinkingStep);

    fn on_progress(&mut self, _payload: &Value) {}

    fn on_interrupt(&mut self, request: &InterruptRequest);

    fn on_complete(&mut self, result: &GovernanceResult);

    fn on_error(&mut self, message: &str);

    /// The run was aborted by the caller
    fn on_cancelled(&mut self) {}
}

/// Invoke the callback matching `event`
pub fn dispatch<H: EventHandler + ?Sized>(event: &StreamEvent, handler: &mut H) {
    match event {
        StreamEvent::Thinking(step) => handler.on_thinking(step),
        StreamEvent::Progress(payload) => handler.on_progress(payload),
        StreamEvent::Interrupt(request) => handler.on_interrupt(request),
        StreamEvent::Complete(result) => handler.on_complete(result),
        StreamEvent::Error(message) => handler.on_error(message),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Phase;

    /// Records every callback in order
    #[derive(Debug, Default)]
    pub(crate) struct Recorder {
        pub calls: Vec<String>,
    }

    impl EventHandler for Recorder {
        fn on_thinking(&mut self, step: &ThinkingStep) {
            self.calls.push(format!("thinking:{}", step.title));
        }
        fn on_progress(&mut self, _payload: &Value) {
            self.calls.push("progress".to_string());
        }
        fn on_interrupt(&mut self, request: &InterruptRequest) {
            self.calls.push(format!("interrupt:{}", request.kind));
        }
        fn on_complete(&mut self, result: &GovernanceResult) {
            self.calls.push(format!("complete:{}", result.summary));
        }
        fn on_error(&mut self, message: &str) {
            self.calls.push(format!("error:{}", message));
        }
        fn on_cancelled(&mut self) {
            self.calls.push("cancelled".to_string());
        }
    }

    #[test]
    fn test_split_frame() {
        let raw = split_frame("id: 7\nevent: thinking\ndata: {\"a\":1}").unwrap();
        assert_eq!(raw.event, "thinking");
        assert_eq!(raw.data, "{\"a\":1}");

        assert_eq!(split_frame("event: thinking"), None);
        assert_eq!(split_frame("data: {}"), None);
        assert_eq!(split_frame(": keep-alive"), None);
    }

    #[test]
    fn test_multiline_data_is_joined() {
        let raw = split_frame("event: progress\ndata: {\"a\":\ndata: 1}").unwrap();
        assert_eq!(raw.data, "{\"a\":\n1}");
        assert!(parse_frame("event: progress\ndata: {\"a\":\ndata: 1}").unwrap().is_some());
    }

    #[test]
    fn test_parse_thinking() {
        let event = parse_frame(
            "event: thinking\ndata: {\"phase\":\"A\",\"title\":\"抽取属性\",\"details\":[\"orders\"]}",
        )
        .unwrap()
        .unwrap();

        match event {
            StreamEvent::Thinking(step) => {
                assert_eq!(step.phase, Phase::A);
                assert_eq!(step.details, vec!["orders".to_string()]);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_complete_success_and_failure() {
        let ok = parse_frame("event: complete\ndata: {\"success\":true,\"data\":{\"summary\":\"s\"}}")
            .unwrap()
            .unwrap();
        assert!(matches!(ok, StreamEvent::Complete(ref r) if r.summary == "s"));

        let failed = parse_frame("event: complete\ndata: {\"success\":false,\"error\":\"quota\"}")
            .unwrap()
            .unwrap();
        assert_eq!(failed, StreamEvent::Error("quota".to_string()));

        let no_data = parse_frame("event: complete\ndata: {\"success\":true}").unwrap().unwrap();
        assert!(matches!(no_data, StreamEvent::Error(_)));
    }

    #[test]
    fn test_error_event_message() {
        let event = parse_frame("event: error\ndata: {\"message\":\"LLM timeout\"}")
            .unwrap()
            .unwrap();
        assert_eq!(event, StreamEvent::Error("LLM timeout".to_string()));
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        assert_eq!(parse_frame("event: heartbeat\ndata: {}").unwrap(), None);
    }

    #[test]
    fn test_malformed_json_is_protocol_error() {
        let err = parse_frame("event: thinking\ndata: {not json").unwrap_err();
        assert!(matches!(err, StreamError::Protocol { ref event, .. } if event == "thinking"));
    }

    #[test]
    fn test_dispatch_routes_to_matching_callback() {
        let mut recorder = Recorder::default();
        let events = [
            StreamEvent::Progress(Value::Null),
            StreamEvent::Error("boom".to_string()),
            StreamEvent::Complete(Box::new(GovernanceResult {
                summary: "ok".to_string(),
                ..Default::default()
            })),
        ];
        for event in &events {
            dispatch(event, &mut recorder);
        }
        assert_eq!(recorder.calls, vec!["progress", "error:boom", "complete:ok"]);
    }
}
