//! Run Event Logger
//!
//! Structured events (status changes, tool calls, tool outputs, errors) emitted
//! on the `run_events` target.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    StatusChanged {
        run_id: String,
        status: String,
    },
    ToolCall {
        run_id: String,
        call_id: String,
        function: String,
        arguments_json: String,
    },
    ToolOutput {
        run_id: String,
        call_id: String,
        output_json: String,
    },
    Error {
        kind: String,
        error_msg: String,
    },
}

impl RunEvent {
    fn redacted(mut self) -> Self {
        match &mut self {
            RunEvent::ToolCall { arguments_json, .. } => {
                *arguments_json = redact_sensitive_data(arguments_json);
            }
            RunEvent::ToolOutput { output_json, .. } => {
                *output_json = redact_sensitive_data(output_json);
            }
            RunEvent::Error { error_msg, .. } => {
                *error_msg = redact_sensitive_data(error_msg);
            }
            RunEvent::StatusChanged { .. } => {}
        }
        self
    }
}

#[derive(Debug, Serialize)]
pub struct RunEventEntry {
    pub thread_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: RunEvent,
}

pub struct RunEventLogger;

impl RunEventLogger {
    /// Build the redacted log entry for an event.
    pub fn entry(thread_id: &str, event: RunEvent) -> RunEventEntry {
        RunEventEntry {
            thread_id: thread_id.into(),
            timestamp: Utc::now(),
            event: event.redacted(),
        }
    }

    /// Log a run event with its payloads redacted.
    pub fn log_event(thread_id: &str, event: RunEvent) {
        let entry = Self::entry(thread_id, event);
        let payload = serde_json::to_string(&entry).unwrap_or_else(|e| e.to_string());
        info!(target: "run_events", thread_id = %entry.thread_id, event = %payload, "Run event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_arguments_redacted() {
        let entry = RunEventLogger::entry(
            "T1",
            RunEvent::ToolCall {
                run_id: "R1".into(),
                call_id: "c1".into(),
                function: "resolve_order".into(),
                arguments_json: r#"{"token":"Bearer abcdef123456"}"#.into(),
            },
        );
        match entry.event {
            RunEvent::ToolCall { arguments_json, .. } => {
                assert!(arguments_json.contains("[REDACTED_TOKEN]"));
                assert!(!arguments_json.contains("abcdef123456"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_entry_serializes_tagged() {
        let entry = RunEventLogger::entry(
            "T1",
            RunEvent::StatusChanged {
                run_id: "R1".into(),
                status: "requires_action".into(),
            },
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["thread_id"], "T1");
        assert_eq!(json["event"]["type"], "status_changed");
        assert_eq!(json["event"]["status"], "requires_action");
    }
}
