//! Recorded agent session types.
//!
//! A `Trace` is the immutable input to the compiler: the ordered tool, UDF
//! and approval events an agent produced while completing a mission, plus
//! the final result it returned.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A recorded agent session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Trace format version.
    #[serde(default = "default_trace_version")]
    pub version: String,
    /// The application that produced the trace.
    pub app: App,
    /// What the agent was asked to do.
    pub mission: Mission,
    /// Events in `seq` order.
    #[serde(default)]
    pub events: Vec<Event>,
    /// The value the agent returned at the end of the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<Value>,
}

fn default_trace_version() -> String {
    "1".to_string()
}

/// The application that recorded a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Mission statement and the input the agent started from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_summary: Option<Value>,
}

/// One recorded event.
///
/// Internally tagged by `type`:
/// ```json
/// {"type": "tool_call", "seq": 1, "tool": "fetch_csv", "args": {...}, "result": "..."}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ToolCall {
        seq: u64,
        tool: String,
        #[serde(default)]
        args: serde_json::Map<String, Value>,
        #[serde(default)]
        result: Value,
    },
    UdfCall {
        seq: u64,
        function: String,
        #[serde(default)]
        args: serde_json::Map<String, Value>,
        #[serde(default)]
        result: Value,
    },
    Approval {
        seq: u64,
        prompt: String,
        answer: bool,
    },
}

impl Event {
    /// Position of this event in the recorded session.
    pub fn seq(&self) -> u64 {
        match self {
            Event::ToolCall { seq, .. } | Event::UdfCall { seq, .. } | Event::Approval { seq, .. } => {
                *seq
            }
        }
    }

    /// The wire tag for this event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ToolCall { .. } => "tool_call",
            Event::UdfCall { .. } => "udf_call",
            Event::Approval { .. } => "approval",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trace_deserialize_all_event_kinds() {
        let raw = json!({
            "version": "1",
            "app": {"name": "demo"},
            "mission": {"goal": "Report on a CSV", "input_summary": {"url": "fixture://demo.csv"}},
            "events": [
                {"type": "tool_call", "seq": 1, "tool": "fetch_csv", "args": {"url": "fixture://demo.csv"}, "result": "a,b\n1,2\n3,4"},
                {"type": "udf_call", "seq": 2, "function": "parse_csv", "args": {"raw_csv": "a,b\n1,2\n3,4"}, "result": {"rows": 2}},
                {"type": "approval", "seq": 3, "prompt": "Proceed?", "answer": true}
            ],
            "final_output": {"rows": 2}
        });
        let trace: Trace = serde_json::from_value(raw).unwrap();
        assert_eq!(trace.events.len(), 3);
        assert_eq!(trace.events[0].kind(), "tool_call");
        assert_eq!(trace.events[1].seq(), 2);
        assert!(matches!(trace.events[2], Event::Approval { answer: true, .. }));
        assert_eq!(trace.final_output, Some(json!({"rows": 2})));
        assert!(trace.app.version.is_none());
    }

    #[test]
    fn test_trace_version_defaults() {
        let raw = json!({"app": {"name": "demo"}, "mission": {"goal": "x"}});
        let trace: Trace = serde_json::from_value(raw).unwrap();
        assert_eq!(trace.version, "1");
        assert!(trace.events.is_empty());
        assert!(trace.final_output.is_none());
    }

    #[test]
    fn test_unknown_event_type_rejected() {
        let raw = json!({
            "app": {"name": "demo"},
            "mission": {"goal": "x"},
            "events": [{"type": "thought", "seq": 1}]
        });
        assert!(serde_json::from_value::<Trace>(raw).is_err());
    }

    #[test]
    fn test_approval_requires_boolean_answer() {
        let raw = json!({"type": "approval", "seq": 1, "prompt": "ok?", "answer": "yes"});
        assert!(serde_json::from_value::<Event>(raw).is_err());
    }
}
