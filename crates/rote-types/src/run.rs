//! Run tracking types.
//!
//! `RunState` is the engine's persisted snapshot of a suspended run.
//! `RunResult` is what `run`, `resume` and `cancel` hand back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::Context;
use crate::routine::PromptField;

// ---------------------------------------------------------------------------
// Status and failures
// ---------------------------------------------------------------------------

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    NeedsInput,
    Ok,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::NeedsInput => "needs_input",
            RunStatus::Ok => "ok",
            RunStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Classification of an in-routine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ToolInvocation,
    UdfExecution,
    Assertion,
    Timeout,
    Credential,
    UndefinedVariable,
    Expression,
    RecoveryExhausted,
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::ToolInvocation => "tool_invocation",
            FailureKind::UdfExecution => "udf_execution",
            FailureKind::Assertion => "assertion",
            FailureKind::Timeout => "timeout",
            FailureKind::Credential => "credential",
            FailureKind::UndefinedVariable => "undefined_variable",
            FailureKind::Expression => "expression",
            FailureKind::RecoveryExhausted => "recovery_exhausted",
            FailureKind::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Structured record of why a run failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub step_id: String,
    pub kind: FailureKind,
    pub message: String,
}

// ---------------------------------------------------------------------------
// RunResult
// ---------------------------------------------------------------------------

/// Outcome of `run`, `resume` or `cancel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
    /// Id of the prompt step waiting for answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_prompt: Option<String>,
    /// Resolved prompt message, for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_fields: Option<Vec<PromptField>>,
}

impl RunResult {
    pub fn ok(run_id: impl Into<String>, output: Value) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Ok,
            output: Some(output),
            failure: None,
            pending_prompt: None,
            prompt_message: None,
            prompt_fields: None,
        }
    }

    pub fn failed(run_id: impl Into<String>, failure: FailureRecord) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Failed,
            output: None,
            failure: Some(failure),
            pending_prompt: None,
            prompt_message: None,
            prompt_fields: None,
        }
    }

    pub fn needs_input(
        run_id: impl Into<String>,
        step_id: impl Into<String>,
        message: String,
        fields: Vec<PromptField>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::NeedsInput,
            output: None,
            failure: None,
            pending_prompt: Some(step_id.into()),
            prompt_message: Some(message),
            prompt_fields: Some(fields),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == RunStatus::Ok
    }

    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }

    pub fn needs_input_pending(&self) -> bool {
        self.status == RunStatus::NeedsInput
    }
}

/// Answers supplied to a suspended prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptAnswers {
    #[serde(default)]
    pub values: Map<String, Value>,
}

impl PromptAnswers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// Identity of the routine a run executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineRef {
    pub name: String,
    pub version: String,
    /// SHA-256 of the routine's canonical JSON.
    pub digest: String,
    /// Package directory when the routine was loaded from disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Persisted snapshot of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub routine: RoutineRef,
    pub context: Context,
    /// Index of the next step to execute.
    pub pc: usize,
    pub status: RunStatus,
    /// Step id awaiting answers; present iff `status` is `NeedsInput`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    /// A fresh run at `pc = 0`.
    pub fn start(run_id: impl Into<String>, routine: RoutineRef, context: Context) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            routine,
            context,
            pc: 0,
            status: RunStatus::Running,
            pending_prompt: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Generate a new time-sortable run id.
    pub fn new_run_id() -> String {
        uuid::Uuid::now_v7().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_status_wire_names() {
        assert_eq!(serde_json::to_value(RunStatus::NeedsInput).unwrap(), json!("needs_input"));
        assert_eq!(RunStatus::Ok.to_string(), "ok");
        assert_eq!(
            serde_json::to_value(FailureKind::RecoveryExhausted).unwrap(),
            json!("recovery_exhausted")
        );
        assert_eq!(FailureKind::Credential.to_string(), "credential");
    }

    #[test]
    fn test_ok_result_omits_empty_fields() {
        let result = RunResult::ok("r1", json!({"rows": 2}));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value, json!({"run_id": "r1", "status": "ok", "output": {"rows": 2}}));
    }

    #[test]
    fn test_run_state_roundtrip() {
        let mut ctx = Context::new();
        ctx.set("url", json!("fixture://demo.csv"));
        let mut state = RunState::start(
            RunState::new_run_id(),
            RoutineRef {
                name: "demo".into(),
                version: "1".into(),
                digest: "abc".into(),
                location: None,
            },
            ctx,
        );
        state.pc = 2;
        state.status = RunStatus::NeedsInput;
        state.pending_prompt = Some("s3".into());

        let json = serde_json::to_string(&state).unwrap();
        let back: RunState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_new_run_ids_are_unique() {
        assert_ne!(RunState::new_run_id(), RunState::new_run_id());
    }

    #[test]
    fn test_prompt_answers_default_values() {
        let answers: PromptAnswers = serde_json::from_value(json!({})).unwrap();
        assert!(answers.values.is_empty());
        let answers = PromptAnswers::new().with("confirm", json!(false));
        assert_eq!(answers.values["confirm"], json!(false));
    }
}
