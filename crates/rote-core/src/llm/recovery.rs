//! LLM-backed recovery hook.

use serde_json::json;

use rote_types::llm::CompletionRequest;
use rote_types::routine::StepKind;

use super::client::LlmClient;
use super::parsing::parse_recovery_action;
use super::prompts::RECOVERY_SYSTEM;
use crate::runtime::recovery::{RecoveryAction, RecoveryError, RecoveryHook, RecoveryRequest};

/// Asks an LLM to pick `modify_args`, `skip` or `fail` for a failed step.
#[derive(Debug)]
pub struct LlmRecoveryHook<C: LlmClient> {
    client: C,
}

impl<C: LlmClient> LlmRecoveryHook<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

/// The user prompt: the failed step, the error and the shape of the run.
pub fn recovery_prompt(request: &RecoveryRequest) -> String {
    let step = &request.step;
    let (tool, function) = match &step.kind {
        StepKind::ToolCall { tool, .. } => (Some(tool.as_str()), None),
        StepKind::UdfCall { function, .. } => (None, Some(function.as_str())),
        _ => (None, None),
    };
    let payload = json!({
        "failed_step": {
            "id": step.id,
            "type": step.type_name(),
            "tool": tool,
            "function": function,
            "args": step.kind.args(),
        },
        "error": {
            "kind": request.error_kind,
            "message": request.error_message,
        },
        "context_keys": request.context_keys,
        "routine_steps": request.routine_steps,
    });
    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
}

impl<C: LlmClient> RecoveryHook for LlmRecoveryHook<C> {
    async fn recover(&self, request: &RecoveryRequest) -> Result<RecoveryAction, RecoveryError> {
        let completion = CompletionRequest::new(recovery_prompt(request))
            .with_system(RECOVERY_SYSTEM)
            .with_max_tokens(1024);
        let response = self
            .client
            .complete(&completion)
            .await
            .map_err(|e| RecoveryError(e.to_string()))?;
        let action = parse_recovery_action(&response.text).map_err(RecoveryError)?;
        let strategy = match &action {
            RecoveryAction::ModifyArgs(_) => "modify_args",
            RecoveryAction::Skip(_) => "skip",
            RecoveryAction::Fail => "fail",
        };
        tracing::info!(step_id = %request.step.id, strategy, "recovery strategy chosen");
        Ok(action)
    }
}
