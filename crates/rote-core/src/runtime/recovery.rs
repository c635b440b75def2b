//! Recovery hook port.
//!
//! When a step fails, the engine may ask a hook what to do. The hook sees the
//! failed step, the error and the names (not values) of context variables.
//! Credential failures never reach a hook.

use std::future::Future;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use rote_types::context::Context;
use rote_types::routine::{Routine, Step};
use rote_types::run::FailureKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutline {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
}

/// Everything a hook is told about a failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryRequest {
    pub step: Step,
    pub error_kind: FailureKind,
    pub error_message: String,
    pub context_keys: Vec<String>,
    pub routine_steps: Vec<StepOutline>,
}

impl RecoveryRequest {
    pub fn new(
        step: &Step,
        error_kind: FailureKind,
        error_message: impl Into<String>,
        context: &Context,
        routine: &Routine,
    ) -> Self {
        Self {
            step: step.clone(),
            error_kind,
            error_message: error_message.into(),
            context_keys: context.keys(),
            routine_steps: routine
                .steps
                .iter()
                .map(|s| StepOutline {
                    id: s.id.clone(),
                    step_type: s.type_name().to_string(),
                })
                .collect(),
        }
    }
}

/// What the engine should do with a failed step.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// Retry the step once with these arguments.
    ModifyArgs(Map<String, Value>),
    /// Treat the step as succeeded with this result.
    Skip(Value),
    Fail,
}

#[derive(Debug, Error)]
#[error("recovery hook failed: {0}")]
pub struct RecoveryError(pub String);

/// Decides how to handle a failed step.
pub trait RecoveryHook: Send + Sync {
    fn recover(
        &self,
        request: &RecoveryRequest,
    ) -> impl Future<Output = Result<RecoveryAction, RecoveryError>> + Send;
}

/// Object-safe form of [`RecoveryHook`]; blanket-implemented for every hook.
pub trait RecoveryHookDyn: Send + Sync {
    fn recover_boxed<'a>(
        &'a self,
        request: &'a RecoveryRequest,
    ) -> BoxFuture<'a, Result<RecoveryAction, RecoveryError>>;
}

impl<T: RecoveryHook> RecoveryHookDyn for T {
    fn recover_boxed<'a>(
        &'a self,
        request: &'a RecoveryRequest,
    ) -> BoxFuture<'a, Result<RecoveryAction, RecoveryError>> {
        Box::pin(self.recover(request))
    }
}

/// Type-erased recovery hook, so the engine can take any implementation.
pub struct BoxRecoveryHook {
    inner: Box<dyn RecoveryHookDyn + Send + Sync>,
}

impl BoxRecoveryHook {
    pub fn new<T: RecoveryHook + 'static>(hook: T) -> Self {
        Self {
            inner: Box::new(hook),
        }
    }

    pub async fn recover(&self, request: &RecoveryRequest) -> Result<RecoveryAction, RecoveryError> {
        self.inner.recover_boxed(request).await
    }
}

impl std::fmt::Debug for BoxRecoveryHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BoxRecoveryHook")
    }
}

/// Always answers with the same action. Useful in tests and as a policy.
#[derive(Debug, Clone)]
pub struct FixedRecoveryHook {
    action: RecoveryAction,
}

impl FixedRecoveryHook {
    pub fn new(action: RecoveryAction) -> Self {
        Self { action }
    }
}

impl RecoveryHook for FixedRecoveryHook {
    async fn recover(&self, _request: &RecoveryRequest) -> Result<RecoveryAction, RecoveryError> {
        Ok(self.action.clone())
    }
}
