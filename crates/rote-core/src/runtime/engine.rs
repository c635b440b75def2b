//! Routine engine: a sequential state machine over a routine's steps.
//!
//! Each run owns its `RunState`. The engine advances `pc` one step at a time;
//! a `prompt.user` step persists the state through the `StateStore` and
//! returns `needs_input`, and `resume` picks the run up again, possibly in
//! another process.
//!
//! # Failure path
//!
//! 1. Resolution errors (`undefined_variable`, `expression`) and credential
//!    errors fail the run immediately.
//! 2. Otherwise, without a recovery hook, the run fails.
//! 3. With a hook: `fail` fails, `skip` substitutes a result, and
//!    `modify_args` retries the step exactly once. A failed retry ends the
//!    run with `recovery_exhausted`; the hook is never consulted twice for
//!    the same step instance.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::Instrument;

use rote_types::config::RuntimeConfig;
use rote_types::context::Context;
use rote_types::error::StoreError;
use rote_types::routine::{PromptField, Step, StepKind};
use rote_types::run::{
    FailureKind, FailureRecord, PromptAnswers, RunResult, RunState, RunStatus,
};

use super::answers::validate_answers;
use super::recovery::{BoxRecoveryHook, RecoveryAction, RecoveryRequest};
use super::source::{RoutineHandle, RoutineSource, SourceError};
use super::store::StateStore;
use super::tools::{ToolError, ToolRegistry};
use super::udf::UdfError;
use crate::expr::{
    ExpressionError, display_string, evaluate_condition, resolve_args, resolve_template,
    resolve_value,
};

// ---------------------------------------------------------------------------
// Configuration and errors
// ---------------------------------------------------------------------------

/// Default per-step timeout (5 minutes).
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 300;

/// Default recovery-hook timeout.
pub const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub step_timeout: Duration,
    pub hook_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS),
            hook_timeout: Duration::from_secs(DEFAULT_HOOK_TIMEOUT_SECS),
        }
    }
}

impl From<&RuntimeConfig> for EngineConfig {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            step_timeout: Duration::from_secs(config.step_timeout_secs),
            hook_timeout: Duration::from_secs(config.hook_timeout_secs),
        }
    }
}

/// Errors that prevent the engine from producing a `RunResult`.
///
/// Failures inside a routine are not errors: they come back as a `failed`
/// result.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("invalid answers: {}", .0.join("; "))]
    InvalidAnswers(Vec<String>),

    #[error("routine '{name}' changed since run {run_id} was suspended")]
    RoutineChanged { run_id: String, name: String },

    #[error("run {run_id} is in an inconsistent state: {reason}")]
    InvalidState { run_id: String, reason: String },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("state store error: {0}")]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Step outcomes
// ---------------------------------------------------------------------------

enum Outcome {
    /// Step finished; the value (if any) goes to `save_as`.
    Continue(Option<Value>),
    Suspend {
        message: String,
        fields: Vec<PromptField>,
    },
    Return(Value),
}

#[derive(Debug, Clone)]
struct StepFailure {
    kind: FailureKind,
    message: String,
}

impl StepFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Resolution errors and credential errors never go to a hook.
    fn recoverable(&self) -> bool {
        !matches!(
            self.kind,
            FailureKind::Credential | FailureKind::UndefinedVariable | FailureKind::Expression
        )
    }

    fn into_record(self, step_id: &str) -> FailureRecord {
        FailureRecord {
            step_id: step_id.to_string(),
            kind: self.kind,
            message: self.message,
        }
    }
}

impl From<ExpressionError> for StepFailure {
    fn from(e: ExpressionError) -> Self {
        let kind = if e.is_undefined_variable() {
            FailureKind::UndefinedVariable
        } else {
            FailureKind::Expression
        };
        StepFailure::new(kind, e.to_string())
    }
}

impl From<ToolError> for StepFailure {
    fn from(e: ToolError) -> Self {
        let kind = match &e {
            ToolError::Credential(_) => FailureKind::Credential,
            ToolError::Timeout(_) => FailureKind::Timeout,
            _ => FailureKind::ToolInvocation,
        };
        StepFailure::new(kind, e.to_string())
    }
}

impl From<UdfError> for StepFailure {
    fn from(e: UdfError) -> Self {
        StepFailure::new(FailureKind::UdfExecution, e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Executes routines and manages suspended runs.
///
/// Generic over `S: StateStore` and `L: RoutineSource` for storage
/// flexibility.
pub struct Engine<S: StateStore, L: RoutineSource> {
    store: S,
    source: L,
    tools: ToolRegistry,
    hook: Option<BoxRecoveryHook>,
    config: EngineConfig,
}

impl<S: StateStore, L: RoutineSource> Engine<S, L> {
    pub fn new(store: S, source: L, tools: ToolRegistry) -> Self {
        Self {
            store,
            source,
            tools,
            hook: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_recovery_hook(mut self, hook: BoxRecoveryHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn source(&self) -> &L {
        &self.source
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Start a new run of `handle` with `input` as the initial context.
    pub async fn run(&self, handle: &RoutineHandle, input: Value) -> Result<RunResult, EngineError> {
        let input = match input {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(EngineError::InvalidInput(format!(
                    "run input must be a JSON object, got {}",
                    crate::expr::functions::type_name(&other)
                )));
            }
        };

        let state = RunState::start(
            RunState::new_run_id(),
            handle.reference.clone(),
            Context::from_input(input),
        );
        let span = tracing::info_span!(
            "routine.run",
            run_id = %state.run_id,
            routine = %handle.routine.name,
        );
        async {
            tracing::info!(steps = handle.routine.steps.len(), "run started");
            self.drive(handle, state).await
        }
        .instrument(span)
        .await
    }

    /// Continue a suspended run with the user's answers.
    ///
    /// Invalid answers are rejected before anything is changed; the stored
    /// state stays resumable. On success the stored entry is consumed.
    pub async fn resume(
        &self,
        run_id: &str,
        answers: &PromptAnswers,
    ) -> Result<RunResult, EngineError> {
        let mut state = self
            .store
            .load(run_id)
            .await?
            .ok_or_else(|| EngineError::RunNotFound(run_id.to_string()))?;

        let handle = self.source.open(&state.routine).await?;
        if handle.reference.digest != state.routine.digest {
            return Err(EngineError::RoutineChanged {
                run_id: run_id.to_string(),
                name: state.routine.name.clone(),
            });
        }

        let step = pending_step(&handle, &state)?;
        let StepKind::PromptUser { fields, .. } = &step.kind else {
            return Err(EngineError::InvalidState {
                run_id: run_id.to_string(),
                reason: format!("step '{}' is not a prompt", step.id),
            });
        };
        let values = validate_answers(fields, answers).map_err(EngineError::InvalidAnswers)?;

        // Consume the entry; a concurrent resume that got here first wins.
        if !self.store.delete(run_id).await? {
            return Err(EngineError::RunNotFound(run_id.to_string()));
        }

        if let Some(save_as) = &step.save_as {
            state.context.set(save_as.clone(), Value::Object(values));
        }
        state.pc += 1;
        state.status = RunStatus::Running;
        state.pending_prompt = None;
        state.updated_at = Utc::now();

        let span = tracing::info_span!(
            "routine.run",
            run_id = %state.run_id,
            routine = %handle.routine.name,
        );
        async {
            tracing::info!(pc = state.pc, "run resumed");
            self.drive(&handle, state).await
        }
        .instrument(span)
        .await
    }

    /// Cancel a suspended run and release its stored state.
    pub async fn cancel(&self, run_id: &str) -> Result<RunResult, EngineError> {
        let state = self
            .store
            .load(run_id)
            .await?
            .ok_or_else(|| EngineError::RunNotFound(run_id.to_string()))?;
        self.store.delete(run_id).await?;
        tracing::info!(run_id, "run cancelled");
        Ok(RunResult::failed(
            run_id,
            FailureRecord {
                step_id: state.pending_prompt.unwrap_or_default(),
                kind: FailureKind::Cancelled,
                message: "run cancelled".to_string(),
            },
        ))
    }

    /// Runs waiting for input.
    pub async fn pending(&self) -> Result<Vec<RunState>, EngineError> {
        Ok(self.store.list_pending().await?)
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    async fn drive(&self, handle: &RoutineHandle, mut state: RunState) -> Result<RunResult, EngineError> {
        let steps = &handle.routine.steps;

        while let Some(step) = steps.get(state.pc) {
            if let Some(when) = &step.when {
                match evaluate_condition(when, &state.context) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(step_id = %step.id, "condition false, skipping step");
                        state.pc += 1;
                        continue;
                    }
                    Err(e) => return Ok(self.failed(&state, step, StepFailure::from(e))),
                }
            }

            tracing::debug!(step_id = %step.id, step_type = step.type_name(), "executing step");
            let outcome = match self.execute_step(handle, step, &state.context, None).await {
                Ok(outcome) => outcome,
                Err(failure) => match self.recover(handle, step, failure, &state.context).await {
                    Ok(value) => Outcome::Continue(Some(value)),
                    Err(record) => {
                        tracing::warn!(
                            step_id = %record.step_id,
                            kind = %record.kind,
                            error = %record.message,
                            "run failed"
                        );
                        return Ok(RunResult::failed(&state.run_id, record));
                    }
                },
            };

            match outcome {
                Outcome::Continue(value) => {
                    if let (Some(name), Some(value)) = (&step.save_as, value) {
                        state.context.set(name.clone(), value);
                    }
                    state.pc += 1;
                }
                Outcome::Suspend { message, fields } => {
                    state.status = RunStatus::NeedsInput;
                    state.pending_prompt = Some(step.id.clone());
                    state.updated_at = Utc::now();
                    self.store.save(&state).await?;
                    tracing::info!(step_id = %step.id, "run suspended for input");
                    return Ok(RunResult::needs_input(
                        &state.run_id,
                        &step.id,
                        message,
                        fields,
                    ));
                }
                Outcome::Return(value) => {
                    tracing::info!(step_id = %step.id, "run completed");
                    return Ok(RunResult::ok(&state.run_id, value));
                }
            }
        }

        tracing::info!("run completed without a return step");
        Ok(RunResult::ok(&state.run_id, state.context.to_value()))
    }

    fn failed(&self, state: &RunState, step: &Step, failure: StepFailure) -> RunResult {
        tracing::warn!(step_id = %step.id, kind = %failure.kind, error = %failure.message, "run failed");
        RunResult::failed(&state.run_id, failure.into_record(&step.id))
    }

    /// Execute one step. `override_args` replaces the step's own arguments
    /// for an auto-fix retry.
    async fn execute_step(
        &self,
        handle: &RoutineHandle,
        step: &Step,
        ctx: &Context,
        override_args: Option<&Map<String, Value>>,
    ) -> Result<Outcome, StepFailure> {
        match &step.kind {
            StepKind::ToolCall { tool, args } => {
                let args = resolve_args(override_args.unwrap_or(args), ctx)?;
                let value = self.call_tool(tool, args).await?;
                Ok(Outcome::Continue(Some(value)))
            }
            StepKind::UdfCall { function, args } => {
                let args = resolve_args(override_args.unwrap_or(args), ctx)?;
                let value = self.call_udf(handle, function, args).await?;
                Ok(Outcome::Continue(Some(value)))
            }
            StepKind::Assert { check, message } => {
                if evaluate_condition(check, ctx)? {
                    return Ok(Outcome::Continue(None));
                }
                let message = match message {
                    Some(m) => resolve_template(m, ctx)
                        .map(|v| display_string(&v))
                        .unwrap_or_else(|_| m.clone()),
                    None => format!("assertion failed: {check}"),
                };
                Err(StepFailure::new(FailureKind::Assertion, message))
            }
            StepKind::PromptUser { message, fields } => {
                let message = display_string(&resolve_template(message, ctx)?);
                Ok(Outcome::Suspend {
                    message,
                    fields: fields.clone(),
                })
            }
            StepKind::Return { value } => Ok(Outcome::Return(resolve_value(value, ctx)?)),
        }
    }

    async fn call_tool(&self, tool: &str, args: Map<String, Value>) -> Result<Value, StepFailure> {
        let timeout = self.config.step_timeout;
        match tokio::time::timeout(timeout, self.tools.call(tool, args)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ToolError::Timeout(timeout.as_secs()).into()),
        }
    }

    async fn call_udf(
        &self,
        handle: &RoutineHandle,
        function: &str,
        args: Map<String, Value>,
    ) -> Result<Value, StepFailure> {
        let udfs = Arc::clone(&handle.udfs);
        let name = function.to_string();
        let task = tokio::task::spawn_blocking(move || udfs.call(&name, &args));

        let timeout = self.config.step_timeout;
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(join_error)) => Err(StepFailure::new(
                FailureKind::UdfExecution,
                format!("UDF '{function}' panicked: {join_error}"),
            )),
            Err(_) => Err(StepFailure::new(
                FailureKind::Timeout,
                format!("UDF '{function}' timed out after {}s", timeout.as_secs()),
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    /// Ask the hook how to handle `failure`. Returns the step's substitute
    /// result, or the record the run fails with.
    async fn recover(
        &self,
        handle: &RoutineHandle,
        step: &Step,
        failure: StepFailure,
        ctx: &Context,
    ) -> Result<Value, FailureRecord> {
        let Some(hook) = &self.hook else {
            return Err(failure.into_record(&step.id));
        };
        if !failure.recoverable() {
            tracing::debug!(step_id = %step.id, kind = %failure.kind, "failure bypasses recovery hook");
            return Err(failure.into_record(&step.id));
        }

        let request = RecoveryRequest::new(step, failure.kind, &failure.message, ctx, &handle.routine);
        let action = match tokio::time::timeout(self.config.hook_timeout, hook.recover(&request)).await {
            Ok(Ok(action)) => action,
            Ok(Err(e)) => {
                tracing::warn!(step_id = %step.id, error = %e, "recovery hook failed");
                return Err(failure.into_record(&step.id));
            }
            Err(_) => {
                tracing::warn!(step_id = %step.id, "recovery hook timed out");
                return Err(failure.into_record(&step.id));
            }
        };

        match action {
            RecoveryAction::Fail => Err(failure.into_record(&step.id)),
            RecoveryAction::Skip(value) => {
                tracing::info!(step_id = %step.id, "recovery hook skipped step");
                Ok(value)
            }
            RecoveryAction::ModifyArgs(new_args) => {
                if step.kind.args().is_none() {
                    tracing::warn!(step_id = %step.id, "modify_args on a step without args");
                    return Err(failure.into_record(&step.id));
                }
                tracing::info!(step_id = %step.id, "retrying step with modified args");
                match self.execute_step(handle, step, ctx, Some(&new_args)).await {
                    Ok(Outcome::Continue(value)) => Ok(value.unwrap_or(Value::Null)),
                    Ok(_) => Err(failure.into_record(&step.id)),
                    Err(retry) if retry.kind == FailureKind::Credential => {
                        Err(retry.into_record(&step.id))
                    }
                    Err(retry) => Err(FailureRecord {
                        step_id: step.id.clone(),
                        kind: FailureKind::RecoveryExhausted,
                        message: format!(
                            "retry with modified args failed: {} (original error: {})",
                            retry.message, failure.message
                        ),
                    }),
                }
            }
        }
    }
}

fn pending_step<'a>(handle: &'a RoutineHandle, state: &RunState) -> Result<&'a Step, EngineError> {
    let invalid = |reason: String| EngineError::InvalidState {
        run_id: state.run_id.clone(),
        reason,
    };
    let pending = state
        .pending_prompt
        .as_deref()
        .ok_or_else(|| invalid("no pending prompt".to_string()))?;
    match handle.routine.steps.get(state.pc) {
        Some(step) if step.id == pending => Ok(step),
        _ => Err(invalid(format!("pending step '{pending}' is not at pc {}", state.pc))),
    }
}
