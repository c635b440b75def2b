//! `rote run`, `rote resume` and `rote cancel`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::Instrument;

use rote_types::run::{PromptAnswers, RunResult, RunStatus};

use crate::cli::input::{answers_from_json, exit_code, print_result, read_json_arg};
use crate::cli::prompt;
use crate::state::{AppState, ExecOptions, Prepared};

/// Options for `rote run`.
pub struct RunArgs {
    pub package: PathBuf,
    pub input: Option<String>,
    pub exec: ExecOptions,
    pub non_interactive: bool,
    pub out: Option<PathBuf>,
}

pub async fn run_routine(state: &AppState, args: RunArgs, json: bool) -> Result<u8> {
    let prepared = state.prepare(&args.package, args.exec).await?;

    let input = match &args.input {
        Some(arg) => read_json_arg(arg).await?,
        None => prepared.package.input.clone().unwrap_or(Value::Null),
    };

    let span = tracing::info_span!(
        "rote.execute",
        routine = %prepared.handle.routine.name,
        replay = args.exec.replay,
    );
    let mut result = prepared
        .engine
        .run(&prepared.handle, input)
        .instrument(span)
        .await?;

    let interactive = !args.non_interactive && !json && console::user_attended();
    if interactive {
        result = answer_until_done(&prepared, result).await?;
    }

    if args.exec.replay && result.status == RunStatus::Ok {
        check_expected(&prepared, &result);
    }

    finish(&result, args.out.as_deref(), json).await
}

/// Options for `rote resume`.
pub struct ResumeArgs {
    pub run_id: String,
    pub answers: Option<String>,
    pub exec: ExecOptions,
}

pub async fn resume_run(state: &AppState, args: ResumeArgs, json: bool) -> Result<u8> {
    let prepared = state.prepare_for_run(&args.run_id, args.exec).await?;

    let answers = match &args.answers {
        Some(arg) => answers_from_json(read_json_arg(arg).await?)?,
        None => {
            let pending = pending_result(state, &args.run_id).await?;
            prompt::ask(&pending)?
        }
    };

    let mut result = prepared.engine.resume(&args.run_id, &answers).await?;
    if !json && console::user_attended() {
        result = answer_until_done(&prepared, result).await?;
    }
    finish(&result, None, json).await
}

pub async fn cancel_run(state: &AppState, run_id: &str, json: bool) -> Result<u8> {
    let result = state.bare_engine().cancel(run_id).await?;
    print_result(&result, json)?;
    Ok(0)
}

/// Keep prompting while the run is suspended.
async fn answer_until_done(prepared: &Prepared, mut result: RunResult) -> Result<RunResult> {
    while result.status == RunStatus::NeedsInput {
        let answers: PromptAnswers = prompt::ask(&result)?;
        result = prepared.engine.resume(&result.run_id, &answers).await?;
    }
    Ok(result)
}

/// Rebuild the prompt details of a stored run from its routine.
async fn pending_result(state: &AppState, run_id: &str) -> Result<RunResult> {
    let prepared = state.prepare_for_run(run_id, ExecOptions::default()).await?;
    let pending = prepared
        .engine
        .pending()
        .await?
        .into_iter()
        .find(|s| s.run_id == run_id)
        .with_context(|| format!("run {run_id} is not waiting for input"))?;

    let step_id = pending.pending_prompt.clone().unwrap_or_default();
    let step = prepared
        .handle
        .routine
        .steps
        .iter()
        .find(|s| s.id == step_id)
        .with_context(|| format!("run {run_id} points at unknown step {step_id}"))?;

    let (message, fields) = match &step.kind {
        rote_types::routine::StepKind::PromptUser { message, fields } => (message.clone(), fields.clone()),
        _ => anyhow::bail!("step {step_id} is not a prompt"),
    };
    Ok(RunResult::needs_input(run_id, step_id, message, fields))
}

fn check_expected(prepared: &Prepared, result: &RunResult) {
    let Some(expected) = &prepared.package.expected_output else {
        return;
    };
    if result.output.as_ref() == Some(expected) {
        tracing::info!(run_id = %result.run_id, "replay output matches the recorded output");
    } else {
        tracing::warn!(run_id = %result.run_id, "replay output differs from the recorded output");
    }
}

async fn finish(result: &RunResult, out: Option<&Path>, json: bool) -> Result<u8> {
    print_result(result, json)?;
    if let Some(path) = out {
        let body = serde_json::to_string_pretty(result)?;
        tokio::fs::write(path, body)
            .await
            .with_context(|| format!("cannot write {}", path.display()))?;
    }
    Ok(exit_code(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::state_with_package;

    fn replay_args(package: &Path, out: Option<PathBuf>) -> RunArgs {
        RunArgs {
            package: package.to_path_buf(),
            input: None,
            exec: ExecOptions {
                replay: true,
                auto_fix: false,
            },
            non_interactive: true,
            out,
        }
    }

    #[tokio::test]
    async fn test_run_resume_round_trip() {
        let (state, data, pkg) = state_with_package().await;
        let out = data.path().join("result.json");

        let code = run_routine(&state, replay_args(pkg.path(), Some(out.clone())), true)
            .await
            .unwrap();
        assert_eq!(code, 0);
        let paused: RunResult =
            serde_json::from_str(&tokio::fs::read_to_string(&out).await.unwrap()).unwrap();
        assert_eq!(paused.status, RunStatus::NeedsInput);

        let pending = pending_result(&state, &paused.run_id).await.unwrap();
        assert_eq!(pending.pending_prompt, paused.pending_prompt);
        assert_eq!(pending.prompt_fields.unwrap()[0].name, "confirm");

        let code = resume_run(
            &state,
            ResumeArgs {
                run_id: paused.run_id.clone(),
                answers: Some(r#"{"confirm": true}"#.to_string()),
                exec: ExecOptions {
                    replay: true,
                    auto_fix: false,
                },
            },
            true,
        )
        .await
        .unwrap();
        assert_eq!(code, 0);
        assert!(state.bare_engine().pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_releases_run() {
        let (state, _data, pkg) = state_with_package().await;
        let prepared = state
            .prepare(
                pkg.path(),
                ExecOptions {
                    replay: true,
                    auto_fix: false,
                },
            )
            .await
            .unwrap();
        let input = prepared.package.input.clone().unwrap();
        let paused = prepared.engine.run(&prepared.handle, input).await.unwrap();

        assert_eq!(cancel_run(&state, &paused.run_id, true).await.unwrap(), 0);
        assert!(cancel_run(&state, &paused.run_id, true).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_fixture_fails_run() {
        let (state, _data, pkg) = state_with_package().await;
        let prepared = state.prepare(pkg.path(), ExecOptions::default()).await.unwrap();
        let paused = prepared
            .engine
            .run(&prepared.handle, serde_json::json!({"url": "fixture://missing.csv"}))
            .await
            .unwrap();
        // fetch_csv fails before the prompt is reached.
        assert_eq!(paused.status, RunStatus::Failed);
        assert_eq!(exit_code(&paused), 1);
    }
}
