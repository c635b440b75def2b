//! Run lifecycle handlers: start, resume, cancel, list.

use std::path::PathBuf;

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Map, Value};

use rote_types::run::{PromptAnswers, RunResult, RunStatus};

use crate::cli::runs::run_summary;
use crate::http::error::AppError;
use crate::http::response::{ApiResponse, begin};
use crate::state::{AppState, ExecOptions};

#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    pub package_dir: PathBuf,
    /// Falls back to the package's recorded input.
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub replay: bool,
    #[serde(default)]
    pub auto_fix: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResumeRequest {
    #[serde(default)]
    pub values: Map<String, Value>,
    #[serde(default)]
    pub replay: bool,
    #[serde(default)]
    pub auto_fix: bool,
}

fn respond(result: RunResult, request_id: String, started: std::time::Instant) -> Json<ApiResponse<RunResult>> {
    let run_id = result.run_id.clone();
    let waiting = result.status == RunStatus::NeedsInput;
    let mut resp = ApiResponse::success(result, request_id, started);
    if waiting {
        resp = resp
            .with_link("resume", format!("/api/v1/runs/{run_id}/resume"))
            .with_link("cancel", format!("/api/v1/runs/{run_id}/cancel"));
    }
    resp.into_json()
}

/// POST /api/v1/runs - Start a run.
pub async fn start_run(
    State(state): State<AppState>,
    Json(body): Json<StartRunRequest>,
) -> Result<Json<ApiResponse<RunResult>>, AppError> {
    let (request_id, started) = begin();
    let options = ExecOptions {
        replay: body.replay,
        auto_fix: body.auto_fix,
    };
    let prepared = state.prepare(&body.package_dir, options).await?;
    let input = body
        .input
        .or_else(|| prepared.package.input.clone())
        .unwrap_or(Value::Null);

    let result = prepared.engine.run(&prepared.handle, input).await?;
    Ok(respond(result, request_id, started))
}

/// POST /api/v1/runs/{id}/resume - Answer a pending prompt.
pub async fn resume_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Json(body): Json<ResumeRequest>,
) -> Result<Json<ApiResponse<RunResult>>, AppError> {
    let (request_id, started) = begin();
    let options = ExecOptions {
        replay: body.replay,
        auto_fix: body.auto_fix,
    };
    let prepared = state.prepare_for_run(&run_id, options).await?;
    let answers = PromptAnswers { values: body.values };

    let result = prepared.engine.resume(&run_id, &answers).await?;
    Ok(respond(result, request_id, started))
}

/// POST /api/v1/runs/{id}/cancel - Cancel a suspended run.
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<ApiResponse<RunResult>>, AppError> {
    let (request_id, started) = begin();
    let result = state.bare_engine().cancel(&run_id).await?;
    Ok(respond(result, request_id, started))
}

/// GET /api/v1/runs - Suspended runs, oldest first.
pub async fn list_runs(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Value>>>, AppError> {
    let (request_id, started) = begin();
    let runs = state.bare_engine().pending().await?;
    let rows: Vec<Value> = runs.iter().map(run_summary).collect();
    Ok(ApiResponse::success(rows, request_id, started)
        .with_link("self", "/api/v1/runs")
        .into_json())
}
