//! Trace compilation handler.

use std::path::PathBuf;

use axum::Json;
use axum::extract::State;
use serde::Deserialize;

use rote_infra::package::write_package;
use rote_types::trace::Trace;

use crate::cli::compile::build_package;
use crate::http::error::AppError;
use crate::http::response::{ApiResponse, begin};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CompileRequest {
    pub trace: Trace,
    /// Directory the package is written to.
    pub output_dir: PathBuf,
    #[serde(default)]
    pub llm: bool,
}

/// POST /api/v1/compile - Compile a trace and write the package.
pub async fn compile_trace(
    State(state): State<AppState>,
    Json(body): Json<CompileRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let (request_id, started) = begin();
    if body.output_dir.as_os_str().is_empty() {
        return Err(AppError::Validation("output_dir must not be empty".to_string()));
    }

    let package = build_package(&state, &body.trace, body.llm, false).await?;
    write_package(&body.output_dir, &package).await?;

    tracing::info!(
        routine = %package.routine.name,
        output_dir = %body.output_dir.display(),
        "compiled trace over HTTP"
    );

    let data = serde_json::json!({
        "output_dir": body.output_dir.display().to_string(),
        "routine": package.routine,
        "udf_manifest": package.udf_manifest,
        "fixtures": package.fixtures.len(),
    });
    Ok(ApiResponse::success(data, request_id, started)
        .with_link("validate", "/api/v1/validate")
        .with_link("run", "/api/v1/runs")
        .into_json())
}
