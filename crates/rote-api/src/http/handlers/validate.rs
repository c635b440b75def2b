//! Package validation handler.

use std::path::PathBuf;

use axum::Json;
use axum::extract::State;
use serde::Deserialize;

use rote_infra::package::validate_package_dir;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, begin};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub package_dir: PathBuf,
}

/// POST /api/v1/validate - Static checks on a package directory.
///
/// Problems are data, not errors: the response is 200 with `valid: false`.
pub async fn validate_package(
    State(_state): State<AppState>,
    Json(body): Json<ValidateRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let (request_id, started) = begin();
    let errors = validate_package_dir(&body.package_dir).await;
    let data = serde_json::json!({
        "valid": errors.is_empty(),
        "errors": errors,
    });
    Ok(ApiResponse::success(data, request_id, started).into_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::state_with_package;

    #[tokio::test]
    async fn test_validate_reports_problems_as_data() {
        let (state, _data, pkg) = state_with_package().await;

        let body = ValidateRequest {
            package_dir: pkg.path().to_path_buf(),
        };
        let Json(resp) = validate_package(State(state.clone()), Json(body)).await.unwrap();
        assert_eq!(resp.data.unwrap()["valid"], true);

        tokio::fs::write(pkg.path().join("routine.yaml"), "steps: [")
            .await
            .unwrap();
        let body = ValidateRequest {
            package_dir: pkg.path().to_path_buf(),
        };
        let Json(resp) = validate_package(State(state), Json(body)).await.unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data["valid"], false);
        assert!(!data["errors"].as_array().unwrap().is_empty());
    }
}
