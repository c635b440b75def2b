//! Application error type mapping to HTTP status codes and the envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use rote_core::compiler::CompileError;
use rote_core::runtime::EngineError;
use rote_core::runtime::source::SourceError;
use rote_infra::package::PackageError;

#[derive(Debug)]
pub enum AppError {
    Engine(EngineError),
    Package(PackageError),
    Compile(CompileError),
    /// Malformed request body.
    Validation(String),
    Internal(String),
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        AppError::Engine(e)
    }
}

impl From<PackageError> for AppError {
    fn from(e: PackageError) -> Self {
        AppError::Package(e)
    }
}

impl From<CompileError> for AppError {
    fn from(e: CompileError) -> Self {
        AppError::Compile(e)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        let e = match e.downcast::<EngineError>() {
            Ok(e) => return AppError::Engine(e),
            Err(e) => e,
        };
        let e = match e.downcast::<PackageError>() {
            Ok(e) => return AppError::Package(e),
            Err(e) => e,
        };
        match e.downcast::<CompileError>() {
            Ok(e) => AppError::Compile(e),
            Err(e) => AppError::Internal(format!("{e:#}")),
        }
    }
}

impl AppError {
    /// Status, error code, message and optional details.
    pub fn parts(&self) -> (StatusCode, &'static str, String, Option<Value>) {
        match self {
            AppError::Engine(e) => engine_parts(e),
            AppError::Package(PackageError::NotFound(path)) => (
                StatusCode::NOT_FOUND,
                "PACKAGE_NOT_FOUND",
                format!("no routine package at {}", path.display()),
                None,
            ),
            AppError::Package(e) => (StatusCode::UNPROCESSABLE_ENTITY, "PACKAGE_INVALID", e.to_string(), None),
            AppError::Compile(e) => (StatusCode::UNPROCESSABLE_ENTITY, "COMPILE_ERROR", e.to_string(), None),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone(), None),
        }
    }
}

fn engine_parts(e: &EngineError) -> (StatusCode, &'static str, String, Option<Value>) {
    let message = e.to_string();
    match e {
        EngineError::RunNotFound(_) => (StatusCode::NOT_FOUND, "RUN_NOT_FOUND", message, None),
        EngineError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", message, None),
        EngineError::InvalidAnswers(problems) => (
            StatusCode::BAD_REQUEST,
            "INVALID_ANSWERS",
            message,
            Some(json!(problems)),
        ),
        EngineError::RoutineChanged { .. } => (StatusCode::CONFLICT, "ROUTINE_CHANGED", message, None),
        EngineError::InvalidState { .. } => (StatusCode::CONFLICT, "INVALID_STATE", message, None),
        EngineError::Source(SourceError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, "ROUTINE_NOT_FOUND", message, None)
        }
        EngineError::Source(SourceError::Load(_)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "ROUTINE_LOAD_FAILED", message, None)
        }
        EngineError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", message, None),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        } else {
            tracing::debug!(code, %message, "request rejected");
        }

        let mut error = json!({"code": code, "message": message});
        if let Some(details) = details {
            error["details"] = details;
        }
        let body = json!({
            "data": null,
            "meta": {
                "request_id": uuid::Uuid::now_v7().to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [error]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_map_to_status() {
        let (status, code, _, _) = AppError::from(EngineError::RunNotFound("r1".into())).parts();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(code, "RUN_NOT_FOUND");

        let (status, code, _, details) =
            AppError::from(EngineError::InvalidAnswers(vec!["missing required field: confirm".into()])).parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "INVALID_ANSWERS");
        assert_eq!(details, Some(json!(["missing required field: confirm"])));
    }

    #[test]
    fn test_anyhow_downcasts_known_errors() {
        let err = anyhow::Error::from(EngineError::RunNotFound("r1".into()));
        assert!(matches!(AppError::from(err), AppError::Engine(EngineError::RunNotFound(_))));

        let err = anyhow::Error::from(PackageError::NotFound("/nope".into()));
        let (status, code, _, _) = AppError::from(err).parts();
        assert_eq!((status, code), (StatusCode::NOT_FOUND, "PACKAGE_NOT_FOUND"));

        let err = anyhow::anyhow!("boom");
        assert!(matches!(AppError::from(err), AppError::Internal(_)));
    }

    #[test]
    fn test_response_status() {
        let response = AppError::Validation("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
