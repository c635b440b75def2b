//! File-level package validation.
//!
//! Wraps the core routine validator with checks only a directory can fail:
//! missing or unparseable files, a UDF module that does not compile, and
//! schema files that are not JSON Schema.

use std::path::Path;

use serde_json::Value;

use rote_core::compiler::fixtures::Fixture;
use rote_core::runtime::UdfModule;
use rote_core::validate::{ValidationError, ValidationKind, validate_routine, validate_schema};
use rote_types::routine::Routine;

use super::{FIXTURES_DIR, ROUTINE_FILE, SCHEMAS_DIR, UDF_FILE};
use crate::udf::RhaiUdfModule;

/// Validate the package at `dir`. An empty list means it is valid.
pub async fn validate_package_dir(dir: &Path) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if !dir.is_dir() {
        errors.push(ValidationError::new(
            dir.display().to_string(),
            ValidationKind::Parse,
            "package directory not found",
        ));
        return errors;
    }

    let routine = match read_routine(dir).await {
        Ok(routine) => Some(routine),
        Err(e) => {
            errors.push(e);
            None
        }
    };

    let udf_functions = match tokio::fs::read_to_string(dir.join(UDF_FILE)).await {
        Ok(source) => match RhaiUdfModule::compile(&source) {
            Ok(module) => Some(module.functions()),
            Err(e) => {
                errors.push(ValidationError::new(UDF_FILE, ValidationKind::Parse, e.to_string()));
                None
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Some(Vec::new()),
        Err(e) => {
            errors.push(ValidationError::new(UDF_FILE, ValidationKind::Parse, e.to_string()));
            None
        }
    };

    if let Some(routine) = &routine {
        // `None` skips UDF resolution when the module failed to load.
        errors.extend(validate_routine(routine, udf_functions.as_deref()));
    }

    errors.extend(check_json_files(dir, SCHEMAS_DIR, validate_schema).await);
    errors.extend(check_json_files(dir, FIXTURES_DIR, |location, value| {
        serde_json::from_value::<Fixture>(value.clone())
            .err()
            .map(|e| ValidationError::new(location, ValidationKind::Parse, format!("not a fixture: {e}")))
    })
    .await);

    tracing::debug!(dir = %dir.display(), problems = errors.len(), "validated package");
    errors
}

async fn read_routine(dir: &Path) -> Result<Routine, ValidationError> {
    let text = tokio::fs::read_to_string(dir.join(ROUTINE_FILE))
        .await
        .map_err(|e| ValidationError::new(ROUTINE_FILE, ValidationKind::Parse, e.to_string()))?;
    serde_yaml_ng::from_str(&text)
        .map_err(|e| ValidationError::new(ROUTINE_FILE, ValidationKind::Parse, e.to_string()))
}

/// Parse every `*.json` file directly under `dir/subdir` and run `check` on it.
async fn check_json_files<F>(dir: &Path, subdir: &str, check: F) -> Vec<ValidationError>
where
    F: Fn(&str, &Value) -> Option<ValidationError>,
{
    let mut errors = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir.join(subdir)).await {
        Ok(entries) => entries,
        Err(_) => return errors,
    };

    let mut paths = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    for path in paths {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let location = format!("{subdir}/{file_name}");
        let parsed = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(value) => errors.extend(check(&location, &value)),
            Err(message) => errors.push(ValidationError::new(location, ValidationKind::Parse, message)),
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::write_package;
    use rote_core::compiler::{compile, parse_trace};

    const TRACE: &str = r#"{
        "app": {"name": "agent"},
        "mission": {"goal": "Count rows", "input_summary": {"url": "fixture://demo.csv"}},
        "events": [
            {"type": "tool_call", "seq": 1, "tool": "fetch_csv", "args": {"url": "fixture://demo.csv"}, "result": "a\n1\n2"},
            {"type": "udf_call", "seq": 2, "function": "count_rows", "args": {"raw": "a\n1\n2"}, "result": 2}
        ],
        "final_output": 2
    }"#;

    async fn package_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let compiled = compile(&parse_trace(TRACE).unwrap()).unwrap();
        write_package(dir.path(), &compiled).await.unwrap();
        dir
    }

    #[tokio::test]
    async fn test_compiled_package_is_valid() {
        let dir = package_dir().await;
        let errors = validate_package_dir(dir.path()).await;
        assert!(errors.is_empty(), "unexpected problems: {errors:?}");
    }

    #[tokio::test]
    async fn test_missing_routine_file() {
        let dir = package_dir().await;
        tokio::fs::remove_file(dir.path().join("routine.yaml")).await.unwrap();
        let errors = validate_package_dir(dir.path()).await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].location, "routine.yaml");
        assert_eq!(errors[0].kind, ValidationKind::Parse);
    }

    #[tokio::test]
    async fn test_udf_file_problems() {
        let dir = package_dir().await;
        tokio::fs::write(dir.path().join("udf.rhai"), "fn count_rows( {")
            .await
            .unwrap();
        let errors = validate_package_dir(dir.path()).await;
        assert!(errors.iter().any(|e| e.location == "udf.rhai"));

        tokio::fs::write(dir.path().join("udf.rhai"), "fn other(x) { x }")
            .await
            .unwrap();
        let errors = validate_package_dir(dir.path()).await;
        assert!(errors.iter().any(|e| e.kind == ValidationKind::UnresolvedUdf));
    }

    #[tokio::test]
    async fn test_bad_schema_and_fixture_files() {
        let dir = package_dir().await;
        tokio::fs::write(dir.path().join("schemas").join("output.schema.json"), "{\"type\": 12}")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("fixtures").join("s1.json"), "not json")
            .await
            .unwrap();

        let errors = validate_package_dir(dir.path()).await;
        assert!(errors.iter().any(|e| e.location == "schemas/output.schema.json"
            && e.kind == ValidationKind::InvalidSchema));
        assert!(errors.iter().any(|e| e.location == "fixtures/s1.json" && e.kind == ValidationKind::Parse));
    }

    #[tokio::test]
    async fn test_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let errors = validate_package_dir(&dir.path().join("nope")).await;
        assert_eq!(errors.len(), 1);
    }
}
