//! Write a compiled package to disk.

use std::path::Path;

use serde::Serialize;

use rote_core::compiler::CompiledPackage;

use super::{
    EXPECTED_OUTPUT_FILE, FIXTURES_DIR, INPUT_FILE, INPUT_SCHEMA_FILE, OUTPUT_SCHEMA_FILE,
    PackageError, ROUTINE_FILE, SCHEMAS_DIR, UDF_FILE, UDF_MANIFEST_FILE,
};
use crate::filesystem::write_atomic;

/// Write every package file under `dir`, creating it if needed.
///
/// Existing fixture JSON files are removed first so a recompile into the
/// same directory never leaves stale recordings behind. `fixtures/data/`
/// is left alone.
pub async fn write_package(dir: &Path, package: &CompiledPackage) -> Result<(), PackageError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PackageError::io(dir, e))?;

    let yaml = serde_yaml_ng::to_string(&package.routine)
        .map_err(|e| PackageError::parse(dir.join(ROUTINE_FILE), e))?;
    write_file(&dir.join(ROUTINE_FILE), yaml.as_bytes()).await?;
    write_file(&dir.join(UDF_FILE), package.udf_source.as_bytes()).await?;
    write_json(&dir.join(UDF_MANIFEST_FILE), &package.udf_manifest).await?;

    let schemas = dir.join(SCHEMAS_DIR);
    if let Some(schema) = &package.routine.input_schema {
        write_json(&schemas.join(INPUT_SCHEMA_FILE), schema).await?;
    }
    if let Some(schema) = &package.routine.output_schema {
        write_json(&schemas.join(OUTPUT_SCHEMA_FILE), schema).await?;
    }

    let fixtures_dir = dir.join(FIXTURES_DIR);
    clear_fixture_files(&fixtures_dir).await?;
    for fixture in &package.fixtures.fixtures {
        let path = fixtures_dir.join(format!("{}.json", file_stem(&fixture.step_id)));
        write_json(&path, fixture).await?;
    }

    if let Some(input) = &package.input {
        write_json(&dir.join(INPUT_FILE), input).await?;
    }
    if let Some(output) = &package.expected_output {
        write_json(&dir.join(EXPECTED_OUTPUT_FILE), output).await?;
    }

    tracing::info!(
        dir = %dir.display(),
        routine = %package.routine.name,
        steps = package.routine.steps.len(),
        fixtures = package.fixtures.len(),
        "wrote routine package"
    );
    Ok(())
}

fn file_stem(step_id: &str) -> String {
    step_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), PackageError> {
    write_atomic(path, contents)
        .await
        .map_err(|e| PackageError::io(path, e))
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PackageError> {
    let mut json = serde_json::to_vec_pretty(value).map_err(|e| PackageError::parse(path, e))?;
    json.push(b'\n');
    write_file(path, &json).await
}

async fn clear_fixture_files(dir: &Path) -> Result<(), PackageError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(PackageError::io(dir, e)),
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PackageError::io(dir, e))?
    {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| PackageError::io(&path, e))?;
        }
    }
    Ok(())
}
