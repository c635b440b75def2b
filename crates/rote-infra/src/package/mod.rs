//! Routine packages on disk.
//!
//! A package is a directory:
//!
//! ```text
//! routine.yaml
//! udf.rhai
//! udf.manifest.json
//! schemas/input.schema.json
//! schemas/output.schema.json
//! fixtures/<step_id>.json
//! fixtures/data/            (files served to fixture:// URLs)
//! input.json
//! expected_output.json
//! ```

pub mod loader;
pub mod validate;
pub mod writer;

use std::path::PathBuf;

use thiserror::Error;

use rote_core::runtime::UdfError;

pub use loader::{Package, PackageRoutineSource, load_package};
pub use validate::validate_package_dir;
pub use writer::write_package;

pub const ROUTINE_FILE: &str = "routine.yaml";
pub const UDF_FILE: &str = "udf.rhai";
pub const UDF_MANIFEST_FILE: &str = "udf.manifest.json";
pub const SCHEMAS_DIR: &str = "schemas";
pub const INPUT_SCHEMA_FILE: &str = "input.schema.json";
pub const OUTPUT_SCHEMA_FILE: &str = "output.schema.json";
pub const FIXTURES_DIR: &str = "fixtures";
pub const FIXTURE_DATA_DIR: &str = "data";
pub const INPUT_FILE: &str = "input.json";
pub const EXPECTED_OUTPUT_FILE: &str = "expected_output.json";

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("package not found: {0}")]
    NotFound(PathBuf),

    #[error("{path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("{path}: invalid document: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("UDF module: {0}")]
    Udf(#[from] UdfError),
}

impl PackageError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        PackageError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        PackageError::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
