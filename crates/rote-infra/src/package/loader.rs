//! Read packages back from disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use rote_core::compiler::fixtures::{Fixture, FixtureSet};
use rote_core::compiler::udf_stub::UdfManifest;
use rote_core::runtime::replay::FixtureReplay;
use rote_core::runtime::source::SourceError;
use rote_core::runtime::udf::NativeUdfModule;
use rote_core::runtime::{RoutineHandle, RoutineSource, UdfModule};
use rote_types::routine::Routine;
use rote_types::run::RoutineRef;

use super::{
    EXPECTED_OUTPUT_FILE, FIXTURES_DIR, INPUT_FILE, PackageError, ROUTINE_FILE, UDF_FILE,
    UDF_MANIFEST_FILE,
};
use crate::udf::RhaiUdfModule;

/// Everything read from a package directory.
#[derive(Debug, Clone)]
pub struct Package {
    pub dir: PathBuf,
    pub routine: Routine,
    /// `udf.rhai`, when present.
    pub udf_source: Option<String>,
    pub udf_manifest: UdfManifest,
    pub fixtures: FixtureSet,
    pub input: Option<Value>,
    pub expected_output: Option<Value>,
}

impl Package {
    pub async fn read(dir: &Path) -> Result<Self, PackageError> {
        let dir = tokio::fs::canonicalize(dir)
            .await
            .map_err(|_| PackageError::NotFound(dir.to_path_buf()))?;

        let routine_path = dir.join(ROUTINE_FILE);
        let yaml = tokio::fs::read_to_string(&routine_path)
            .await
            .map_err(|e| PackageError::io(&routine_path, e))?;
        let routine: Routine =
            serde_yaml_ng::from_str(&yaml).map_err(|e| PackageError::parse(&routine_path, e))?;

        let udf_source = read_optional(&dir.join(UDF_FILE)).await?;
        let udf_manifest = read_optional_json::<UdfManifest>(&dir.join(UDF_MANIFEST_FILE))
            .await?
            .unwrap_or_default();
        let fixtures = read_fixtures(&dir.join(FIXTURES_DIR)).await?;
        let input = read_optional_json(&dir.join(INPUT_FILE)).await?;
        let expected_output = read_optional_json(&dir.join(EXPECTED_OUTPUT_FILE)).await?;

        tracing::debug!(
            dir = %dir.display(),
            routine = %routine.name,
            fixtures = fixtures.len(),
            "read routine package"
        );
        Ok(Self {
            dir,
            routine,
            udf_source,
            udf_manifest,
            fixtures,
            input,
            expected_output,
        })
    }

    fn location(&self) -> Option<String> {
        Some(self.dir.display().to_string())
    }

    /// A handle running the package's Rhai UDFs.
    pub fn handle(&self) -> Result<RoutineHandle, PackageError> {
        let udfs: Arc<dyn UdfModule> = match &self.udf_source {
            Some(source) => Arc::new(RhaiUdfModule::compile(source)?),
            None => Arc::new(NativeUdfModule::new()),
        };
        Ok(RoutineHandle::new(self.routine.clone(), udfs, self.location()))
    }

    /// Tools and UDFs answered from the recorded fixtures.
    pub fn replay(&self) -> FixtureReplay {
        FixtureReplay::new(self.fixtures.clone())
    }

    /// A handle whose UDF calls replay fixtures instead of running script.
    pub fn replay_handle(&self) -> RoutineHandle {
        let udfs: Arc<dyn UdfModule> = Arc::new(self.replay().udf_module());
        RoutineHandle::new(self.routine.clone(), udfs, self.location())
    }
}

/// Read a package and compile its UDF module.
pub async fn load_package(dir: &Path) -> Result<RoutineHandle, PackageError> {
    Package::read(dir).await?.handle()
}

/// Reopens routines from the package directory recorded in `RoutineRef`.
#[derive(Debug, Clone, Default)]
pub struct PackageRoutineSource {
    replay: bool,
}

impl PackageRoutineSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open handles with fixture-replaying UDFs.
    pub fn replaying() -> Self {
        Self { replay: true }
    }
}

impl RoutineSource for PackageRoutineSource {
    async fn open(&self, reference: &RoutineRef) -> Result<RoutineHandle, SourceError> {
        let location = reference
            .location
            .as_deref()
            .ok_or_else(|| SourceError::NotFound(reference.name.clone()))?;

        let package = Package::read(Path::new(location))
            .await
            .map_err(|e| match e {
                PackageError::NotFound(path) => SourceError::NotFound(path.display().to_string()),
                other => SourceError::Load(other.to_string()),
            })?;

        if self.replay {
            Ok(package.replay_handle())
        } else {
            package.handle().map_err(|e| SourceError::Load(e.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn read_optional(path: &Path) -> Result<Option<String>, PackageError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PackageError::io(path, e)),
    }
}

async fn read_optional_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PackageError> {
    match read_optional(path).await? {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| PackageError::parse(path, e)),
        None => Ok(None),
    }
}

/// Every `fixtures/*.json` file, ordered by `seq`.
pub(crate) async fn read_fixtures(dir: &Path) -> Result<FixtureSet, PackageError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FixtureSet::default()),
        Err(e) => return Err(PackageError::io(dir, e)),
    };

    let mut fixtures = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PackageError::io(dir, e))?
    {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let fixture: Fixture = read_optional_json(&path)
            .await?
            .ok_or_else(|| PackageError::NotFound(path.clone()))?;
        fixtures.push(fixture);
    }
    Ok(FixtureSet::new(fixtures))
}
