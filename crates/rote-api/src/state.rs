//! Application state shared by the CLI and the REST API.
//!
//! `AppState` owns the resolved data directory, the loaded config and the
//! state store. Engines are cheap and built per package, because the tool
//! registry depends on the package directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};

use rote_core::llm::LlmRecoveryHook;
use rote_core::runtime::{
    BoxRecoveryHook, Engine, EngineConfig, EngineError, RoutineHandle, StateStore, ToolRegistry,
};
use rote_infra::config::load_config;
use rote_infra::filesystem::resolve_data_dir;
use rote_infra::llm::llm_client_from_env;
use rote_infra::package::{Package, PackageRoutineSource};
use rote_infra::store::AnyStateStore;
use rote_infra::tools::register_builtin_tools;
use rote_types::config::RoteConfig;

pub type RoteEngine = Engine<AnyStateStore, PackageRoutineSource>;

/// How an engine executes a package.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    /// Answer tools and UDFs from recorded fixtures.
    pub replay: bool,
    /// Consult the LLM recovery hook on step failures.
    pub auto_fix: bool,
}

/// An engine wired for one package, with the handle to run.
pub struct Prepared {
    pub engine: RoteEngine,
    pub handle: RoutineHandle,
    pub package: Package,
}

#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: Arc<RoteConfig>,
    pub store: AnyStateStore,
}

impl AppState {
    /// Resolve the data directory, load config and open the state store.
    pub async fn init() -> anyhow::Result<Self> {
        Self::open(resolve_data_dir()).await
    }

    pub async fn open(data_dir: PathBuf) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("cannot create data directory {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;
        let store = AnyStateStore::open(&config.state, &data_dir).await?;
        tracing::debug!(
            data_dir = %data_dir.display(),
            backend = ?store.backend(),
            "application state ready"
        );

        Ok(Self {
            data_dir,
            config: Arc::new(config),
            store,
        })
    }

    /// Build an engine for the package at `dir`.
    pub async fn prepare(&self, dir: &Path, options: ExecOptions) -> anyhow::Result<Prepared> {
        let package = Package::read(dir).await?;

        let (handle, tools, source) = if options.replay {
            (
                package.replay_handle(),
                package.replay().tool_registry(),
                PackageRoutineSource::replaying(),
            )
        } else {
            let tools = ToolRegistry::new();
            register_builtin_tools(&tools, &package.dir)?;
            (package.handle()?, tools, PackageRoutineSource::new())
        };

        let mut engine = Engine::new(self.store.clone(), source, tools)
            .with_config(EngineConfig::from(&self.config.runtime));
        if options.auto_fix {
            let client = llm_client_from_env(&self.config.llm)?;
            engine = engine.with_recovery_hook(BoxRecoveryHook::new(LlmRecoveryHook::new(client)));
        }

        Ok(Prepared {
            engine,
            handle,
            package,
        })
    }

    /// Build an engine for the package a suspended run belongs to.
    pub async fn prepare_for_run(&self, run_id: &str, options: ExecOptions) -> anyhow::Result<Prepared> {
        let Some(state) = self.store.load(run_id).await? else {
            return Err(EngineError::RunNotFound(run_id.to_string()).into());
        };
        let Some(location) = state.routine.location else {
            bail!("run {run_id} does not record its package directory");
        };
        self.prepare(Path::new(&location), options).await
    }

    /// An engine with no tools, for operations that never execute steps.
    pub fn bare_engine(&self) -> RoteEngine {
        Engine::new(self.store.clone(), PackageRoutineSource::new(), ToolRegistry::new())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub const TRACE: &str = r#"{
        "app": {"name": "csv-agent"},
        "mission": {"goal": "Count CSV rows", "input_summary": {"url": "fixture://demo.csv"}},
        "events": [
            {"type": "tool_call", "seq": 1, "tool": "fetch_csv", "args": {"url": "fixture://demo.csv"}, "result": "a\n1\n2"},
            {"type": "approval", "seq": 2, "prompt": "Count the rows?", "answer": true},
            {"type": "udf_call", "seq": 3, "function": "count_rows", "args": {"raw": "a\n1\n2"}, "result": 2}
        ],
        "final_output": 2
    }"#;

    /// App state over a fresh data dir, plus a compiled package dir.
    pub async fn state_with_package() -> (AppState, tempfile::TempDir, tempfile::TempDir) {
        let data_dir = tempfile::tempdir().unwrap();
        let pkg_dir = tempfile::tempdir().unwrap();
        let trace = rote_core::compiler::parse_trace(TRACE).unwrap();
        let compiled = rote_core::compiler::compile(&trace).unwrap();
        rote_infra::package::write_package(pkg_dir.path(), &compiled)
            .await
            .unwrap();
        let state = AppState::open(data_dir.path().to_path_buf()).await.unwrap();
        (state, data_dir, pkg_dir)
    }
}
