//! Configuration loader for Rote.
//!
//! Reads `config.toml` from the data directory (`~/.rote/` by default) into
//! [`RoteConfig`]. A missing file means defaults; a malformed one is logged
//! and also falls back to defaults, so a bad edit never blocks a run.

use std::path::{Path, PathBuf};

use thiserror::Error;

use rote_types::config::RoteConfig;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Read and parse a config file. Missing files are an error here.
pub async fn read_config(path: &Path) -> Result<RoteConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load `{data_dir}/config.toml`, falling back to defaults.
pub async fn load_config(data_dir: &Path) -> RoteConfig {
    let path = data_dir.join(CONFIG_FILE);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return RoteConfig::default();
    }
    match read_config(&path).await {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "using default configuration");
            RoteConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rote_types::config::StateBackend;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config.runtime.step_timeout_secs, 300);
        assert_eq!(config.state.backend, StateBackend::Sqlite);
    }

    #[tokio::test]
    async fn test_valid_file_is_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
[runtime]
step_timeout_secs = 30

[state]
backend = "file"

[server]
port = 9000
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.runtime.step_timeout_secs, 30);
        assert_eq!(config.state.backend, StateBackend::File);
        assert_eq!(config.server.port, 9000);
    }

    #[tokio::test]
    async fn test_invalid_file_falls_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        tokio::fs::write(&path, "this is not { valid toml !!!").await.unwrap();

        assert!(matches!(read_config(&path).await, Err(ConfigError::Parse { .. })));
        let config = load_config(tmp.path()).await;
        assert_eq!(config.runtime.hook_timeout_secs, 60);
    }
}
