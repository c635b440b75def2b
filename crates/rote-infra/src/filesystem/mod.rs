//! Filesystem adapters: the data directory layout and the file-backed
//! run state store.

pub mod run_state;

use std::path::{Path, PathBuf};

/// Resolve the data directory.
///
/// Priority:
/// 1. `ROTE_DATA_DIR` environment variable
/// 2. `~/.rote`
/// 3. `.rote` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    data_dir_from(std::env::var("ROTE_DATA_DIR").ok())
}

fn data_dir_from(env_value: Option<String>) -> PathBuf {
    if let Some(dir) = env_value.filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".rote");
    }
    PathBuf::from(".rote")
}

/// Directory holding one JSON file per run: `{data_dir}/runs/`.
pub fn runs_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("runs")
}

/// Write `contents` to `path` via a sibling temp file and a rename, so a
/// reader never observes a partially written file.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_env_wins() {
        assert_eq!(data_dir_from(Some("/srv/rote".into())), PathBuf::from("/srv/rote"));
    }

    #[test]
    fn test_data_dir_default_is_dot_rote() {
        let dir = data_dir_from(None);
        assert!(dir.ends_with(".rote"));
        assert_eq!(data_dir_from(Some(String::new())), dir);
    }

    #[tokio::test]
    async fn test_write_atomic_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b.json");
        write_atomic(&path, b"{}").await.unwrap();
        write_atomic(&path, b"{\"x\":1}").await.unwrap();

        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "{\"x\":1}");
        let names: Vec<_> = std::fs::read_dir(dir.path().join("a"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["b.json"]);
    }
}
