//! URL fetching tool.
//!
//! `fixture://<name>` reads `<fixture_dir>/<name>`; `http://` and `https://`
//! go over the network. Authentication failures are reported as credential
//! errors so the engine never tries to auto-fix them.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;

use rote_core::runtime::tools::ToolArgs;
use rote_core::runtime::{Tool, ToolError};

use crate::package::{FIXTURE_DATA_DIR, FIXTURES_DIR};

const FIXTURE_SCHEME: &str = "fixture://";

/// Fetches a URL and returns its body as a string.
#[derive(Debug, Clone)]
pub struct FetchTool {
    client: reqwest::Client,
    fixture_dir: PathBuf,
}

impl FetchTool {
    /// Serve `fixture://` URLs from `fixture_dir`.
    pub fn new(fixture_dir: impl Into<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            fixture_dir: fixture_dir.into(),
        }
    }

    /// Serve `fixture://` URLs from `<package_dir>/fixtures/data/`.
    pub fn for_package(package_dir: &Path) -> Self {
        Self::new(package_dir.join(FIXTURES_DIR).join(FIXTURE_DATA_DIR))
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub async fn fetch(&self, url: &str) -> Result<String, ToolError> {
        if let Some(name) = url.strip_prefix(FIXTURE_SCHEME) {
            return self.read_fixture(name).await;
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            return self.fetch_http(url).await;
        }
        Err(ToolError::InvalidArgs(format!("unsupported URL scheme: {url}")))
    }

    async fn read_fixture(&self, name: &str) -> Result<String, ToolError> {
        let relative = Path::new(name);
        let contained = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !contained {
            return Err(ToolError::InvalidArgs(format!("invalid fixture name: {name:?}")));
        }

        let path = self.fixture_dir.join(relative);
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolError::Execution(format!("fixture not found: {}", path.display()))
            } else {
                ToolError::Execution(format!("{}: {e}", path.display()))
            }
        })
    }

    async fn fetch_http(&self, url: &str) -> Result<String, ToolError> {
        tracing::debug!(%url, "fetching");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        match status.as_u16() {
            401 | 403 => {
                return Err(ToolError::Credential(format!("HTTP {status} from {url}")));
            }
            _ if !status.is_success() => {
                return Err(ToolError::Execution(format!("HTTP {status} from {url}")));
            }
            _ => {}
        }

        response
            .text()
            .await
            .map_err(|e| ToolError::Execution(format!("failed to read response body: {e}")))
    }
}

impl Tool for FetchTool {
    fn call<'a>(&'a self, args: ToolArgs) -> BoxFuture<'a, Result<Value, ToolError>> {
        Box::pin(async move {
            let url = args
                .get("url")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::InvalidArgs("'url' must be a string".to_string()))?;
            self.fetch(url).await.map(Value::String)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::testing::{http_response, local_client, serve_once};

    async fn serve(status: &str, body: &str) -> String {
        let (base, _request) = serve_once(http_response(status, body)).await;
        format!("{base}/data.csv")
    }

    fn local_tool(dir: &Path) -> FetchTool {
        FetchTool::new(dir).with_client(local_client())
    }

    #[tokio::test]
    async fn test_reads_fixture_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("demo.csv"), "a,b\n1,2\n").await.unwrap();
        let tool = FetchTool::new(dir.path());

        let out = tool.call(json!({"url": "fixture://demo.csv"}).as_object().cloned().unwrap()).await;
        assert_eq!(out.unwrap(), json!("a,b\n1,2\n"));
    }

    #[tokio::test]
    async fn test_missing_fixture_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FetchTool::new(dir.path()).fetch("fixture://nope.csv").await.unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }

    #[tokio::test]
    async fn test_rejects_escaping_fixture_names() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FetchTool::new(dir.path());
        for url in ["fixture://../secret", "fixture:///etc/passwd", "fixture://"] {
            let err = tool.fetch(url).await.unwrap_err();
            assert!(matches!(err, ToolError::InvalidArgs(_)), "{url}");
        }
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let err = FetchTool::new(dir.path()).fetch("ftp://x/y").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn test_missing_url_arg() {
        let dir = tempfile::tempdir().unwrap();
        let err = FetchTool::new(dir.path()).call(Default::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn test_http_success() {
        let url = serve("200 OK", "a,b\n1,2").await;
        let dir = tempfile::tempdir().unwrap();
        let body = local_tool(dir.path()).fetch(&url).await.unwrap();
        assert_eq!(body, "a,b\n1,2");
    }

    #[tokio::test]
    async fn test_http_unauthorized_is_credential_error() {
        let url = serve("401 Unauthorized", "").await;
        let dir = tempfile::tempdir().unwrap();
        let err = local_tool(dir.path()).fetch(&url).await.unwrap_err();
        assert!(err.is_credential(), "{err:?}");
    }

    #[tokio::test]
    async fn test_http_not_found_is_execution_error() {
        let url = serve("404 Not Found", "").await;
        let dir = tempfile::tempdir().unwrap();
        let err = local_tool(dir.path()).fetch(&url).await.unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }
}
