//! Built-in tools.
//!
//! - `fetch` -- `fetch_text` / `fetch_csv` over `fixture://` and HTTP(S)

pub mod fetch;

use std::path::Path;

use serde_json::json;

use rote_core::runtime::{ToolError, ToolRegistry};

pub use fetch::FetchTool;

/// Register every built-in tool. `fixture://` URLs resolve against
/// `<package_dir>/fixtures/data/`.
pub fn register_builtin_tools(registry: &ToolRegistry, package_dir: &Path) -> Result<(), ToolError> {
    let url_args = json!({
        "type": "object",
        "properties": {"url": {"type": "string", "minLength": 1}},
        "required": ["url"]
    });
    let fetch = FetchTool::for_package(package_dir);
    registry.register_with_schema("fetch_text", fetch.clone(), &url_args)?;
    registry.register_with_schema("fetch_csv", fetch, &url_args)?;
    Ok(())
}
