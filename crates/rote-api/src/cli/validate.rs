//! `rote validate` -- static package checks.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use rote_infra::package::validate_package_dir;

pub async fn validate_package(dir: &Path, json: bool) -> Result<u8> {
    let errors = validate_package_dir(dir).await;
    let code = if errors.is_empty() { 0 } else { 1 };

    if json {
        let body = serde_json::json!({
            "valid": errors.is_empty(),
            "errors": errors,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(code);
    }

    println!();
    if errors.is_empty() {
        println!("  {} {} is valid", style("✓").green().bold(), style(dir.display()).cyan());
        println!();
        return Ok(code);
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Location").fg(Color::White),
        Cell::new("Kind").fg(Color::White),
        Cell::new("Problem").fg(Color::White),
    ]);
    for error in &errors {
        table.add_row(vec![
            Cell::new(&error.location).fg(Color::Cyan),
            Cell::new(format!("{:?}", error.kind)).fg(Color::Yellow),
            Cell::new(&error.message),
        ]);
    }

    println!("  {} {} problem(s) in {}", style("✗").red().bold(), errors.len(), dir.display());
    println!();
    println!("{table}");
    println!();
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::state_with_package;

    #[tokio::test]
    async fn test_compiled_package_is_valid() {
        let (_state, _data, pkg) = state_with_package().await;
        assert_eq!(validate_package(pkg.path(), true).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_dir_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert_eq!(validate_package(&missing, true).await.unwrap(), 1);
    }
}
