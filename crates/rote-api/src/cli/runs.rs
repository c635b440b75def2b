//! `rote runs` -- suspended runs.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use rote_types::run::RunState;

use crate::state::AppState;

pub async fn list_runs(state: &AppState, json: bool) -> Result<u8> {
    let runs = state.bare_engine().pending().await?;

    if json {
        let rows: Vec<_> = runs.iter().map(run_summary).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(0);
    }

    if runs.is_empty() {
        println!();
        println!("  {} No runs are waiting for input.", style("i").blue().bold());
        println!();
        return Ok(0);
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Run").fg(Color::White),
        Cell::new("Routine").fg(Color::White),
        Cell::new("Waiting At").fg(Color::White),
        Cell::new("Suspended").fg(Color::White),
        Cell::new("Package").fg(Color::White),
    ]);

    for run in &runs {
        table.add_row(vec![
            Cell::new(&run.run_id).fg(Color::Cyan),
            Cell::new(format!("{} v{}", run.routine.name, run.routine.version)),
            Cell::new(run.pending_prompt.as_deref().unwrap_or("-")).fg(Color::Yellow),
            Cell::new(format_relative_time(&run.updated_at)),
            Cell::new(run.routine.location.as_deref().unwrap_or("-")).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!("  {} suspended run(s)", runs.len());
    println!();
    Ok(0)
}

/// JSON row for one suspended run. The context stays private.
pub fn run_summary(run: &RunState) -> serde_json::Value {
    serde_json::json!({
        "run_id": run.run_id,
        "routine": run.routine.name,
        "version": run.routine.version,
        "pending_prompt": run.pending_prompt,
        "package_dir": run.routine.location,
        "created_at": run.created_at.to_rfc3339(),
        "updated_at": run.updated_at.to_rfc3339(),
    })
}

fn format_relative_time(dt: &chrono::DateTime<chrono::Utc>) -> String {
    let diff = chrono::Utc::now() - *dt;
    if diff.num_minutes() < 1 {
        "just now".to_string()
    } else if diff.num_hours() < 1 {
        format!("{}m ago", diff.num_minutes())
    } else if diff.num_days() < 1 {
        format!("{}h ago", diff.num_hours())
    } else {
        dt.format("%Y-%m-%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rote_types::context::Context;
    use rote_types::run::RoutineRef;
    use serde_json::json;

    #[test]
    fn test_summary_omits_context() {
        let routine = RoutineRef {
            name: "count_csv_rows".into(),
            version: "1".into(),
            digest: "abc".into(),
            location: Some("/tmp/pkg".into()),
        };
        let state = RunState::start("r1", routine, Context::from_input(json!({"secret": 1}).as_object().unwrap().clone()));
        let row = run_summary(&state);
        assert_eq!(row["routine"], "count_csv_rows");
        assert_eq!(row["package_dir"], "/tmp/pkg");
        assert!(row.get("context").is_none());
    }

    #[test]
    fn test_relative_time() {
        let now = chrono::Utc::now();
        assert_eq!(format_relative_time(&now), "just now");
        let earlier = now - chrono::Duration::minutes(5);
        assert_eq!(format_relative_time(&earlier), "5m ago");
    }
}
