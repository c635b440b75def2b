//! `rote compile` -- trace file to routine package.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::Instrument;

use rote_core::compiler::{CompiledPackage, compile, compile_with, parse_trace};
use rote_core::llm::LlmHappyPathExtractor;
use rote_infra::llm::llm_client_from_env;
use rote_infra::package::write_package;
use rote_types::trace::Trace;

use crate::state::AppState;

/// Compile `trace_path`, optionally through the LLM extractor, and write the package.
pub async fn compile_trace(
    state: &AppState,
    trace_path: &Path,
    output: &Path,
    llm: bool,
    json: bool,
) -> Result<u8> {
    let text = tokio::fs::read_to_string(trace_path)
        .await
        .with_context(|| format!("cannot read trace {}", trace_path.display()))?;

    let span = tracing::info_span!("rote.compile", llm, routine = tracing::field::Empty);
    let package = compile_text(state, &text, llm, json)
        .instrument(span.clone())
        .await?;
    span.record("routine", package.routine.name.as_str());

    write_package(output, &package).await?;

    if json {
        let summary = serde_json::json!({
            "output_dir": output.display().to_string(),
            "routine": package.routine.name,
            "steps": package.routine.steps.len(),
            "tools": package.routine.tools.keys().collect::<Vec<_>>(),
            "udfs": package.udf_manifest.functions.iter().map(|f| &f.name).collect::<Vec<_>>(),
            "fixtures": package.fixtures.len(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(0);
    }

    println!();
    println!("  {} Routine package written", style("✓").green().bold());
    println!();
    println!("  {}  {}", style("Routine:").bold(), style(&package.routine.name).cyan());
    println!("  {}    {}", style("Steps:").bold(), package.routine.steps.len());
    println!("  {} {}", style("Fixtures:").bold(), package.fixtures.len());
    println!("  {}      {}", style("Dir:").bold(), style(output.display()).dim());
    if package.udf_manifest.functions.iter().any(|f| !f.implemented) {
        println!();
        println!(
            "  {} Implement the UDF stubs in {} before running without --replay.",
            style("i").blue().bold(),
            style(output.join("udf.rhai").display()).yellow()
        );
    }
    println!();
    Ok(0)
}

async fn compile_text(state: &AppState, text: &str, llm: bool, json: bool) -> Result<CompiledPackage> {
    let trace = parse_trace(text)?;
    build_package(state, &trace, llm, !json).await
}

/// Compile a parsed trace. With `llm`, the extractor is tried first and the
/// deterministic compile is the fallback.
pub async fn build_package(
    state: &AppState,
    trace: &Trace,
    llm: bool,
    show_spinner: bool,
) -> Result<CompiledPackage> {
    if !llm {
        return Ok(compile(trace)?);
    }

    let client = llm_client_from_env(&state.config.llm)?;
    let extractor = LlmHappyPathExtractor::new(client).with_max_tokens(state.config.llm.max_tokens);

    let spinner = show_spinner.then(|| {
        let spinner = ProgressBar::new_spinner();
        if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            spinner.set_style(template);
        }
        spinner.set_message("Extracting happy path...");
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    });

    let package = compile_with(trace, &extractor).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    Ok(package?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::TRACE;

    #[tokio::test]
    async fn test_compile_writes_package() {
        let data = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let state = AppState::open(data.path().to_path_buf()).await.unwrap();

        let trace_path = work.path().join("trace.json");
        tokio::fs::write(&trace_path, TRACE).await.unwrap();
        let out = work.path().join("pkg");

        let code = compile_trace(&state, &trace_path, &out, false, true).await.unwrap();
        assert_eq!(code, 0);
        assert!(out.join("routine.yaml").exists());
        assert!(out.join("udf.rhai").exists());
    }

    #[tokio::test]
    async fn test_compile_rejects_missing_trace() {
        let data = tempfile::tempdir().unwrap();
        let state = AppState::open(data.path().to_path_buf()).await.unwrap();
        let missing = data.path().join("nope.json");
        assert!(compile_trace(&state, &missing, data.path(), false, true).await.is_err());
    }
}
