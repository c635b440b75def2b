//! Reading JSON arguments and printing run results.

use std::path::Path;

use anyhow::{Context, Result, bail};
use console::style;
use serde_json::Value;

use rote_types::run::{PromptAnswers, RunResult, RunStatus};

/// Parse `arg` as a path to a JSON file if one exists, otherwise as inline JSON.
pub async fn read_json_arg(arg: &str) -> Result<Value> {
    let path = Path::new(arg);
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        return serde_json::from_str(&text)
            .with_context(|| format!("{} is not valid JSON", path.display()));
    }
    serde_json::from_str(arg).with_context(|| format!("'{arg}' is neither a file nor valid JSON"))
}

/// Answers from a JSON object, either `{"values": {...}}` or a bare map.
pub fn answers_from_json(value: Value) -> Result<PromptAnswers> {
    let Value::Object(mut map) = value else {
        bail!("answers must be a JSON object");
    };
    if map.len() == 1 {
        if let Some(Value::Object(values)) = map.remove("values") {
            return Ok(PromptAnswers { values });
        }
    }
    Ok(PromptAnswers { values: map })
}

/// Exit code for a run outcome: 1 when failed.
pub fn exit_code(result: &RunResult) -> u8 {
    match result.status {
        RunStatus::Failed => 1,
        _ => 0,
    }
}

/// Print a run result as JSON or styled text.
pub fn print_result(result: &RunResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!();
    match result.status {
        RunStatus::Ok => {
            println!("  {} Run {} finished", style("✓").green().bold(), style(&result.run_id).dim());
            if let Some(output) = &result.output {
                println!();
                for line in serde_json::to_string_pretty(output)?.lines() {
                    println!("  {line}");
                }
            }
        }
        RunStatus::Failed => {
            println!("  {} Run {} failed", style("✗").red().bold(), style(&result.run_id).dim());
            if let Some(failure) = &result.failure {
                println!(
                    "  {}  step {} ({})",
                    style("Where:").bold(),
                    style(&failure.step_id).cyan(),
                    failure.kind
                );
                println!("  {}  {}", style("Error:").bold(), failure.message);
            }
        }
        RunStatus::NeedsInput | RunStatus::Running => {
            println!(
                "  {} Run {} is waiting for input at step {}",
                style("?").yellow().bold(),
                style(&result.run_id).cyan(),
                style(result.pending_prompt.as_deref().unwrap_or("?")).cyan()
            );
            if let Some(message) = &result.prompt_message {
                println!("  {message}");
            }
            println!();
            println!(
                "  Resume with: {}",
                style(format!("rote resume {} --answers '{{...}}'", result.run_id)).yellow()
            );
        }
    }
    println!();
    Ok(())
}
