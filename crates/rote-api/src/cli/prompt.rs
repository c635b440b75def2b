//! Interactive answers for `prompt.user` steps.

use anyhow::{Result, bail};
use console::style;
use dialoguer::{Confirm, Input, Select};
use serde_json::Value;

use rote_types::routine::{FieldType, PromptField};
use rote_types::run::{PromptAnswers, RunResult};

/// Ask for every field of the pending prompt.
///
/// Text and number answers are returned as strings; the engine coerces them.
pub fn ask(result: &RunResult) -> Result<PromptAnswers> {
    println!();
    if let Some(message) = &result.prompt_message {
        println!("  {} {}", style("?").yellow().bold(), style(message).bold());
    }

    let mut answers = PromptAnswers::new();
    for field in result.prompt_fields.iter().flatten() {
        if let Some(value) = ask_field(field)? {
            answers = answers.with(field.name.clone(), value);
        }
    }
    Ok(answers)
}

fn ask_field(field: &PromptField) -> Result<Option<Value>> {
    let value = match field.field_type {
        FieldType::Confirm => {
            let default = field.default.as_ref().and_then(Value::as_bool).unwrap_or(false);
            let confirmed = Confirm::new()
                .with_prompt(&field.label)
                .default(default)
                .interact()?;
            Some(Value::Bool(confirmed))
        }
        FieldType::Select => {
            let options = field.options.clone().unwrap_or_default();
            if options.is_empty() {
                bail!("field '{}' has no options", field.name);
            }
            let default = field
                .default
                .as_ref()
                .and_then(Value::as_str)
                .and_then(|d| options.iter().position(|o| o == d))
                .unwrap_or(0);
            let index = Select::new()
                .with_prompt(&field.label)
                .items(&options)
                .default(default)
                .interact()?;
            options.get(index).cloned().map(Value::String)
        }
        FieldType::Text | FieldType::Number => {
            let mut input = Input::<String>::new()
                .with_prompt(&field.label)
                .allow_empty(!field.required);
            if let Some(default) = field.default.as_ref().map(default_text) {
                input = input.default(default);
            }
            let text = input.interact_text()?;
            if text.is_empty() && !field.required {
                None
            } else {
                Some(Value::String(text))
            }
        }
    };
    Ok(value)
}

fn default_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_text_renders_raw_strings() {
        assert_eq!(default_text(&json!("csv")), "csv");
        assert_eq!(default_text(&json!(3)), "3");
        assert_eq!(default_text(&json!(true)), "true");
    }
}
