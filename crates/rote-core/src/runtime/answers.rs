//! Prompt answer validation and coercion.

use serde_json::{Map, Number, Value};

use rote_types::routine::{FieldType, PromptField};
use rote_types::run::PromptAnswers;

use crate::expr::display_string;

/// Check `answers` against `fields` and coerce each value to its field type.
///
/// Returns the map to store in the context, or every problem found. A `null`
/// answer counts as not supplied.
pub fn validate_answers(
    fields: &[PromptField],
    answers: &PromptAnswers,
) -> Result<Map<String, Value>, Vec<String>> {
    let mut errors = Vec::new();
    let mut values = Map::new();

    for name in answers.values.keys() {
        if !fields.iter().any(|f| &f.name == name) {
            errors.push(format!("unknown field: {name}"));
        }
    }

    for field in fields {
        let supplied = answers.values.get(&field.name).filter(|v| !v.is_null());
        match (supplied, &field.default) {
            (Some(value), _) => match coerce(field, value) {
                Ok(v) => {
                    values.insert(field.name.clone(), v);
                }
                Err(message) => errors.push(message),
            },
            (None, Some(default)) => {
                values.insert(field.name.clone(), default.clone());
            }
            (None, None) if field.required => {
                errors.push(format!("missing required field: {}", field.name));
            }
            (None, None) => {}
        }
    }

    if errors.is_empty() { Ok(values) } else { Err(errors) }
}

fn coerce(field: &PromptField, value: &Value) -> Result<Value, String> {
    let name = &field.name;
    match field.field_type {
        FieldType::Confirm => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "yes" | "y" | "true" => Ok(Value::Bool(true)),
                "no" | "n" | "false" => Ok(Value::Bool(false)),
                _ => Err(format!("field '{name}' must be yes/no, got '{s}'")),
            },
            _ => Err(format!("field '{name}' must be a boolean")),
        },
        FieldType::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => parse_number(s.trim())
                .ok_or_else(|| format!("field '{name}' must be a number, got '{s}'")),
            _ => Err(format!("field '{name}' must be a number")),
        },
        FieldType::Text => match value {
            Value::Array(_) | Value::Object(_) => Err(format!("field '{name}' must be text")),
            other => Ok(Value::String(display_string(other))),
        },
        FieldType::Select => {
            let choice = match value {
                Value::Array(_) | Value::Object(_) => {
                    return Err(format!("field '{name}' must be one of its options"));
                }
                other => display_string(other),
            };
            let options = field.options.as_deref().unwrap_or_default();
            if options.iter().any(|o| *o == choice) {
                Ok(Value::String(choice))
            } else {
                Err(format!(
                    "field '{name}' must be one of: {}",
                    options.join(", ")
                ))
            }
        }
    }
}

fn parse_number(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str, field_type: FieldType, required: bool, default: Option<Value>) -> PromptField {
        PromptField {
            name: name.into(),
            label: name.into(),
            field_type,
            required,
            default,
            options: None,
        }
    }

    #[test]
    fn test_default_fills_missing_answer() {
        let fields = vec![field("confirm", FieldType::Confirm, true, Some(json!(true)))];
        let values = validate_answers(&fields, &PromptAnswers::new()).unwrap();
        assert_eq!(values.get("confirm"), Some(&json!(true)));
    }

    #[test]
    fn test_missing_required_without_default() {
        let fields = vec![field("email", FieldType::Text, true, None)];
        let errors = validate_answers(&fields, &PromptAnswers::new()).unwrap_err();
        assert_eq!(errors, vec!["missing required field: email"]);
    }

    #[test]
    fn test_optional_field_absent() {
        let fields = vec![field("note", FieldType::Text, false, None)];
        let values = validate_answers(&fields, &PromptAnswers::new()).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_confirm_and_number_coercion() {
        let fields = vec![
            field("ok", FieldType::Confirm, true, None),
            field("n", FieldType::Number, true, None),
            field("f", FieldType::Number, true, None),
            field("t", FieldType::Text, true, None),
        ];
        let answers = PromptAnswers::new()
            .with("ok", json!("Yes"))
            .with("n", json!("42"))
            .with("f", json!("2.5"))
            .with("t", json!(7));
        let values = validate_answers(&fields, &answers).unwrap();
        assert_eq!(values["ok"], json!(true));
        assert_eq!(values["n"], json!(42));
        assert_eq!(values["f"], json!(2.5));
        assert_eq!(values["t"], json!("7"));
    }

    #[test]
    fn test_select_must_match_option() {
        let mut f = field("mode", FieldType::Select, true, None);
        f.options = Some(vec!["fast".into(), "slow".into()]);
        let fields = vec![f];

        let ok = validate_answers(&fields, &PromptAnswers::new().with("mode", json!("slow"))).unwrap();
        assert_eq!(ok["mode"], json!("slow"));

        let errors =
            validate_answers(&fields, &PromptAnswers::new().with("mode", json!("medium"))).unwrap_err();
        assert_eq!(errors, vec!["field 'mode' must be one of: fast, slow"]);
    }

    #[test]
    fn test_unknown_and_bad_values_all_reported() {
        let fields = vec![field("ok", FieldType::Confirm, true, None)];
        let answers = PromptAnswers::new()
            .with("ok", json!("perhaps"))
            .with("extra", json!(1));
        let errors = validate_answers(&fields, &answers).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&"unknown field: extra".to_string()));
    }
}
