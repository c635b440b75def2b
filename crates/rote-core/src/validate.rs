//! Static routine validation.
//!
//! Checks a routine without executing it and reports every problem found,
//! not just the first. An empty list means the routine is valid.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use rote_types::routine::{FieldType, Routine, StepKind};

use crate::expr::{
    ExpressionError, check, is_variable_name, references, template_references, value_references,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    /// A package file could not be read or parsed.
    Parse,
    Structure,
    DuplicateStepId,
    UndeclaredTool,
    UnresolvedUdf,
    InvalidExpression,
    UnresolvedReference,
    InvalidSchema,
    InvalidPrompt,
    Unreachable,
}

/// One problem found in a routine package.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    /// Where the problem is, e.g. `steps[2].when` or `schemas/input.schema.json`.
    pub location: String,
    pub kind: ValidationKind,
    pub message: String,
}

impl ValidationError {
    pub fn new(location: impl Into<String>, kind: ValidationKind, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

fn valid_routine_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Check that `schema` is a usable JSON Schema document.
pub fn validate_schema(location: &str, schema: &Value) -> Option<ValidationError> {
    if !schema.is_object() && !schema.is_boolean() {
        return Some(ValidationError::new(
            location,
            ValidationKind::InvalidSchema,
            "schema must be an object or a boolean",
        ));
    }
    jsonschema::validator_for(schema).err().map(|e| {
        ValidationError::new(location, ValidationKind::InvalidSchema, e.to_string())
    })
}

/// Validate a routine.
///
/// `udf_functions` lists the functions the paired UDF module defines; pass
/// `None` to skip UDF resolution when the module is unknown.
pub fn validate_routine(routine: &Routine, udf_functions: Option<&[String]>) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if routine.version.trim().is_empty() {
        errors.push(ValidationError::new(
            "version",
            ValidationKind::Structure,
            "version must not be empty",
        ));
    }
    if !valid_routine_name(&routine.name) {
        errors.push(ValidationError::new(
            "name",
            ValidationKind::Structure,
            format!(
                "invalid routine name '{}': use lowercase letters, digits, '_' or '-'",
                routine.name
            ),
        ));
    }
    if routine.steps.is_empty() {
        errors.push(ValidationError::new(
            "steps",
            ValidationKind::Structure,
            "routine has no steps",
        ));
    }

    check_schemas(routine, &mut errors);
    check_steps(routine, udf_functions, &mut errors);
    check_references(routine, &mut errors);

    errors
}

fn check_schemas(routine: &Routine, errors: &mut Vec<ValidationError>) {
    if let Some(schema) = &routine.input_schema {
        errors.extend(validate_schema("input_schema", schema));
    }
    if let Some(schema) = &routine.output_schema {
        errors.extend(validate_schema("output_schema", schema));
    }
    for (name, decl) in &routine.tools {
        if let Some(schema) = &decl.args_schema {
            errors.extend(validate_schema(&format!("tools.{name}.args_schema"), schema));
        }
        if let Some(schema) = &decl.result_schema {
            errors.extend(validate_schema(&format!("tools.{name}.result_schema"), schema));
        }
    }
}

fn expression_error(location: String, e: ExpressionError) -> ValidationError {
    ValidationError::new(location, ValidationKind::InvalidExpression, e.to_string())
}

fn check_steps(routine: &Routine, udf_functions: Option<&[String]>, errors: &mut Vec<ValidationError>) {
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut terminated_at: Option<&str> = None;

    for (i, step) in routine.steps.iter().enumerate() {
        let at = |field: &str| format!("steps[{i}].{field}");

        if let Some(return_id) = terminated_at {
            errors.push(ValidationError::new(
                format!("steps[{i}]"),
                ValidationKind::Unreachable,
                format!(
                    "step '{}' can never run: step '{return_id}' returns unconditionally",
                    step.id
                ),
            ));
            terminated_at = None;
        }

        if step.id.trim().is_empty() {
            errors.push(ValidationError::new(at("id"), ValidationKind::Structure, "step id must not be empty"));
        } else if !seen_ids.insert(step.id.as_str()) {
            errors.push(ValidationError::new(
                at("id"),
                ValidationKind::DuplicateStepId,
                format!("duplicate step id: '{}'", step.id),
            ));
        }

        if let Some(save_as) = &step.save_as {
            if !is_variable_name(save_as) {
                errors.push(ValidationError::new(
                    at("save_as"),
                    ValidationKind::Structure,
                    format!("'{save_as}' is not a valid variable name"),
                ));
            }
        }

        if let Some(when) = &step.when {
            if let Err(e) = check(when) {
                errors.push(expression_error(at("when"), e));
            }
        }

        match &step.kind {
            StepKind::ToolCall { tool, args } => {
                if !routine.tools.contains_key(tool) {
                    errors.push(ValidationError::new(
                        at("tool"),
                        ValidationKind::UndeclaredTool,
                        format!("tool '{tool}' is not declared under tools"),
                    ));
                }
                if let Err(e) = value_references(&Value::Object(args.clone())) {
                    errors.push(expression_error(at("args"), e));
                }
            }
            StepKind::UdfCall { function, args } => {
                if let Some(defined) = udf_functions {
                    if !defined.iter().any(|f| f == function) {
                        errors.push(ValidationError::new(
                            at("function"),
                            ValidationKind::UnresolvedUdf,
                            format!("function '{function}' is not defined in the UDF module"),
                        ));
                    }
                }
                if let Err(e) = value_references(&Value::Object(args.clone())) {
                    errors.push(expression_error(at("args"), e));
                }
            }
            StepKind::Assert { check, message } => {
                if let Err(e) = crate::expr::check(check) {
                    errors.push(expression_error(at("check"), e));
                }
                if let Some(message) = message {
                    if let Err(e) = template_references(message) {
                        errors.push(expression_error(at("message"), e));
                    }
                }
            }
            StepKind::PromptUser { message, fields } => {
                if let Err(e) = template_references(message) {
                    errors.push(expression_error(at("message"), e));
                }
                check_prompt_fields(i, fields, errors);
            }
            StepKind::Return { value } => {
                if let Err(e) = value_references(value) {
                    errors.push(expression_error(at("value"), e));
                }
                if step.when.is_none() {
                    terminated_at = Some(step.id.as_str());
                }
            }
        }
    }
}

fn check_prompt_fields(
    i: usize,
    fields: &[rote_types::routine::PromptField],
    errors: &mut Vec<ValidationError>,
) {
    let mut names = HashSet::new();
    for (j, field) in fields.iter().enumerate() {
        let at = format!("steps[{i}].fields[{j}]");
        if field.name.trim().is_empty() {
            errors.push(ValidationError::new(&at, ValidationKind::InvalidPrompt, "field name must not be empty"));
        } else if !names.insert(field.name.as_str()) {
            errors.push(ValidationError::new(
                &at,
                ValidationKind::InvalidPrompt,
                format!("duplicate field name: '{}'", field.name),
            ));
        }

        let options = field.options.as_deref().unwrap_or_default();
        if field.field_type == FieldType::Select && options.is_empty() {
            errors.push(ValidationError::new(
                &at,
                ValidationKind::InvalidPrompt,
                format!("select field '{}' has no options", field.name),
            ));
        }

        if let Some(default) = &field.default {
            let fits = match field.field_type {
                FieldType::Confirm => default.is_boolean(),
                FieldType::Number => default.is_number(),
                FieldType::Text => default.is_string(),
                FieldType::Select => default
                    .as_str()
                    .is_some_and(|d| options.iter().any(|o| o == d)),
            };
            if !fits {
                errors.push(ValidationError::new(
                    &at,
                    ValidationKind::InvalidPrompt,
                    format!(
                        "default for {} field '{}' has the wrong type or is not an option",
                        field.field_type, field.name
                    ),
                ));
            }
        }
    }
}

/// Every root a step reads must be an input or an earlier `save_as`.
///
/// Only runs when the input schema declares `properties`; without it the
/// set of inputs is unknown.
fn check_references(routine: &Routine, errors: &mut Vec<ValidationError>) {
    let Some(inputs) = routine
        .input_schema
        .as_ref()
        .and_then(|s| s.get("properties"))
        .and_then(Value::as_object)
    else {
        return;
    };
    let mut defined: BTreeSet<String> = inputs.keys().cloned().collect();

    for (i, step) in routine.steps.iter().enumerate() {
        let mut reads = BTreeSet::new();
        if let Some(when) = &step.when {
            reads.extend(references(when).unwrap_or_default());
        }
        let found = match &step.kind {
            StepKind::ToolCall { args, .. } | StepKind::UdfCall { args, .. } => {
                value_references(&Value::Object(args.clone()))
            }
            StepKind::Assert { check, message } => {
                let mut refs = references(check).unwrap_or_default();
                if let Some(m) = message {
                    refs.extend(template_references(m).unwrap_or_default());
                }
                Ok(refs)
            }
            StepKind::PromptUser { message, .. } => template_references(message),
            StepKind::Return { value } => value_references(value),
        };
        reads.extend(found.unwrap_or_default());

        for name in reads.difference(&defined) {
            errors.push(ValidationError::new(
                format!("steps[{i}]"),
                ValidationKind::UnresolvedReference,
                format!(
                    "step '{}' reads '{name}', which is neither an input nor saved by an earlier step",
                    step.id
                ),
            ));
        }
        if let Some(save_as) = &step.save_as {
            defined.insert(save_as.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rote_types::routine::{PromptField, Step, ToolDecl};
    use serde_json::{Map, json};

    fn sample() -> Routine {
        serde_yaml_ng::from_str(
            r#"
version: "1"
name: csv_report
tools:
  fetch_csv:
    description: fetch
    args_schema: {type: object}
input_schema:
  type: object
  properties:
    url: {type: string}
output_schema: {type: object}
steps:
  - id: s1
    type: tool.call
    tool: fetch_csv
    args: {url: "{{ url }}"}
    save_as: raw
  - id: s2
    type: udf.call
    function: parse_csv
    args: {raw_csv: "{{ raw }}"}
    save_as: parsed
  - id: s3
    type: assert
    check: "count(parsed) > 0"
    message: "no rows in {{ url }}"
  - id: s4
    type: return
    value: "{{ parsed }}"
"#,
        )
        .unwrap()
    }

    fn udfs() -> Vec<String> {
        vec!["parse_csv".to_string()]
    }

    fn kinds(errors: &[ValidationError]) -> Vec<ValidationKind> {
        errors.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_valid_routine_has_no_errors() {
        let errors = validate_routine(&sample(), Some(&udfs()));
        assert!(errors.is_empty(), "unexpected: {errors:?}");
    }

    #[test]
    fn test_undeclared_tool() {
        let mut routine = sample();
        routine.tools.clear();
        let errors = validate_routine(&routine, Some(&udfs()));
        assert!(kinds(&errors).contains(&ValidationKind::UndeclaredTool));
    }

    #[test]
    fn test_unresolved_udf_only_when_module_known() {
        let routine = sample();
        let errors = validate_routine(&routine, Some(&[]));
        assert_eq!(kinds(&errors), vec![ValidationKind::UnresolvedUdf]);
        assert!(validate_routine(&routine, None).is_empty());
    }

    #[test]
    fn test_duplicate_step_id() {
        let mut routine = sample();
        routine.steps[1].id = "s1".into();
        let errors = validate_routine(&routine, Some(&udfs()));
        assert!(errors.iter().any(|e| e.kind == ValidationKind::DuplicateStepId
            && e.message.contains("duplicate step id: 's1'")));
    }

    #[test]
    fn test_bad_expression_and_forbidden_call() {
        let mut routine = sample();
        routine.steps[0].when = Some("url ==".into());
        routine.steps[2].kind = StepKind::Assert {
            check: "system('ls')".into(),
            message: None,
        };
        let errors = validate_routine(&routine, Some(&udfs()));
        let bad: Vec<_> = errors
            .iter()
            .filter(|e| e.kind == ValidationKind::InvalidExpression)
            .map(|e| e.location.as_str())
            .collect();
        assert_eq!(bad, vec!["steps[0].when", "steps[2].check"]);
    }

    #[test]
    fn test_reference_to_unsaved_variable() {
        let mut routine = sample();
        routine.steps[1].save_as = None;
        let errors = validate_routine(&routine, Some(&udfs()));
        let unresolved: Vec<_> = errors
            .iter()
            .filter(|e| e.kind == ValidationKind::UnresolvedReference)
            .collect();
        assert_eq!(unresolved.len(), 2);
        assert!(unresolved[0].message.contains("'parsed'"));
    }

    #[test]
    fn test_reference_check_skipped_without_input_properties() {
        let mut routine = sample();
        routine.input_schema = None;
        routine.steps[1].save_as = None;
        assert!(validate_routine(&routine, Some(&udfs())).is_empty());
    }

    #[test]
    fn test_invalid_schema() {
        let mut routine = sample();
        routine.output_schema = Some(json!({"type": "strng"}));
        routine.input_schema = Some(json!(42));
        let errors = validate_routine(&routine, Some(&udfs()));
        let locations: Vec<_> = errors
            .iter()
            .filter(|e| e.kind == ValidationKind::InvalidSchema)
            .map(|e| e.location.as_str())
            .collect();
        assert_eq!(locations, vec!["input_schema", "output_schema"]);
    }

    #[test]
    fn test_unreachable_after_return() {
        let mut routine = sample();
        routine.steps.swap(2, 3);
        let errors = validate_routine(&routine, Some(&udfs()));
        assert_eq!(kinds(&errors), vec![ValidationKind::Unreachable]);
    }

    #[test]
    fn test_prompt_field_checks() {
        let mut routine = sample();
        routine.steps.insert(
            3,
            Step::new(
                "ask",
                StepKind::PromptUser {
                    message: "Pick".into(),
                    fields: vec![
                        PromptField {
                            name: "mode".into(),
                            label: "Mode".into(),
                            field_type: FieldType::Select,
                            required: true,
                            default: None,
                            options: None,
                        },
                        PromptField {
                            name: "mode".into(),
                            label: "Again".into(),
                            field_type: FieldType::Confirm,
                            required: true,
                            default: Some(json!("yes")),
                            options: None,
                        },
                    ],
                },
            ),
        );
        let errors = validate_routine(&routine, Some(&udfs()));
        assert_eq!(
            kinds(&errors),
            vec![
                ValidationKind::InvalidPrompt,
                ValidationKind::InvalidPrompt,
                ValidationKind::InvalidPrompt
            ]
        );
    }

    #[test]
    fn test_structure_errors() {
        let routine = Routine {
            version: String::new(),
            name: "Bad Name".into(),
            description: None,
            tools: [("t".to_string(), ToolDecl::default())].into_iter().collect(),
            input_schema: None,
            output_schema: None,
            steps: vec![],
        };
        let errors = validate_routine(&routine, None);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.kind == ValidationKind::Structure));
    }

    #[test]
    fn test_bad_save_as() {
        let mut routine = sample();
        routine.steps[0].save_as = Some("raw data".into());
        routine.steps[1].kind = StepKind::UdfCall {
            function: "parse_csv".into(),
            args: Map::new(),
        };
        let errors = validate_routine(&routine, Some(&udfs()));
        assert!(errors.iter().any(|e| e.location == "steps[0].save_as"));
    }

    #[test]
    fn test_keyword_save_as_is_rejected() {
        let mut routine = sample();
        routine.steps[0].save_as = Some("none".into());
        let errors = validate_routine(&routine, Some(&udfs()));
        assert!(
            errors
                .iter()
                .any(|e| e.location == "steps[0].save_as" && e.kind == ValidationKind::Structure)
        );
    }
}
