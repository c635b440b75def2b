//! Routine domain types.
//!
//! A `Routine` is the compiled, deterministic program derived from a trace:
//! declared tools, input/output schemas and an ordered list of steps. It is
//! serialized as `routine.yaml` inside a routine package and is read-only
//! to the runtime engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Routine
// ---------------------------------------------------------------------------

/// A compiled routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    /// Routine format version.
    pub version: String,
    /// Machine name, lowercase with `_` or `-` separators.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tools the routine may call, keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tools: BTreeMap<String, ToolDecl>,
    /// JSON Schema for the run input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    /// JSON Schema for the returned value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Steps, executed in order.
    pub steps: Vec<Step>,
}

impl Routine {
    /// Index of the step with the given id.
    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    /// The step with the given id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Names of every UDF the routine calls, in first-use order, deduplicated.
    pub fn udf_functions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for step in &self.steps {
            if let StepKind::UdfCall { function, .. } = &step.kind {
                if !names.contains(&function.as_str()) {
                    names.push(function);
                }
            }
        }
        names
    }
}

/// A tool declaration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolDecl {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_schema: Option<Value>,
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// A single routine step.
///
/// The common fields live here; the variant payload is flattened so that
/// the YAML reads as one mapping:
/// ```yaml
/// - id: s1
///   type: tool.call
///   tool: fetch_csv
///   args:
///     url: "{{ url }}"
///   save_as: result_s1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique within the routine.
    pub id: String,
    /// Condition; the step is skipped when it evaluates falsy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    /// Context variable that receives the step result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_as: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            when: None,
            save_as: None,
            description: None,
            kind,
        }
    }

    pub fn with_save_as(mut self, name: impl Into<String>) -> Self {
        self.save_as = Some(name.into());
        self
    }

    pub fn with_when(mut self, expr: impl Into<String>) -> Self {
        self.when = Some(expr.into());
        self
    }

    /// The `type` tag of this step.
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

/// Step variant payload, internally tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StepKind {
    /// Invoke a registered tool.
    #[serde(rename = "tool.call")]
    ToolCall {
        tool: String,
        #[serde(default)]
        args: Map<String, Value>,
    },
    /// Invoke a function from the routine's UDF module.
    #[serde(rename = "udf.call")]
    UdfCall {
        function: String,
        #[serde(default)]
        args: Map<String, Value>,
    },
    /// Fail the run unless `check` evaluates truthy.
    #[serde(rename = "assert")]
    Assert {
        check: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Suspend and ask the caller for input.
    #[serde(rename = "prompt.user")]
    PromptUser {
        message: String,
        #[serde(default)]
        fields: Vec<PromptField>,
    },
    /// Finish the run with `value` as output.
    #[serde(rename = "return")]
    Return {
        #[serde(default)]
        value: Value,
    },
}

impl StepKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            StepKind::ToolCall { .. } => "tool.call",
            StepKind::UdfCall { .. } => "udf.call",
            StepKind::Assert { .. } => "assert",
            StepKind::PromptUser { .. } => "prompt.user",
            StepKind::Return { .. } => "return",
        }
    }

    /// Call arguments for tool and UDF steps.
    pub fn args(&self) -> Option<&Map<String, Value>> {
        match self {
            StepKind::ToolCall { args, .. } | StepKind::UdfCall { args, .. } => Some(args),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Prompt fields
// ---------------------------------------------------------------------------

/// One input requested by a `prompt.user` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptField {
    pub name: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

fn default_required() -> bool {
    true
}

/// The value type a prompt field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Select,
    Confirm,
    Number,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FieldType::Text => "text",
            FieldType::Select => "select",
            FieldType::Confirm => "confirm",
            FieldType::Number => "number",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE_YAML: &str = r#"
version: "1"
name: csv_report
description: Report on a CSV
tools:
  fetch_csv:
    description: Fetch a CSV file
    args_schema:
      type: object
input_schema:
  type: object
  properties:
    url:
      type: string
steps:
  - id: s1
    type: tool.call
    tool: fetch_csv
    args:
      url: "{{ url }}"
    save_as: result_s1
  - id: s2
    type: udf.call
    function: parse_csv
    args:
      raw_csv: "{{ result_s1 }}"
    save_as: result_s2
  - id: s3
    type: assert
    check: "result_s2.rows > 0"
    message: no rows
  - id: s4
    type: prompt.user
    message: Proceed?
    fields:
      - name: confirm
        label: Proceed?
        type: confirm
        default: true
    save_as: approval_s4
  - id: s5
    type: return
    when: "approval_s4.confirm"
    value: "{{ result_s2 }}"
"#;

    #[test]
    fn test_routine_yaml_parses_every_step_kind() {
        let routine: Routine = serde_yaml_ng::from_str(SAMPLE_YAML).unwrap();
        assert_eq!(routine.name, "csv_report");
        assert_eq!(routine.steps.len(), 5);
        assert_eq!(routine.steps[0].type_name(), "tool.call");
        assert_eq!(routine.steps[1].type_name(), "udf.call");
        assert_eq!(routine.steps[2].type_name(), "assert");
        assert_eq!(routine.steps[3].type_name(), "prompt.user");
        assert_eq!(routine.steps[4].type_name(), "return");
        assert_eq!(routine.steps[4].when.as_deref(), Some("approval_s4.confirm"));
        assert!(routine.tools.contains_key("fetch_csv"));
    }

    #[test]
    fn test_prompt_field_defaults() {
        let field: PromptField =
            serde_json::from_value(json!({"name": "note", "label": "Note"})).unwrap();
        assert!(field.required);
        assert_eq!(field.field_type, FieldType::Text);
        assert!(field.default.is_none());
    }

    #[test]
    fn test_step_serializes_flat_with_type_tag() {
        let step = Step::new(
            "s1",
            StepKind::ToolCall {
                tool: "fetch".into(),
                args: Map::new(),
            },
        )
        .with_save_as("out");
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["type"], "tool.call");
        assert_eq!(value["tool"], "fetch");
        assert_eq!(value["save_as"], "out");
        assert!(value.get("when").is_none());
    }

    #[test]
    fn test_unknown_step_type_rejected() {
        let raw = json!({"id": "s1", "type": "shell.exec", "command": "ls"});
        assert!(serde_json::from_value::<Step>(raw).is_err());
    }

    #[test]
    fn test_udf_functions_deduplicated_in_order() {
        let routine: Routine = serde_yaml_ng::from_str(SAMPLE_YAML).unwrap();
        assert_eq!(routine.udf_functions(), vec!["parse_csv"]);
        assert_eq!(routine.step_index("s3"), Some(2));
        assert!(routine.step("missing").is_none());
    }
}
