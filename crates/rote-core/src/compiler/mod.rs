//! Trace -> routine compiler.
//!
//! - `schema` -- structural JSON Schema inference
//! - `fixtures` -- recorded call results for replay
//! - `udf_stub` -- UDF signatures and stub module rendering
//! - `happy_path` -- pluggable LLM-assisted extraction
//!
//! `compile` is deterministic: the same trace always produces the same
//! package. `compile_with` consults a `HappyPathExtractor` first and falls
//! back to `compile` on any extractor failure.

pub mod fixtures;
pub mod happy_path;
pub mod schema;
pub mod udf_stub;

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value, json};
use thiserror::Error;

use rote_types::routine::{FieldType, PromptField, Routine, Step, StepKind, ToolDecl};
use rote_types::trace::{Event, Trace};

use crate::expr::{escape_literal, escape_value, is_variable_name};
use crate::validate::validate_routine;
use fixtures::{Fixture, FixtureKind, FixtureSet, canonical_json};
use happy_path::HappyPathExtractor;
use schema::{infer_args_schema, infer_schema};
use udf_stub::{UdfManifest, declared_functions, render_rhai_stub, script_identifier};

/// Current routine format version.
pub const ROUTINE_VERSION: &str = "1";

const MAX_NAME_LEN: usize = 60;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("malformed trace: {0}")]
    Malformed(String),

    #[error("event seq must be strictly increasing: {current} follows {previous}")]
    NonMonotonicSeq { previous: u64, current: u64 },

    #[error("event {seq} has an empty {field}")]
    EmptyName { seq: u64, field: &'static str },

    #[error("mission.input_summary must be a JSON object")]
    InputNotObject,
}

/// Everything a compile produces.
#[derive(Debug, Clone)]
pub struct CompiledPackage {
    pub routine: Routine,
    pub udf_manifest: UdfManifest,
    pub udf_source: String,
    pub fixtures: FixtureSet,
    /// The recorded input, for replay.
    pub input: Option<Value>,
    /// The recorded final output, for replay checks.
    pub expected_output: Option<Value>,
}

/// Parse trace JSON text.
pub fn parse_trace(text: &str) -> Result<Trace, CompileError> {
    serde_json::from_str(text).map_err(|e| CompileError::Malformed(e.to_string()))
}

/// Deterministically compile a trace into a routine package.
pub fn compile(trace: &Trace) -> Result<CompiledPackage, CompileError> {
    check_trace_shape(trace)?;

    let mut builder = Builder::new(trace);
    for (i, event) in trace.events.iter().enumerate() {
        builder.push(i + 1, event);
    }
    let package = builder.finish(trace);

    tracing::debug!(
        routine = %package.routine.name,
        steps = package.routine.steps.len(),
        fixtures = package.fixtures.len(),
        "compiled trace"
    );
    Ok(package)
}

/// Compile using `extractor`, falling back to [`compile`] on any failure.
///
/// Malformed traces are still rejected up front; only extractor errors and
/// structurally invalid extractor output trigger the fallback.
pub async fn compile_with<E: HappyPathExtractor>(
    trace: &Trace,
    extractor: &E,
) -> Result<CompiledPackage, CompileError> {
    let baseline = compile(trace)?;

    let extracted = match extractor.extract(trace).await {
        Ok(extracted) => extracted,
        Err(e) => {
            tracing::warn!(error = %e, "happy-path extraction failed, using deterministic compile");
            return Ok(baseline);
        }
    };

    let functions = declared_functions(&extracted.udf_source);
    let problems = validate_routine(&extracted.routine, Some(functions.as_slice()));
    if !problems.is_empty() {
        tracing::warn!(
            problems = problems.len(),
            first = %problems[0],
            "extracted routine is invalid, using deterministic compile"
        );
        return Ok(baseline);
    }

    let mut udf_manifest = UdfManifest::default();
    for name in extracted.routine.udf_functions() {
        let signature = baseline.udf_manifest.get(name).cloned();
        if let Some(mut sig) = signature {
            sig.implemented = true;
            udf_manifest.functions.push(sig);
        }
    }

    Ok(CompiledPackage {
        routine: extracted.routine,
        udf_manifest,
        udf_source: extracted.udf_source,
        ..baseline
    })
}

fn check_trace_shape(trace: &Trace) -> Result<(), CompileError> {
    if let Some(summary) = &trace.mission.input_summary {
        if !summary.is_object() {
            return Err(CompileError::InputNotObject);
        }
    }

    let mut previous: Option<u64> = None;
    for event in &trace.events {
        let seq = event.seq();
        if let Some(prev) = previous {
            if seq <= prev {
                return Err(CompileError::NonMonotonicSeq {
                    previous: prev,
                    current: seq,
                });
            }
        }
        previous = Some(seq);

        match event {
            Event::ToolCall { tool, .. } if tool.trim().is_empty() => {
                return Err(CompileError::EmptyName { seq, field: "tool" });
            }
            Event::UdfCall { function, .. } if function.trim().is_empty() => {
                return Err(CompileError::EmptyName {
                    seq,
                    field: "function",
                });
            }
            _ => {}
        }
    }
    Ok(())
}

/// Routine name derived from the mission goal.
pub fn slugify(goal: &str) -> String {
    let mut slug = String::new();
    for c in goal.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let mut slug: String = slug.trim_matches('_').chars().take(MAX_NAME_LEN).collect();
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        "routine".to_string()
    } else {
        slug
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

struct Builder {
    steps: Vec<Step>,
    tools: BTreeMap<String, ToolDecl>,
    manifest: UdfManifest,
    fixtures: Vec<Fixture>,
    /// Canonical JSON of every known value -> the variable holding it.
    known: HashMap<String, String>,
}

impl Builder {
    fn new(trace: &Trace) -> Self {
        let mut known = HashMap::new();
        if let Some(Value::Object(input)) = &trace.mission.input_summary {
            for (k, v) in input.iter().filter(|(k, _)| is_variable_name(k)) {
                known.insert(canonical_json(v), k.clone());
            }
        }
        Self {
            steps: Vec::new(),
            tools: BTreeMap::new(),
            manifest: UdfManifest::default(),
            fixtures: Vec::new(),
            known,
        }
    }

    fn push(&mut self, n: usize, event: &Event) {
        let id = format!("s{n}");
        match event {
            Event::ToolCall {
                seq,
                tool,
                args,
                result,
            } => {
                let save_as = format!("result_s{n}");
                self.tools.entry(tool.clone()).or_insert_with(|| ToolDecl {
                    description: format!("Recorded tool `{tool}`"),
                    args_schema: Some(infer_args_schema(args)),
                    result_schema: None,
                });
                let step_args = self.templatize_args(args);
                self.steps.push(
                    Step::new(
                        &id,
                        StepKind::ToolCall {
                            tool: tool.clone(),
                            args: step_args,
                        },
                    )
                    .with_save_as(&save_as),
                );
                self.record(*seq, &id, FixtureKind::Tool, tool, args, result, save_as);
            }
            Event::UdfCall {
                seq,
                function,
                args,
                result,
            } => {
                let function = script_identifier(function);
                let save_as = format!("result_s{n}");
                self.manifest.observe(&function, args, result);
                let step_args = self.templatize_args(args);
                self.steps.push(
                    Step::new(
                        &id,
                        StepKind::UdfCall {
                            function: function.clone(),
                            args: step_args,
                        },
                    )
                    .with_save_as(&save_as),
                );
                self.record(*seq, &id, FixtureKind::Udf, &function, args, result, save_as);
            }
            Event::Approval { prompt, answer, .. } => {
                let label = if prompt.trim().is_empty() {
                    "Proceed?".to_string()
                } else {
                    prompt.clone()
                };
                let message = if prompt.trim().is_empty() {
                    "Please confirm".to_string()
                } else {
                    escape_literal(prompt)
                };
                self.steps.push(
                    Step::new(
                        &id,
                        StepKind::PromptUser {
                            message,
                            fields: vec![PromptField {
                                name: "confirm".to_string(),
                                label,
                                field_type: FieldType::Confirm,
                                required: true,
                                default: Some(Value::Bool(*answer)),
                                options: None,
                            }],
                        },
                    )
                    .with_save_as(format!("approval_s{n}")),
                );
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        seq: u64,
        step_id: &str,
        kind: FixtureKind,
        name: &str,
        args: &Map<String, Value>,
        result: &Value,
        save_as: String,
    ) {
        self.fixtures.push(Fixture {
            seq,
            step_id: step_id.to_string(),
            kind,
            name: name.to_string(),
            args: args.clone(),
            result: result.clone(),
        });
        if !result.is_null() {
            self.known.insert(canonical_json(result), save_as);
        }
    }

    /// Replace argument values that repeat a known value with a reference.
    ///
    /// Scalars other than strings stay literal: a `2` that happens to equal
    /// an earlier count is far more likely a coincidence than a data flow.
    /// Literal strings are escaped so recorded braces survive resolution.
    fn templatize_args(&self, args: &Map<String, Value>) -> Map<String, Value> {
        args.iter()
            .map(|(k, v)| {
                let aliased = match v {
                    Value::String(s) if !s.is_empty() => true,
                    Value::Array(_) | Value::Object(_) => true,
                    _ => false,
                };
                let value = match self.known.get(&canonical_json(v)) {
                    Some(var) if aliased => reference(var),
                    _ => escape_value(v),
                };
                (k.clone(), value)
            })
            .collect()
    }

    fn output_template(&self, output: &Value) -> Value {
        if output.is_null() {
            return Value::Null;
        }
        if let Some(var) = self.known.get(&canonical_json(output)) {
            return reference(var);
        }
        match output {
            Value::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| {
                        let value = match self.known.get(&canonical_json(v)) {
                            Some(var) if !v.is_null() => reference(var),
                            _ => escape_value(v),
                        };
                        (k.clone(), value)
                    })
                    .collect(),
            ),
            other => escape_value(other),
        }
    }

    fn finish(mut self, trace: &Trace) -> CompiledPackage {
        let final_output = trace.final_output.clone().unwrap_or(Value::Null);
        let return_id = format!("s{}", self.steps.len() + 1);
        let value = self.output_template(&final_output);
        self.steps
            .push(Step::new(return_id, StepKind::Return { value }));

        let name = slugify(&trace.mission.goal);
        let routine = Routine {
            version: ROUTINE_VERSION.to_string(),
            name: name.clone(),
            description: Some(trace.mission.goal.clone()),
            tools: self.tools,
            input_schema: Some(
                trace
                    .mission
                    .input_summary
                    .as_ref()
                    .map(infer_schema)
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            ),
            output_schema: trace.final_output.as_ref().map(infer_schema),
            steps: self.steps,
        };

        let udf_source = render_rhai_stub(&name, &self.manifest);
        CompiledPackage {
            routine,
            udf_manifest: self.manifest,
            udf_source,
            fixtures: FixtureSet::new(self.fixtures),
            input: trace.mission.input_summary.clone(),
            expected_output: trace.final_output.clone(),
        }
    }
}

fn reference(var: &str) -> Value {
    Value::String(format!("{{{{ {var} }}}}"))
}
