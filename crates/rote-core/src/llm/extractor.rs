//! LLM-backed happy-path extraction.

use rote_types::llm::{CompletionRequest, LlmError};
use rote_types::trace::Trace;

use super::client::LlmClient;
use super::parsing::{extract_rhai_block, extract_yaml_block, parse_routine_yaml};
use super::prompts::COMPILE_SYSTEM;
use crate::compiler::happy_path::{ExtractError, ExtractedRoutine, HappyPathExtractor};

/// Asks an LLM for a pruned routine plus implemented Rhai UDFs.
#[derive(Debug)]
pub struct LlmHappyPathExtractor<C: LlmClient> {
    client: C,
    max_tokens: u32,
}

impl<C: LlmClient> LlmHappyPathExtractor<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            max_tokens: 4096,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

impl<C: LlmClient> HappyPathExtractor for LlmHappyPathExtractor<C> {
    async fn extract(&self, trace: &Trace) -> Result<ExtractedRoutine, ExtractError> {
        let trace_json =
            serde_json::to_string_pretty(trace).map_err(|e| ExtractError::Request(e.to_string()))?;
        let request = CompletionRequest::new(format!(
            "Compile this agent trace into a routine:\n\n{trace_json}"
        ))
        .with_system(COMPILE_SYSTEM)
        .with_max_tokens(self.max_tokens);

        tracing::info!(provider = self.client.name(), events = trace.events.len(), "requesting happy-path extraction");
        let response = self.client.complete(&request).await.map_err(|e| match e {
            LlmError::NotConfigured(m) => ExtractError::Unavailable(m),
            other => ExtractError::Request(other.to_string()),
        })?;
        tracing::debug!(model = %response.model, output_tokens = response.usage.output_tokens, "extraction response received");

        let yaml = extract_yaml_block(&response.text).map_err(ExtractError::Parse)?;
        let routine = parse_routine_yaml(&yaml).map_err(ExtractError::Parse)?;
        // A routine without UDF calls needs no module.
        let udf_source = if routine.udf_functions().is_empty() {
            extract_rhai_block(&response.text).unwrap_or_default()
        } else {
            extract_rhai_block(&response.text).map_err(ExtractError::Parse)?
        };

        Ok(ExtractedRoutine {
            routine,
            udf_source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile, compile_with, parse_trace};
    use rote_types::llm::CompletionResponse;

    struct ScriptedClient(Result<String, LlmError>);

    impl LlmClient for ScriptedClient {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.0.clone().map(|text| CompletionResponse {
                text,
                model: "test-model".into(),
                usage: Default::default(),
            })
        }
    }

    const TRACE: &str = r#"{
        "app": {"name": "agent"},
        "mission": {"goal": "Count rows", "input_summary": {"url": "fixture://demo.csv"}},
        "events": [
            {"type": "tool_call", "seq": 1, "tool": "fetch_csv", "args": {"url": "fixture://demo.csv"}, "result": "a\n1"},
            {"type": "tool_call", "seq": 2, "tool": "fetch_csv", "args": {"url": "fixture://demo.csv"}, "result": "a\n1"},
            {"type": "udf_call", "seq": 3, "function": "count_rows", "args": {"raw": "a\n1"}, "result": 1}
        ],
        "final_output": 1
    }"#;

    const GOOD: &str = "```yaml
version: \"1\"
name: count_rows
tools:
  fetch_csv:
    description: fetch
input_schema:
  type: object
  properties:
    url: {type: string}
steps:
  - id: fetch
    type: tool.call
    tool: fetch_csv
    args: {url: \"{{ url }}\"}
    save_as: raw
  - id: count
    type: udf.call
    function: count_rows
    args: {raw: \"{{ raw }}\"}
    save_as: n
  - id: done
    type: return
    value: \"{{ n }}\"
```

```rhai
fn count_rows(raw) {
    raw.split(\"\\n\").len() - 1
}
```
";

    #[tokio::test]
    async fn test_llm_extraction_used_when_valid() {
        let trace = parse_trace(TRACE).unwrap();
        let extractor = LlmHappyPathExtractor::new(ScriptedClient(Ok(GOOD.to_string())));
        let package = compile_with(&trace, &extractor).await.unwrap();
        assert_eq!(package.routine.steps.len(), 3);
        assert_eq!(package.routine.steps[0].id, "fetch");
        assert!(package.udf_source.contains("fn count_rows(raw)"));
        assert!(package.udf_manifest.get("count_rows").unwrap().implemented);
    }

    #[tokio::test]
    async fn test_provider_error_falls_back() {
        let trace = parse_trace(TRACE).unwrap();
        let extractor = LlmHappyPathExtractor::new(ScriptedClient(Err(LlmError::RateLimited)));
        let package = compile_with(&trace, &extractor).await.unwrap();
        assert_eq!(package.routine, compile(&trace).unwrap().routine);
    }

    #[tokio::test]
    async fn test_unparseable_response_falls_back() {
        let trace = parse_trace(TRACE).unwrap();
        let extractor = LlmHappyPathExtractor::new(ScriptedClient(Ok("I cannot help".into())));
        let err = extractor.extract(&trace).await.unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));

        let package = compile_with(&trace, &extractor).await.unwrap();
        assert_eq!(package.routine.steps.len(), 4);
    }
}
