//! Parse LLM responses: fenced code blocks and recovery strategies.

use serde_json::Value;

use rote_types::routine::Routine;

use crate::runtime::recovery::RecoveryAction;

/// Body of the first fenced block whose info string is one of `languages`.
pub fn extract_fenced_block(text: &str, languages: &[&str]) -> Option<String> {
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let line_end = after.find('\n')?;
        let info = after[..line_end].trim().to_ascii_lowercase();
        let body = &after[line_end + 1..];
        let close = body.find("```")?;
        if languages.iter().any(|l| *l == info) {
            return Some(body[..close].trim().to_string());
        }
        rest = &body[close + 3..];
    }
    None
}

pub fn extract_yaml_block(text: &str) -> Result<String, String> {
    extract_fenced_block(text, &["yaml", "yml"])
        .ok_or_else(|| "no ```yaml block in response".to_string())
}

pub fn extract_rhai_block(text: &str) -> Result<String, String> {
    extract_fenced_block(text, &["rhai"]).ok_or_else(|| "no ```rhai block in response".to_string())
}

pub fn parse_routine_yaml(yaml: &str) -> Result<Routine, String> {
    let value: serde_yaml_ng::Value =
        serde_yaml_ng::from_str(yaml).map_err(|e| format!("invalid YAML: {e}"))?;
    if !value.is_mapping() {
        return Err("routine YAML must be a mapping".to_string());
    }
    serde_yaml_ng::from_value(value).map_err(|e| format!("not a routine: {e}"))
}

/// Parse a `{"strategy": ...}` answer, raw or inside a ```json block.
pub fn parse_recovery_action(text: &str) -> Result<RecoveryAction, String> {
    let raw = extract_fenced_block(text, &["json"]).unwrap_or_else(|| text.trim().to_string());
    let value: Value =
        serde_json::from_str(&raw).map_err(|e| format!("invalid JSON in recovery response: {e}"))?;
    let Value::Object(mut obj) = value else {
        return Err("recovery response must be a JSON object".to_string());
    };

    match obj.get("strategy").and_then(Value::as_str) {
        Some("modify_args") => match obj.remove("new_args") {
            Some(Value::Object(args)) => Ok(RecoveryAction::ModifyArgs(args)),
            _ => Err("modify_args requires a new_args object".to_string()),
        },
        Some("skip") => Ok(RecoveryAction::Skip(
            obj.remove("default_value").unwrap_or(Value::Null),
        )),
        Some("fail") => Ok(RecoveryAction::Fail),
        Some(other) => Err(format!(
            "unknown strategy '{other}', expected modify_args, skip or fail"
        )),
        None => Err("recovery response has no strategy".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RESPONSE: &str = "Here you go.\n\n```yaml\nversion: \"1\"\nname: demo\nsteps:\n  - id: done\n    type: return\n    value: 1\n```\n\n```rhai\nfn f(x) { x }\n```\n";

    #[test]
    fn test_extract_blocks() {
        let yaml = extract_yaml_block(RESPONSE).unwrap();
        assert!(yaml.starts_with("version"));
        assert_eq!(extract_rhai_block(RESPONSE).unwrap(), "fn f(x) { x }");
        assert!(extract_fenced_block(RESPONSE, &["python"]).is_none());
    }

    #[test]
    fn test_skips_unrelated_blocks() {
        let text = "```text\nnot it\n```\n```json\n{\"a\": 1}\n```";
        assert_eq!(extract_fenced_block(text, &["json"]).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_routine_yaml() {
        let routine = parse_routine_yaml(&extract_yaml_block(RESPONSE).unwrap()).unwrap();
        assert_eq!(routine.name, "demo");
        assert_eq!(routine.steps.len(), 1);
        assert!(parse_routine_yaml("- just\n- a list").is_err());
    }

    #[test]
    fn test_parse_recovery_strategies() {
        assert_eq!(
            parse_recovery_action(r#"{"strategy": "modify_args", "new_args": {"url": "x"}}"#).unwrap(),
            RecoveryAction::ModifyArgs(json!({"url": "x"}).as_object().cloned().unwrap())
        );
        assert_eq!(
            parse_recovery_action("```json\n{\"strategy\": \"skip\", \"default_value\": []}\n```").unwrap(),
            RecoveryAction::Skip(json!([]))
        );
        assert_eq!(
            parse_recovery_action(r#"{"strategy": "skip"}"#).unwrap(),
            RecoveryAction::Skip(Value::Null)
        );
        assert_eq!(
            parse_recovery_action(r#"{"strategy": "fail"}"#).unwrap(),
            RecoveryAction::Fail
        );
    }

    #[test]
    fn test_parse_recovery_rejects_bad_answers() {
        assert!(parse_recovery_action("sure, retry it").is_err());
        assert!(parse_recovery_action(r#"{"strategy": "explode"}"#).is_err());
        assert!(parse_recovery_action(r#"{"strategy": "modify_args"}"#).is_err());
        assert!(parse_recovery_action("[1]").is_err());
    }
}
