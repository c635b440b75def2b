//! Structural JSON Schema inference from sample values.
//!
//! Best-effort: every value produces some schema, so inference never fails
//! a compile.

use serde_json::{Map, Value, json};

/// Infer a JSON Schema describing `value`'s shape.
pub fn infer_schema(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut properties = Map::new();
            for (k, v) in map {
                properties.insert(k.clone(), infer_schema(v));
            }
            let required: Vec<Value> = map.keys().cloned().map(Value::String).collect();
            json!({
                "type": "object",
                "properties": properties,
                "required": required,
            })
        }
        Value::Array(items) => match items.first() {
            Some(first) => json!({"type": "array", "items": infer_schema(first)}),
            None => json!({"type": "array"}),
        },
        Value::String(_) => json!({"type": "string"}),
        Value::Number(_) => json!({"type": "number"}),
        Value::Bool(_) => json!({"type": "boolean"}),
        Value::Null => json!({}),
    }
}

/// Schema for a keyword-argument map.
pub fn infer_args_schema(args: &Map<String, Value>) -> Value {
    infer_schema(&Value::Object(args.clone()))
}

/// Property names declared by an object schema.
pub fn schema_properties(schema: &Value) -> Vec<String> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|p| p.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_scalars() {
        assert_eq!(infer_schema(&json!("x")), json!({"type": "string"}));
        assert_eq!(infer_schema(&json!(2)), json!({"type": "number"}));
        assert_eq!(infer_schema(&json!(2.5)), json!({"type": "number"}));
        assert_eq!(infer_schema(&json!(false)), json!({"type": "boolean"}));
        assert_eq!(infer_schema(&json!(null)), json!({}));
    }

    #[test]
    fn test_infer_object_marks_keys_required() {
        let schema = infer_schema(&json!({"url": "fixture://demo.csv", "limit": 10}));
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["url"], json!({"type": "string"}));
        assert_eq!(schema["properties"]["limit"], json!({"type": "number"}));
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 2);
        assert_eq!(schema_properties(&schema).len(), 2);
    }

    #[test]
    fn test_infer_array_uses_first_element() {
        let schema = infer_schema(&json!([{"a": 1}, "ignored"]));
        assert_eq!(schema["type"], "array");
        assert_eq!(schema["items"]["type"], "object");
        assert_eq!(infer_schema(&json!([])), json!({"type": "array"}));
    }
}
