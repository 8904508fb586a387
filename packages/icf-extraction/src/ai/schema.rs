//! Strict-mode JSON schemas for structured model output.
//!
//! Strict `json_schema` response formats require:
//! 1. `additionalProperties: false` on every object schema
//! 2. every property listed in `required`, nullable ones included
//! 3. no `$ref` references
//!
//! `schemars` output is rewritten to meet all three.

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Types usable as a strict structured-output response.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    fn strict_schema() -> Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        fix_object_schemas(&mut value);
        inline_refs(&mut value);

        if let Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        value
    }

    /// Schema name sent alongside the schema.
    fn structured_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn fix_object_schemas(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type") == Some(&Value::String("object".to_string())) {
                map.insert("additionalProperties".to_string(), Value::Bool(false));

                if let Some(Value::Object(props)) = map.get("properties") {
                    let all_keys: Vec<Value> =
                        props.keys().map(|k| Value::String(k.clone())).collect();
                    map.insert("required".to_string(), Value::Array(all_keys));
                }
            }

            for (_, v) in map.iter_mut() {
                fix_object_schemas(v);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                fix_object_schemas(item);
            }
        }
        _ => {}
    }
}

fn inline_refs(value: &mut Value) {
    let definitions = match value {
        Value::Object(map) => map.get("definitions").cloned(),
        _ => None,
    };

    if let Some(defs) = definitions {
        inline_refs_recursive(value, &defs);
    }
}

fn inline_refs_recursive(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(path)) = map.get("$ref").cloned() {
                if let Some(def) = path
                    .strip_prefix("#/definitions/")
                    .and_then(|name| definitions.get(name))
                {
                    *value = def.clone();
                    inline_refs_recursive(value, definitions);
                    return;
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs_recursive(v, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs_recursive(item, definitions);
            }
        }
        _ => {}
    }
}
