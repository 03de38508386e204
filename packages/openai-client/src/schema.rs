//! Type-safe schema generation for OpenAI structured outputs.
//!
//! Uses the `schemars` crate to generate JSON schemas from Rust types, then
//! rewrites them into the shape OpenAI's strict mode accepts:
//!
//! 1. `additionalProperties: false` on every object schema
//! 2. every property listed in `required`, including nullable ones
//! 3. no `$ref` references (everything inlined)

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

/// Trait for types that can be used as OpenAI structured output.
///
/// Automatically implemented for any type that implements
/// `JsonSchema + DeserializeOwned`.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// Generate an OpenAI-compatible JSON schema for this type.
    fn openai_schema() -> serde_json::Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        tighten_objects(&mut value);

        let definitions = value
            .as_object()
            .and_then(|map| map.get("definitions"))
            .cloned();
        if let Some(defs) = definitions {
            resolve_refs(&mut value, &defs);
        }

        if let serde_json::Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        value
    }

    /// Get the schema name for this type.
    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

/// Walk the schema and make every object strict: no additional properties,
/// and all declared properties required (OpenAI rejects optional ones).
fn tighten_objects(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if map.get("type") == Some(&serde_json::Value::String("object".to_string())) {
                map.insert(
                    "additionalProperties".to_string(),
                    serde_json::Value::Bool(false),
                );
                if let Some(serde_json::Value::Object(props)) = map.get("properties") {
                    let all_keys: Vec<serde_json::Value> = props
                        .keys()
                        .map(|k| serde_json::Value::String(k.clone()))
                        .collect();
                    map.insert("required".to_string(), serde_json::Value::Array(all_keys));
                }
            }
            for (_, v) in map.iter_mut() {
                tighten_objects(v);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                tighten_objects(item);
            }
        }
        _ => {}
    }
}

/// Replace `#/definitions/...` refs with the inlined definition. OpenAI's
/// strict mode does not traverse refs.
fn resolve_refs(value: &mut serde_json::Value, definitions: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(ref_path)) = map.get("$ref").cloned() {
                if let Some(name) = ref_path.strip_prefix("#/definitions/") {
                    if let Some(def) = definitions.get(name) {
                        *value = def.clone();
                        resolve_refs(value, definitions);
                        return;
                    }
                }
            }
            for (_, v) in map.iter_mut() {
                resolve_refs(v, definitions);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                resolve_refs(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct Scene {
        description: String,
        duration_seconds: Option<f32>,
    }

    #[derive(Deserialize, JsonSchema)]
    struct Outline {
        hook: String,
        scenes: Vec<Scene>,
    }

    #[test]
    fn objects_forbid_additional_properties() {
        let schema = Outline::openai_schema();
        let schema_str = serde_json::to_string(&schema).unwrap();
        assert!(schema_str.contains("additionalProperties"));
    }

    #[test]
    fn optional_fields_are_still_required() {
        let schema = Scene::openai_schema();
        let required = schema
            .get("required")
            .expect("should have required array")
            .as_array()
            .unwrap();
        let names: Vec<&str> = required.iter().filter_map(|v| v.as_str()).collect();
        assert!(names.contains(&"description"));
        assert!(names.contains(&"duration_seconds"));
    }

    #[test]
    fn nested_types_are_inlined() {
        let schema = Outline::openai_schema();
        let obj = schema.as_object().unwrap();

        assert!(!obj.contains_key("definitions"), "refs should be inlined");
        assert!(!obj.contains_key("$schema"));

        let schema_str = serde_json::to_string(&schema).unwrap();
        assert!(!schema_str.contains("$ref"), "no refs may remain");
    }
}
