//! YAML ⇄ JSON value conversion.
//!
//! Manifests parse to `serde_yaml::Value`; template contexts and projection
//! formats want `serde_json::Value`. Conversion sorts mapping keys so every
//! serialized view of a merged configuration is deterministic.

use serde_json::Value as Json;
use serde_yaml::Value as Yaml;
use std::collections::BTreeMap;

/// Convert a YAML value to JSON.
///
/// Mapping keys are stringified and sorted; non-string keys (rare in
/// manifests) use their YAML scalar rendering. Tagged values keep only
/// their payload, tags having been consumed by the evaluator by the time
/// conversion happens.
pub fn yaml_to_json(value: &Yaml) -> Json {
    match value {
        Yaml::Null => Json::Null,
        Yaml::Bool(b) => Json::Bool(*b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Json::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Json::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Json::Null, Json::Number)
            }
        }
        Yaml::String(s) => Json::String(s.clone()),
        Yaml::Sequence(seq) => Json::Array(seq.iter().map(yaml_to_json).collect()),
        Yaml::Mapping(map) => {
            let sorted: BTreeMap<String, Json> =
                map.iter().map(|(k, v)| (yaml_key_to_string(k), yaml_to_json(v))).collect();
            Json::Object(sorted.into_iter().collect())
        }
        Yaml::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}

/// Convert a JSON value to YAML.
pub fn json_to_yaml(value: &Json) -> Yaml {
    match value {
        Json::Null => Yaml::Null,
        Json::Bool(b) => Yaml::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Yaml::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Yaml::Number(u.into())
            } else {
                Yaml::Number(n.as_f64().unwrap_or_default().into())
            }
        }
        Json::String(s) => Yaml::String(s.clone()),
        Json::Array(arr) => Yaml::Sequence(arr.iter().map(json_to_yaml).collect()),
        Json::Object(obj) => {
            let mut map = serde_yaml::Mapping::new();
            for (k, v) in obj {
                map.insert(Yaml::String(k.clone()), json_to_yaml(v));
            }
            Yaml::Mapping(map)
        }
    }
}

/// Render a YAML mapping key as a string.
pub fn yaml_key_to_string(key: &Yaml) -> String {
    match key {
        Yaml::String(s) => s.clone(),
        Yaml::Bool(b) => b.to_string(),
        Yaml::Number(n) => n.to_string(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim_end().to_string(),
    }
}
