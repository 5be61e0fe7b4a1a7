//! Configuration merge logic
//!
//! - Objects: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use serde_json::Value;

/// Deep merge two JSON values.
///
/// Objects merge recursively; arrays, scalars and null in `overlay` replace
/// whatever `base` holds.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_override_keeps_siblings() {
        let base = json!({"keys": {"region": "DE", "window_hours": 1}});
        let overlay = json!({"keys": {"window_hours": 24}});
        let result = deep_merge(base, overlay);

        assert_eq!(result["keys"]["window_hours"], 24);
        assert_eq!(result["keys"]["region"], "DE");
    }

    #[test]
    fn test_allow_list_replaced_not_concatenated() {
        let base = json!({"ccl": {"allow_list": ["CCL-DE-0001", "CCL-DE-0002"]}});
        let overlay = json!({"ccl": {"allow_list": ["CCL-AT-0001"]}});
        let result = deep_merge(base, overlay);

        assert_eq!(result["ccl"]["allow_list"], json!(["CCL-AT-0001"]));
    }

    #[test]
    fn test_scalar_replaces_object() {
        let result = deep_merge(json!({"signing": {"enabled": true}}), json!({"signing": false}));
        assert_eq!(result["signing"], json!(false));
    }

    #[test]
    fn test_merge_layers_precedence() {
        let layers = vec![
            json!({"retention": {"retention_days": 14}, "root_directory": "v1"}),
            json!({"retention": {"retention_days": 10}}),
            json!({"retention": {"retention_days": 7}}),
        ];
        let result = merge_layers(layers);

        assert_eq!(result["retention"]["retention_days"], 7);
        assert_eq!(result["root_directory"], "v1");
    }
}
