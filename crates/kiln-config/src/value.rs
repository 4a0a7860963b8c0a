//! Helpers for loosely-typed configuration values.

use serde_json::Value;

/// Shallow-merge `overlay` into `base`.
///
/// When both sides are objects, the overlay's top-level keys overwrite
/// the base's matching keys and non-overlapping keys from both are
/// kept; nested objects are replaced, not merged. Any non-object
/// overlay replaces the base wholesale.
pub fn shallow_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                base.insert(key, value);
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_disjoint_keys() {
        let mut base = json!({"a": 1});
        shallow_merge(&mut base, json!({"b": 2}));
        assert_eq!(base, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_overlay_wins_on_overlap() {
        let mut base = json!({"a": 1, "b": 2});
        shallow_merge(&mut base, json!({"a": 3}));
        assert_eq!(base, json!({"a": 3, "b": 2}));
    }

    #[test]
    fn test_nested_objects_are_replaced_not_merged() {
        let mut base = json!({"opts": {"x": 1, "y": 2}});
        shallow_merge(&mut base, json!({"opts": {"y": 3}}));
        assert_eq!(base, json!({"opts": {"y": 3}}));
    }

    #[test]
    fn test_non_object_overlay_replaces() {
        let mut base = json!({"a": 1});
        shallow_merge(&mut base, json!(42));
        assert_eq!(base, json!(42));
    }
}
