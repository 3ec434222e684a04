//! The deep-merge rule every staged-document PATCH applies, per spec.md
//! §4.7: "null clears, objects recurse, arrays replace."

use serde_json::Value as Json;

/// Merge `patch` into `base` in place, per the rule above. A top-level
/// `patch` of `Json::Null` clears `base` entirely — callers normally
/// apply this only to nested values reached through an object key, where
/// the key itself is removed instead (see the `Object` arm), but the
/// function is total for any input.
pub fn deep_merge(base: &mut Json, patch: &Json) {
    match patch {
        Json::Null => *base = Json::Null,
        Json::Object(patch_map) => {
            if !base.is_object() {
                *base = Json::Object(serde_json::Map::new());
            }
            let base_map = base.as_object_mut().expect("just coerced to object");
            for (key, value) in patch_map {
                if value.is_null() {
                    base_map.remove(key);
                } else {
                    let entry = base_map.entry(key.clone()).or_insert(Json::Null);
                    deep_merge(entry, value);
                }
            }
        }
        // Arrays, strings, numbers and booleans all replace wholesale.
        // This also covers the literal string `"auto"`: it replaces like
        // any other scalar and is never specially interpreted here — only
        // the activation scheduler's auto-resolver interprets it.
        other => *base = other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_recurse() {
        let mut base = json!({"a": {"x": 1, "y": 2}, "b": 3});
        let patch = json!({"a": {"x": 10}});
        deep_merge(&mut base, &patch);
        assert_eq!(base, json!({"a": {"x": 10, "y": 2}, "b": 3}));
    }

    #[test]
    fn null_clears_a_key() {
        let mut base = json!({"a": 1, "b": 2});
        let patch = json!({"a": null});
        deep_merge(&mut base, &patch);
        assert_eq!(base, json!({"b": 2}));
    }

    #[test]
    fn arrays_replace_rather_than_merge_elementwise() {
        let mut base = json!({"transport_params": [{"rtp_enabled": true}, {"rtp_enabled": false}]});
        let patch = json!({"transport_params": [{"rtp_enabled": false}]});
        deep_merge(&mut base, &patch);
        assert_eq!(base, json!({"transport_params": [{"rtp_enabled": false}]}));
    }

    #[test]
    fn auto_literal_passes_through_unresolved() {
        let mut base = json!({"destination_ip": "239.0.0.1"});
        let patch = json!({"destination_ip": "auto"});
        deep_merge(&mut base, &patch);
        assert_eq!(base["destination_ip"], json!("auto"));
    }
}
