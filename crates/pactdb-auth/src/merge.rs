//! Schema composition.
//!
//! Two pure operations: a deep merge over JSON-Schema values, and the
//! rewrite that pushes a permission mask into every `$$links` sub-schema of
//! a caller query so that permissions cannot be bypassed through relational
//! joins. Both return new schemas; inputs are never mutated.

use serde_json::{Map, Value};

/// Deep-merge two schemas. Object keys are combined recursively; arrays are
/// concatenated and deduplicated (which unions `required` lists); scalars
/// from the right win.
pub fn deep_merge(left: Value, right: Value) -> Value {
    match (left, right) {
        (Value::Object(mut left), Value::Object(right)) => {
            for (key, right_value) in right {
                match left.remove(&key) {
                    Some(left_value) => {
                        left.insert(key, deep_merge(left_value, right_value));
                    }
                    None => {
                        left.insert(key, right_value);
                    }
                }
            }
            Value::Object(left)
        }
        (Value::Array(mut left), Value::Array(right)) => {
            for item in right {
                if !left.contains(&item) {
                    left.push(item);
                }
            }
            Value::Array(left)
        }
        (_, right) => right,
    }
}

/// Keywords whose sub-schemas are walked when pushing the mask down.
const RECURSED_KEYWORDS: &[&str] = &["allOf", "anyOf", "oneOf", "contains", "items", "not"];

/// Replace every `$$links.<type>` sub-schema in `schema` with the merge of
/// `mask` and the sub-schema, recursively, and recurse through the
/// applicator keywords so no link escapes the mask.
pub fn merge_mask_in_links(schema: &Value, mask: &Value) -> Value {
    let Value::Object(obj) = schema else {
        return schema.clone();
    };
    let mut result = Map::new();
    for (key, value) in obj {
        let rewritten = match key.as_str() {
            "$$links" => {
                let Value::Object(links) = value else {
                    result.insert(key.clone(), value.clone());
                    continue;
                };
                let mut masked = Map::new();
                for (link_type, link_schema) in links {
                    let pushed = merge_mask_in_links(link_schema, mask);
                    masked.insert(link_type.clone(), deep_merge(mask.clone(), pushed));
                }
                Value::Object(masked)
            }
            "properties" => {
                let Value::Object(props) = value else {
                    result.insert(key.clone(), value.clone());
                    continue;
                };
                Value::Object(
                    props
                        .iter()
                        .map(|(name, sub)| (name.clone(), merge_mask_in_links(sub, mask)))
                        .collect(),
                )
            }
            k if RECURSED_KEYWORDS.contains(&k) => match value {
                Value::Array(entries) => Value::Array(
                    entries
                        .iter()
                        .map(|entry| merge_mask_in_links(entry, mask))
                        .collect(),
                ),
                other => merge_mask_in_links(other, mask),
            },
            _ => value.clone(),
        };
        result.insert(key.clone(), rewritten);
    }
    Value::Object(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_combine_recursively() {
        let merged = deep_merge(
            json!({"properties": {"a": {"type": "string"}}}),
            json!({"properties": {"b": {"type": "number"}}}),
        );
        assert_eq!(merged["properties"]["a"]["type"], "string");
        assert_eq!(merged["properties"]["b"]["type"], "number");
    }

    #[test]
    fn required_arrays_union_without_duplicates() {
        let merged = deep_merge(
            json!({"required": ["markers", "slug"]}),
            json!({"required": ["slug", "data"]}),
        );
        assert_eq!(merged["required"], json!(["markers", "slug", "data"]));
    }

    #[test]
    fn scalars_from_the_right_win() {
        let merged = deep_merge(
            json!({"additionalProperties": true}),
            json!({"additionalProperties": false}),
        );
        assert_eq!(merged["additionalProperties"], json!(false));
    }

    #[test]
    fn mask_reaches_every_link() {
        let mask = json!({"type": "object", "required": ["markers"]});
        let caller = json!({
            "type": "object",
            "$$links": {
                "is attached to": {
                    "type": "object",
                    "$$links": {
                        "has attached element": {"type": "object"}
                    }
                }
            }
        });
        let rewritten = merge_mask_in_links(&caller, &mask);
        let outer = &rewritten["$$links"]["is attached to"];
        assert_eq!(outer["required"], json!(["markers"]));
        let inner = &outer["$$links"]["has attached element"];
        assert_eq!(inner["required"], json!(["markers"]));
    }

    #[test]
    fn mask_reaches_links_under_applicators() {
        let mask = json!({"required": ["markers"]});
        let caller = json!({
            "anyOf": [
                {"$$links": {"is owned by": {"type": "object"}}}
            ],
            "properties": {
                "data": {"not": {"$$links": {"is about": {"type": "object"}}}}
            }
        });
        let rewritten = merge_mask_in_links(&caller, &mask);
        assert_eq!(
            rewritten["anyOf"][0]["$$links"]["is owned by"]["required"],
            json!(["markers"])
        );
        assert_eq!(
            rewritten["properties"]["data"]["not"]["$$links"]["is about"]["required"],
            json!(["markers"])
        );
    }

    #[test]
    fn inputs_are_not_mutated() {
        let mask = json!({"required": ["markers"]});
        let caller = json!({"$$links": {"x": {"type": "object"}}});
        let before = caller.clone();
        let _ = merge_mask_in_links(&caller, &mask);
        assert_eq!(caller, before);
    }
}
