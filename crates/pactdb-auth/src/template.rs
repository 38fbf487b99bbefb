//! Schema template evaluation.
//!
//! Role read schemas may contain `{"$eval": "user.slug"}` markers. Any
//! sub-object carrying an `$eval` key is substituted with the value reached
//! by the dotted path in the evaluation context; unresolvable references
//! drop the surrounding key so an incomplete context never widens a schema.

use serde_json::{Map, Value};

/// Evaluate every `$eval` marker in `value` against `context`.
pub fn evaluate(value: &Value, context: &Map<String, Value>) -> Value {
    match resolve(value, context) {
        Some(resolved) => resolved,
        None => Value::Null,
    }
}

fn resolve(value: &Value, context: &Map<String, Value>) -> Option<Value> {
    match value {
        Value::Object(obj) => {
            if let Some(expression) = obj.get("$eval") {
                let path = expression.as_str()?;
                return lookup(path, context).cloned();
            }
            let mut result = Map::new();
            for (key, entry) in obj {
                if let Some(resolved) = resolve(entry, context) {
                    result.insert(key.clone(), resolved);
                }
            }
            Some(Value::Object(result))
        }
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .filter_map(|item| resolve(item, context))
                .collect(),
        )),
        other => Some(other.clone()),
    }
}

/// Follow a dotted path (`user.data.roles`) through the context map.
fn lookup<'a>(path: &str, context: &'a Map<String, Value>) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = context.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Map<String, Value> {
        json!({
            "user": {
                "slug": "user-alice",
                "data": {"roles": ["user-community"]}
            }
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn substitutes_eval_markers() {
        let schema = json!({
            "type": "object",
            "properties": {
                "slug": {"const": {"$eval": "user.slug"}}
            }
        });
        let result = evaluate(&schema, &context());
        assert_eq!(result["properties"]["slug"]["const"], json!("user-alice"));
    }

    #[test]
    fn follows_nested_paths() {
        let schema = json!({"roles": {"$eval": "user.data.roles"}});
        let result = evaluate(&schema, &context());
        assert_eq!(result["roles"], json!(["user-community"]));
    }

    #[test]
    fn unresolvable_references_drop_the_key() {
        let schema = json!({
            "keep": 1,
            "gone": {"$eval": "user.nonexistent.path"}
        });
        let result = evaluate(&schema, &context());
        assert_eq!(result, json!({"keep": 1}));
    }

    #[test]
    fn plain_schemas_pass_through() {
        let schema = json!({"type": "object", "required": ["markers"]});
        assert_eq!(evaluate(&schema, &context()), schema);
    }

    #[test]
    fn arrays_are_walked() {
        let schema = json!({"anyOf": [{"const": {"$eval": "user.slug"}}, {"const": "x"}]});
        let result = evaluate(&schema, &context());
        assert_eq!(result["anyOf"][0]["const"], json!("user-alice"));
        assert_eq!(result["anyOf"][1]["const"], json!("x"));
    }
}
