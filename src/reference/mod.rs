//! Reference discovery and substitution inside resource attribute trees.
//!
//! Two kinds of string leaves are recognised:
//!
//! - implicit references `$kusion_path.<key>.<attr>...`, which are graph
//!   dependencies resolved against already-reconciled resources;
//! - secret references `ref://<name>/<property>?version=<v>`, which are
//!   resolved through a [`SecretStore`] and never create graph edges.

mod implicit;
mod secret;

use serde_json::Value;

pub use implicit::{
    collect_implicit_refs, dependency_keys, resolve_implicit_refs, ImplicitRef,
    IMPLICIT_REF_PREFIX,
};
pub use secret::{
    collect_secret_refs, replace_secret_refs, MemorySecretStore, SecretRef, SecretStore,
    SECRET_REF_PREFIX,
};

/// Visits every string leaf of `value` in document order.
pub(crate) fn visit_strings<E>(
    value: &Value,
    visit: &mut impl FnMut(&str) -> Result<(), E>,
) -> Result<(), E> {
    match value {
        Value::String(s) => visit(s),
        Value::Array(items) => items.iter().try_for_each(|item| visit_strings(item, visit)),
        Value::Object(map) => map.values().try_for_each(|item| visit_strings(item, visit)),
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
    }
}

/// Rebuilds `value`, replacing each string leaf for which `rewrite` returns a value.
pub(crate) fn rewrite_strings<E>(
    value: &Value,
    rewrite: &mut impl FnMut(&str) -> Result<Option<Value>, E>,
) -> Result<Value, E> {
    match value {
        Value::String(s) => Ok(rewrite(s)?.unwrap_or_else(|| value.clone())),
        Value::Array(items) => items
            .iter()
            .map(|item| rewrite_strings(item, rewrite))
            .collect::<Result<Vec<_>, E>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut rebuilt = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                rebuilt.insert(key.clone(), rewrite_strings(item, rewrite)?);
            }
            Ok(Value::Object(rebuilt))
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_visit_strings_reaches_nested_leaves() {
        let value = json!({"a": ["x", {"b": "y"}], "c": 1, "d": null});
        let mut seen = Vec::new();

        visit_strings::<()>(&value, &mut |s| {
            seen.push(s.to_string());
            Ok(())
        })
        .unwrap();

        seen.sort();
        assert_eq!(seen, vec!["x", "y"]);
    }

    #[test]
    fn test_rewrite_strings_keeps_untouched_values() {
        let value = json!({"a": ["x", 2], "b": "y"});

        let rewritten = rewrite_strings::<()>(&value, &mut |s| {
            Ok((s == "x").then(|| json!(42)))
        })
        .unwrap();

        assert_eq!(rewritten, json!({"a": [42, 2], "b": "y"}));
    }
}
