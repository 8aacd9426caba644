//! Attribute comparison for drift detection.
//!
//! Paths are dotted (`spec.template.metadata`). A numeric segment indexes an
//! array and `*` matches every key or element at its level.

use serde::Serialize;
use serde_json::Value;

/// How a single field changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldChange {
    /// Present only in the new value.
    Added,
    /// Present only in the old value.
    Removed,
    /// Present in both with different content.
    Modified,
}

/// A difference at one attribute path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    /// Dotted path of the field.
    pub path: String,
    /// Kind of change.
    pub change: FieldChange,
    /// Old value.
    pub old: Option<Value>,
    /// New value.
    pub new: Option<Value>,
}

/// Returns `value` without the fields named by `paths`.
///
/// Every path is matched against the original tree, so removing one array
/// element never shifts the index another path refers to.
#[must_use]
pub fn strip_ignored(value: &Value, paths: &[String]) -> Value {
    let patterns: Vec<Vec<&str>> = paths
        .iter()
        .map(|path| path.split('.').filter(|s| !s.is_empty()).collect::<Vec<_>>())
        .filter(|segments| !segments.is_empty())
        .collect();
    let patterns: Vec<&[&str]> = patterns.iter().map(Vec::as_slice).collect();
    strip(value, &patterns)
}

fn strip(value: &Value, patterns: &[&[&str]]) -> Value {
    if patterns.is_empty() {
        return value.clone();
    }

    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter_map(|(key, child)| strip_child(key, child, patterns).map(|v| (key.clone(), v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .filter_map(|(i, child)| strip_child(&i.to_string(), child, patterns))
                .collect(),
        ),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
    }
}

/// Strips `child`, stored under `key`. Returns `None` when a pattern ends on it.
fn strip_child<'a>(key: &str, child: &Value, patterns: &[&'a [&'a str]]) -> Option<Value> {
    let mut nested: Vec<&'a [&'a str]> = Vec::new();
    for &pattern in patterns {
        if let Some((head, rest)) = pattern.split_first()
            && (*head == "*" || *head == key)
        {
            if rest.is_empty() {
                return None;
            }
            nested.push(rest);
        }
    }
    Some(strip(child, &nested))
}

/// Lists the differences between two attribute trees, sorted by path.
///
/// Objects are compared key by key; arrays and scalars are compared whole.
#[must_use]
pub fn diff_values(old: &Value, new: &Value) -> Vec<FieldDiff> {
    let mut diffs = Vec::new();
    collect_diffs("", old, new, &mut diffs);
    diffs.sort_by(|a, b| a.path.cmp(&b.path));
    diffs
}

fn collect_diffs(prefix: &str, old: &Value, new: &Value, out: &mut Vec<FieldDiff>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, old_child) in a {
                let path = join(prefix, key);
                match b.get(key) {
                    Some(new_child) => collect_diffs(&path, old_child, new_child, out),
                    None => out.push(FieldDiff {
                        path,
                        change: FieldChange::Removed,
                        old: Some(old_child.clone()),
                        new: None,
                    }),
                }
            }
            for (key, new_child) in b {
                if !a.contains_key(key) {
                    out.push(FieldDiff {
                        path: join(prefix, key),
                        change: FieldChange::Added,
                        old: None,
                        new: Some(new_child.clone()),
                    });
                }
            }
        }
        _ if old == new => {}
        _ => out.push(FieldDiff {
            path: prefix.to_string(),
            change: FieldChange::Modified,
            old: Some(old.clone()),
            new: Some(new.clone()),
        }),
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

impl std::fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = if self.path.is_empty() { "." } else { &self.path };
        match (&self.old, &self.new) {
            (Some(old), Some(new)) => write!(f, "~ {path}: {old} -> {new}"),
            (None, Some(new)) => write!(f, "+ {path}: {new}"),
            (Some(old), None) => write!(f, "- {path}: {old}"),
            (None, None) => write!(f, "  {path}"),
        }
    }
}
