//! Implicit `$kusion_path` references.

use serde_json::Value;
use std::collections::HashSet;

use crate::error::GraphError;
use crate::model::{Resource, ResourceIndex};

use super::{rewrite_strings, visit_strings};

/// Prefix marking an implicit reference. Wire-significant.
pub const IMPLICIT_REF_PREFIX: &str = "$kusion_path.";

/// A parsed implicit reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplicitRef {
    /// Key of the referenced resource.
    pub key: String,
    /// Attribute path inside the referenced resource.
    pub path: Vec<String>,
}

impl ImplicitRef {
    /// Parses `raw` if it is an implicit reference.
    ///
    /// Resource keys may themselves contain dots, so the longest dotted
    /// prefix accepted by `is_known` is taken as the key. When no prefix is
    /// known the first segment is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference names no resource key.
    pub fn parse(raw: &str, is_known: impl Fn(&str) -> bool) -> Result<Option<Self>, GraphError> {
        let Some(body) = raw.strip_prefix(IMPLICIT_REF_PREFIX) else {
            return Ok(None);
        };

        let segments: Vec<&str> = body.split('.').collect();
        if segments.first().is_none_or(|s| s.is_empty()) {
            return Err(GraphError::UnresolvedReference {
                reference: raw.to_string(),
                reason: String::from("missing resource key"),
            });
        }

        let key_len = (1..=segments.len())
            .rev()
            .find(|&n| is_known(&segments[..n].join(".")))
            .unwrap_or(1);

        Ok(Some(Self {
            key: segments[..key_len].join("."),
            path: segments[key_len..].iter().map(|s| (*s).to_string()).collect(),
        }))
    }

    /// Looks up the referenced value inside `attributes`.
    fn lookup<'a>(&self, attributes: &'a Value) -> Option<&'a Value> {
        self.path.iter().try_fold(attributes, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }
}

/// Collects the keys referenced implicitly by `attributes`, deduplicated in
/// first-seen order.
///
/// # Errors
///
/// Returns an error if a reference is malformed.
pub fn collect_implicit_refs(
    attributes: &Value,
    known: &HashSet<&str>,
) -> Result<Vec<String>, GraphError> {
    let mut keys: Vec<String> = Vec::new();
    visit_strings::<GraphError>(attributes, &mut |leaf| {
        if let Some(reference) = ImplicitRef::parse(leaf, |k| known.contains(k))?
            && !keys.contains(&reference.key)
        {
            keys.push(reference.key);
        }
        Ok(())
    })?;
    Ok(keys)
}

/// Returns the explicit and implicit dependency keys of `resource`, merged and
/// deduplicated with explicit keys first.
///
/// # Errors
///
/// Returns an error if an implicit reference is malformed.
pub fn dependency_keys(resource: &Resource, known: &HashSet<&str>) -> Result<Vec<String>, GraphError> {
    let mut keys: Vec<String> = Vec::with_capacity(resource.depends_on.len());
    for key in &resource.depends_on {
        if !keys.contains(key) {
            keys.push(key.clone());
        }
    }
    for key in collect_implicit_refs(&resource.attributes, known)? {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    Ok(keys)
}

/// Replaces every implicit reference in `attributes` with the value it points
/// to in `index`. Returns the referenced keys and the rewritten tree.
///
/// # Errors
///
/// Returns an error if a referenced resource is missing, deleted, or lacks
/// the referenced attribute path.
pub fn resolve_implicit_refs(
    attributes: &Value,
    index: &ResourceIndex,
) -> Result<(Vec<String>, Value), GraphError> {
    let mut keys: Vec<String> = Vec::new();
    let rewritten = rewrite_strings(attributes, &mut |leaf| {
        let Some(reference) = ImplicitRef::parse(leaf, |k| index.contains_key(k))? else {
            return Ok(None);
        };

        let unresolved = |reason: String| GraphError::UnresolvedReference {
            reference: leaf.to_string(),
            reason,
        };

        let resource = match index.get(&reference.key) {
            Some(Some(resource)) => resource,
            Some(None) => return Err(unresolved(format!("resource '{}' was deleted", reference.key))),
            None => return Err(unresolved(format!("resource '{}' not found", reference.key))),
        };

        let value = reference.lookup(&resource.attributes).ok_or_else(|| {
            unresolved(format!(
                "attribute path '{}' not found in resource '{}'",
                reference.path.join("."),
                reference.key
            ))
        })?;

        if !keys.contains(&reference.key) {
            keys.push(reference.key.clone());
        }
        Ok(Some(value.clone()))
    })?;

    Ok((keys, rewritten))
}
