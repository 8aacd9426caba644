//! Secret `ref://` references.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::error::SecretError;

use super::{rewrite_strings, visit_strings};

/// Prefix marking a secret reference.
pub const SECRET_REF_PREFIX: &str = "ref://";

/// A parsed secret reference `ref://<name>[/<property>][?version=<v>]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretRef {
    /// Secret name.
    pub name: String,
    /// Property inside the secret payload.
    pub property: Option<String>,
    /// Pinned secret version.
    pub version: Option<String>,
}

/// Backend that resolves secret references.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches the payload of secret `name` at `version` (latest if `None`).
    async fn get_secret(&self, name: &str, version: Option<&str>) -> Result<Value, SecretError>;
}

/// In-memory secret store keyed by secret name.
#[derive(Debug, Default, Clone)]
pub struct MemorySecretStore {
    secrets: HashMap<String, Value>,
}

impl SecretRef {
    /// Parses `raw` if it is a secret reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference has no secret name.
    pub fn parse(raw: &str) -> Result<Option<Self>, SecretError> {
        let Some(body) = raw.strip_prefix(SECRET_REF_PREFIX) else {
            return Ok(None);
        };

        let (path, query) = body.split_once('?').unwrap_or((body, ""));
        let (name, property) = match path.split_once('/') {
            Some((name, property)) if !property.is_empty() => (name, Some(property.to_string())),
            Some((name, _)) => (name, None),
            None => (path, None),
        };

        if name.is_empty() {
            return Err(SecretError::Malformed {
                reference: raw.to_string(),
            });
        }

        let version = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == "version")
            .map(|(_, v)| v.to_string())
            .filter(|v| !v.is_empty());

        Ok(Some(Self {
            name: name.to_string(),
            property,
            version,
        }))
    }

    /// Extracts the referenced value from a secret payload.
    fn select(&self, payload: Value) -> Result<Value, SecretError> {
        let Some(property) = &self.property else {
            return Ok(payload);
        };

        let selected = match payload {
            Value::Object(mut map) => map.remove(property),
            Value::String(raw) => serde_json::from_str::<serde_json::Map<String, Value>>(&raw)
                .ok()
                .and_then(|mut map| map.remove(property)),
            _ => None,
        };
        selected.ok_or_else(|| SecretError::PropertyNotFound {
            name: self.name.clone(),
            property: property.clone(),
        })
    }
}

impl MemorySecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a secret.
    #[must_use]
    pub fn with_secret(mut self, name: impl Into<String>, payload: Value) -> Self {
        self.secrets.insert(name.into(), payload);
        self
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, name: &str, _version: Option<&str>) -> Result<Value, SecretError> {
        self.secrets.get(name).cloned().ok_or_else(|| SecretError::NotFound {
            name: name.to_string(),
        })
    }
}

/// Collects the distinct secret references in `attributes`.
///
/// # Errors
///
/// Returns an error if a reference is malformed.
pub fn collect_secret_refs(attributes: &Value) -> Result<Vec<SecretRef>, SecretError> {
    let mut refs: Vec<SecretRef> = Vec::new();
    visit_strings::<SecretError>(attributes, &mut |leaf| {
        if let Some(reference) = SecretRef::parse(leaf)?
            && !refs.contains(&reference)
        {
            refs.push(reference);
        }
        Ok(())
    })?;
    Ok(refs)
}

/// Replaces every secret reference in `attributes` with its resolved value.
///
/// # Errors
///
/// Returns an error if a reference is malformed or cannot be resolved.
pub async fn replace_secret_refs(attributes: &Value, store: &dyn SecretStore) -> Result<Value, SecretError> {
    let refs = collect_secret_refs(attributes)?;
    if refs.is_empty() {
        return Ok(attributes.clone());
    }

    let mut resolved: HashMap<SecretRef, Value> = HashMap::with_capacity(refs.len());
    for reference in refs {
        debug!("Resolving secret reference: {}", reference.name);
        let payload = store
            .get_secret(&reference.name, reference.version.as_deref())
            .await?;
        let value = reference.select(payload)?;
        resolved.insert(reference, value);
    }

    rewrite_strings(attributes, &mut |leaf| {
        Ok(SecretRef::parse(leaf)?.and_then(|reference| resolved.get(&reference).cloned()))
    })
}
