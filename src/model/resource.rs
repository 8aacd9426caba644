//! Resource and spec types.
//!
//! A [`Resource`] is the unit the engine reconciles. A [`Spec`] is the ordered
//! desired-state collection handed to an operation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Extension key listing attribute paths excluded from drift detection.
pub const IGNORE_FIELDS_EXTENSION: &str = "ignoreFields";

/// Index of resources by key. A `None` entry records a deletion.
pub type ResourceIndex = BTreeMap<String, Option<Resource>>;

/// Runtime family a resource is reconciled through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    /// Kubernetes objects.
    Kubernetes,
    /// Cloud resources managed through Terraform providers.
    Terraform,
}

/// A single managed resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    /// Globally unique key, typically `apiVersion:kind:namespace:name`.
    pub id: String,
    /// Runtime family.
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Arbitrary attribute tree.
    #[serde(default)]
    pub attributes: Value,
    /// Keys of resources that must be reconciled first.
    #[serde(default, rename = "dependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Provider-specific metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

/// Desired state of one reconciliation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Spec {
    /// Resources in declaration order.
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl ResourceType {
    /// Returns the canonical name of the type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Kubernetes => "Kubernetes",
            Self::Terraform => "Terraform",
        }
    }
}

impl Resource {
    /// Creates a resource with no dependencies and no extensions.
    #[must_use]
    pub fn new(id: impl Into<String>, resource_type: ResourceType, attributes: Value) -> Self {
        Self {
            id: id.into(),
            resource_type,
            attributes,
            depends_on: Vec::new(),
            extensions: BTreeMap::new(),
        }
    }

    /// Adds explicit dependencies.
    #[must_use]
    pub fn with_depends_on<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Adds an extension entry.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    /// Returns the resource key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.id
    }

    /// Returns the attribute paths this resource asks to ignore during diffing.
    #[must_use]
    pub fn ignore_fields(&self) -> Vec<String> {
        match self.extensions.get(IGNORE_FIELDS_EXTENSION) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
            Some(Value::String(single)) => vec![single.clone()],
            _ => Vec::new(),
        }
    }
}

impl Spec {
    /// Creates a spec from resources.
    #[must_use]
    pub const fn new(resources: Vec<Resource>) -> Self {
        Self { resources }
    }

    /// Returns true if the spec declares no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Returns the number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Gets a resource by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == key)
    }

    /// Returns the first key that appears more than once.
    #[must_use]
    pub fn first_duplicate(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.resources
            .iter()
            .map(Resource::key)
            .find(|key| !seen.insert(*key))
    }

    /// Returns all resource keys in declaration order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.resources.iter().map(Resource::key).collect()
    }
}

/// Builds an index of resources by key. Later duplicates win.
#[must_use]
pub fn index_resources(resources: &[Resource]) -> BTreeMap<String, Resource> {
    resources
        .iter()
        .map(|r| (r.id.clone(), r.clone()))
        .collect()
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_duplicate() {
        let spec = Spec::new(vec![
            Resource::new("a", ResourceType::Kubernetes, json!({})),
            Resource::new("b", ResourceType::Kubernetes, json!({})),
            Resource::new("a", ResourceType::Terraform, json!({})),
        ]);

        assert_eq!(spec.first_duplicate(), Some("a"));
        assert_eq!(spec.keys(), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_ignore_fields_extension() {
        let resource = Resource::new("a", ResourceType::Kubernetes, json!({}))
            .with_extension(IGNORE_FIELDS_EXTENSION, json!(["metadata.annotations", 3]));

        assert_eq!(resource.ignore_fields(), vec!["metadata.annotations"]);
    }

    #[test]
    fn test_resource_serde_shape() {
        let yaml = r"
id: v1:Service:default:web
type: Kubernetes
attributes:
  spec:
    port: 80
dependsOn:
  - apps/v1:Deployment:default:web
";
        let resource: Resource = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(resource.resource_type, ResourceType::Kubernetes);
        assert_eq!(resource.depends_on, vec!["apps/v1:Deployment:default:web"]);
        assert_eq!(resource.attributes["spec"]["port"], json!(80));
    }
}
