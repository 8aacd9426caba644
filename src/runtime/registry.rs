//! Registry of runtime adapters keyed by resource type.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RuntimeError;
use crate::model::{Resource, ResourceType};

use super::adapter::Runtime;

/// Maps each resource type to the adapter that reconciles it.
#[derive(Clone, Default)]
pub struct RuntimeRegistry {
    runtimes: HashMap<ResourceType, Arc<dyn Runtime>>,
}

impl RuntimeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `runtime` for `resource_type`, replacing any previous one.
    #[must_use]
    pub fn with_runtime(mut self, resource_type: ResourceType, runtime: Arc<dyn Runtime>) -> Self {
        self.runtimes.insert(resource_type, runtime);
        self
    }

    /// Registers `runtime` for `resource_type`.
    pub fn register(&mut self, resource_type: ResourceType, runtime: Arc<dyn Runtime>) {
        self.runtimes.insert(resource_type, runtime);
    }

    /// Gets the runtime for `resource_type`.
    ///
    /// # Errors
    ///
    /// Returns an error if no runtime is registered for the type.
    pub fn get(&self, resource_type: ResourceType) -> Result<Arc<dyn Runtime>, RuntimeError> {
        self.runtimes
            .get(&resource_type)
            .cloned()
            .ok_or_else(|| RuntimeError::Unsupported {
                resource_type: resource_type.to_string(),
            })
    }

    /// Checks that every resource has a registered runtime.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unsupported type.
    pub fn ensure_supported<'a>(
        &self,
        resources: impl IntoIterator<Item = &'a Resource>,
    ) -> Result<(), RuntimeError> {
        resources
            .into_iter()
            .try_for_each(|r| self.get(r.resource_type).map(|_| ()))
    }

    /// Returns the registered resource types.
    #[must_use]
    pub fn types(&self) -> Vec<ResourceType> {
        let mut types: Vec<_> = self.runtimes.keys().copied().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for RuntimeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeRegistry")
            .field("types", &self.types())
            .finish()
    }
}
