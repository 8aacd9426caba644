//! Shared state of one operation.
//!
//! The two mutable indices, the working release and the change order sit
//! behind one async mutex. Everything else is read-only for the walk.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, Span};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::model::{Release, ReleasePhase, Resource, ResourceIndex};
use crate::reference::SecretStore;
use crate::release::ReleaseStorage;
use crate::runtime::RuntimeRegistry;

use super::change::{ChangeOrder, ChangeStep};
use super::models::{OperationType, ProgressSender};

/// Mutable part of an [`OperationContext`].
#[derive(Debug, Clone)]
pub struct SharedState {
    /// Resources reconciled so far in this walk; `None` marks a deletion.
    pub ctx_index: ResourceIndex,
    /// Working index, seeded from the prior state.
    pub state_index: ResourceIndex,
    /// Release being produced.
    pub release: Release,
    /// Decided changes, in completion order.
    pub change_order: ChangeOrder,
}

/// Everything a node executor needs.
pub struct OperationContext {
    /// Operation mode.
    pub operation: OperationType,
    /// Stack the resources belong to.
    pub stack: String,
    /// Resources recorded by the prior release, read-only.
    pub prior_index: BTreeMap<String, Resource>,
    /// Adapters by resource type.
    pub registry: Arc<RuntimeRegistry>,
    /// Where the working release is persisted. Unset for previews.
    pub storage: Option<Arc<dyn ReleaseStorage>>,
    /// Secret backend for `ref://` values.
    pub secrets: Option<Arc<dyn SecretStore>>,
    /// Attribute paths ignored by drift detection on every resource.
    pub ignore_fields: Vec<String>,
    /// Maximum number of concurrently running nodes, zero for unbounded.
    pub max_concurrency: usize,
    /// Progress channel.
    pub progress: Option<ProgressSender>,
    /// Span the walk runs in.
    pub span: Span,
    shared: Mutex<SharedState>,
}

impl std::fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationContext")
            .field("operation", &self.operation)
            .field("stack", &self.stack)
            .field("prior", &self.prior_index.len())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl OperationContext {
    /// Creates a context producing `release`, whose state is the prior state.
    #[must_use]
    pub fn new(operation: OperationType, release: Release, registry: Arc<RuntimeRegistry>) -> Self {
        let prior_index = release.state.index();
        let state_index: ResourceIndex = prior_index
            .iter()
            .map(|(key, resource)| (key.clone(), Some(resource.clone())))
            .collect();

        Self {
            operation,
            stack: release.stack.clone(),
            prior_index,
            registry,
            storage: None,
            secrets: None,
            ignore_fields: Vec::new(),
            max_concurrency: 0,
            progress: None,
            span: Span::current(),
            shared: Mutex::new(SharedState {
                ctx_index: ResourceIndex::new(),
                state_index,
                release,
                change_order: ChangeOrder::new(),
            }),
        }
    }

    /// Persists every published change to `storage`.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn ReleaseStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Resolves `ref://` values through `secrets`.
    #[must_use]
    pub fn with_secrets(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Applies the engine tunables.
    #[must_use]
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.ignore_fields.clone_from(&config.ignore_fields);
        self.max_concurrency = config.max_concurrency;
        self
    }

    /// Reports node progress on `sender`.
    #[must_use]
    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Runs the walk inside `span`.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Returns a copy of the resources reconciled so far.
    pub async fn ctx_snapshot(&self) -> ResourceIndex {
        self.shared.lock().await.ctx_index.clone()
    }

    /// Records the outcome of node `id` and persists the working release.
    ///
    /// `result` is `None` when the resource was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the release cannot be persisted.
    pub async fn publish(&self, id: &str, result: Option<Resource>) -> Result<()> {
        let mut shared = self.shared.lock().await;
        shared.ctx_index.insert(id.to_string(), result.clone());
        shared.state_index.insert(id.to_string(), result);

        let SharedState {
            state_index,
            release,
            ..
        } = &mut *shared;
        release.state.apply_index(state_index);
        release.modified_time = release.state.modified_time;
        debug!("Published {id}, state serial {}", release.state.serial);

        if let Some(storage) = &self.storage {
            storage.update(release).await?;
        }
        Ok(())
    }

    /// Appends a change step.
    pub async fn record_change(&self, step: ChangeStep) {
        self.shared.lock().await.change_order.insert(step);
    }

    /// Moves the working release into `phase` and persists it.
    ///
    /// # Errors
    ///
    /// Returns an error if the release cannot be persisted.
    pub async fn set_phase(&self, phase: ReleasePhase) -> Result<()> {
        let mut shared = self.shared.lock().await;
        shared.release.set_phase(phase);
        if let Some(storage) = &self.storage {
            storage.update(&shared.release).await?;
        }
        Ok(())
    }

    /// Returns a copy of the working release.
    pub async fn release(&self) -> Release {
        self.shared.lock().await.release.clone()
    }

    /// Returns a copy of the change order.
    pub async fn change_order(&self) -> ChangeOrder {
        self.shared.lock().await.change_order.clone()
    }

    /// Returns a copy of the whole mutable state.
    pub async fn snapshot(&self) -> SharedState {
        self.shared.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceType, Spec, State};
    use crate::release::MemoryReleaseStorage;
    use serde_json::json;

    fn release_with(resources: Vec<Resource>) -> Release {
        let mut state = State::new("shop", "dev", "base");
        state.resources = resources;
        Release::new(1, Spec::default(), state, ReleasePhase::Applying)
    }

    #[tokio::test]
    async fn test_publish_updates_indices_and_persists() {
        let storage = Arc::new(MemoryReleaseStorage::new());
        let old = Resource::new("old", ResourceType::Kubernetes, json!({}));
        let release = release_with(vec![old]);
        storage.create(&release).await.unwrap();

        let ctx = OperationContext::new(OperationType::Apply, release, Arc::new(RuntimeRegistry::new()))
            .with_storage(storage.clone());

        let web = Resource::new("web", ResourceType::Kubernetes, json!({"replicas": 1}));
        ctx.publish("web", Some(web)).await.unwrap();
        ctx.publish("old", None).await.unwrap();

        let shared = ctx.snapshot().await;
        assert_eq!(shared.ctx_index.len(), 2);
        assert!(shared.ctx_index["old"].is_none());
        assert_eq!(shared.release.state.serial, 2);
        assert!(shared.release.state.get("web").is_some());
        assert!(shared.release.state.get("old").is_none());

        let stored = storage.get("shop", "dev", 1).await.unwrap();
        assert_eq!(stored.state.serial, 2);
        assert!(ctx.prior_index.contains_key("old"));
    }

    #[tokio::test]
    async fn test_set_phase_persists() {
        let storage = Arc::new(MemoryReleaseStorage::new());
        let release = release_with(Vec::new());
        storage.create(&release).await.unwrap();

        let ctx = OperationContext::new(OperationType::Destroy, release, Arc::new(RuntimeRegistry::new()))
            .with_storage(storage.clone());
        ctx.set_phase(ReleasePhase::Failed).await.unwrap();

        let stored = storage.get("shop", "dev", 1).await.unwrap();
        assert_eq!(stored.phase, ReleasePhase::Failed);
    }
}
