//! Engine facade.
//!
//! The [`Engine`] owns the collaborators every operation needs and wraps each
//! entry point in a panic boundary. The flows themselves live in
//! [`crate::operation`].

use futures::stream::BoxStream;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::graph::panic_message;
use crate::model::{Release, ReleasePhase};
use crate::operation::{
    ApplyResponse, DestroyResponse, OperationContext, OperationType, PreviewResponse,
    ProgressSender, Request,
};
use crate::reference::SecretStore;
use crate::release::{LocalReleaseStorage, ReleaseManager, ReleaseStorage};
use crate::runtime::{RuntimeRegistry, WatchEvent};
use crate::telemetry::operation_span;

/// Reconciliation engine.
#[derive(Clone)]
pub struct Engine {
    pub(crate) registry: Arc<RuntimeRegistry>,
    pub(crate) releases: ReleaseManager,
    pub(crate) secrets: Option<Arc<dyn SecretStore>>,
    pub(crate) config: EngineConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("releases", &self.releases)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine over `registry` and `storage`.
    #[must_use]
    pub fn new(registry: RuntimeRegistry, storage: Arc<dyn ReleaseStorage>) -> Self {
        Self {
            registry: Arc::new(registry),
            releases: ReleaseManager::new(storage),
            secrets: None,
            config: EngineConfig::default(),
        }
    }

    /// Creates an engine persisting releases under `config.release_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn with_local_storage(registry: RuntimeRegistry, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(LocalReleaseStorage::new(config.release_dir.clone()));
        Ok(Self::new(registry, storage).with_config(config))
    }

    /// Sets the engine tunables.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolves `ref://` values through `secrets`.
    #[must_use]
    pub fn with_secrets(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Returns the release manager.
    #[must_use]
    pub const fn releases(&self) -> &ReleaseManager {
        &self.releases
    }

    /// Returns the engine tunables.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Converges live infrastructure to the spec of `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid, the graph cannot be built,
    /// or a resource node fails. The release is left in the `Failed` phase.
    pub async fn apply(&self, request: &Request, progress: Option<ProgressSender>) -> Result<ApplyResponse> {
        guard(self.run_apply(request, progress)).await
    }

    /// Computes the changes an apply of `request` would make.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid, the graph cannot be built,
    /// or a read fails.
    pub async fn preview(&self, request: &Request, progress: Option<ProgressSender>) -> Result<PreviewResponse> {
        guard(self.run_preview(request, OperationType::ApplyPreview, progress)).await
    }

    /// Computes the changes a destroy of `request` would make.
    ///
    /// # Errors
    ///
    /// Returns an error if the recorded state cannot be loaded or a read fails.
    pub async fn destroy_preview(
        &self,
        request: &Request,
        progress: Option<ProgressSender>,
    ) -> Result<PreviewResponse> {
        guard(self.run_preview(request, OperationType::DestroyPreview, progress)).await
    }

    /// Deletes every resource recorded for `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be loaded or a node fails.
    pub async fn destroy(&self, request: &Request, progress: Option<ProgressSender>) -> Result<DestroyResponse> {
        guard(self.run_destroy(request, progress)).await
    }

    /// Streams changes of every resource in the spec of `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid or a runtime refuses to watch.
    pub async fn watch(&self, request: &Request) -> Result<BoxStream<'static, WatchEvent>> {
        guard(self.run_watch(request)).await
    }

    /// Builds the context of a walk producing `release`.
    pub(crate) fn context(
        &self,
        operation: OperationType,
        release: Release,
        progress: Option<ProgressSender>,
    ) -> OperationContext {
        let span = operation_span(operation, &release.project, &release.workspace, &release.stack);
        let mut ctx = OperationContext::new(operation, release, Arc::clone(&self.registry))
            .with_config(&self.config)
            .with_span(span);
        if !operation.is_preview() {
            ctx = ctx.with_storage(self.releases.storage());
        }
        if let Some(secrets) = &self.secrets {
            ctx = ctx.with_secrets(Arc::clone(secrets));
        }
        if let Some(sender) = progress {
            ctx = ctx.with_progress(sender);
        }
        ctx
    }

    /// Moves the release of a finished walk into its terminal phase.
    pub(crate) async fn finish(ctx: &OperationContext, outcome: &Result<crate::graph::WalkReport>) -> Result<Release> {
        let phase = if outcome.is_ok() {
            ReleasePhase::Succeeded
        } else {
            ReleasePhase::Failed
        };
        if let Err(err) = ctx.set_phase(phase).await {
            error!("Failed to persist release phase {phase}: {err}");
            if outcome.is_ok() {
                return Err(err);
            }
        }
        Ok(ctx.release().await)
    }
}

/// Runs `fut`, turning a panic into an internal error.
async fn guard<T>(fut: impl Future<Output = Result<T>>) -> Result<T> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Operation panicked: {message}");
            Err(EngineError::internal(format!("operation panicked: {message}")))
        }
    }
}
