//! Destroy flow.

use std::sync::Arc;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::error::{GraphError, Result};
use crate::graph::{GraphBuilder, WalkReport};
use crate::model::{Release, ReleasePhase};

use super::change::ChangeOrder;
use super::models::{OperationType, ProgressSender};
use super::request::Request;
use super::walk_graph;

/// Result of a destroy.
#[derive(Debug, Clone, Default)]
pub struct DestroyResponse {
    /// Release produced, `None` when nothing was recorded.
    pub release: Option<Release>,
    /// Deletions made, in completion order.
    pub change_order: ChangeOrder,
    /// Walk statistics.
    pub report: WalkReport,
}

impl Engine {
    pub(crate) async fn run_destroy(
        &self,
        request: &Request,
        progress: Option<ProgressSender>,
    ) -> Result<DestroyResponse> {
        request.validate_target()?;
        let (project, workspace, stack) = (&request.project, &request.workspace, &request.stack);

        let Some(latest) = self.releases.latest_release(project, workspace).await? else {
            warn!("No release recorded for {project}/{workspace}, nothing to destroy");
            return Ok(DestroyResponse::default());
        };

        let graph = match GraphBuilder::new(None, &latest.state.resources).build_destroy() {
            Ok(graph) => graph,
            Err(err @ GraphError::NoResources { .. }) => {
                warn!("{err}");
                return Ok(DestroyResponse::default());
            }
            Err(err) => return Err(err.into()),
        };
        self.registry
            .ensure_supported(graph.resource_nodes().map(|node| &node.resource))?;

        info!(
            "Destroying {} resources of {project}/{workspace}/{stack} as {}",
            graph.node_count() - 1,
            request.operator
        );
        let release = self
            .releases
            .new_release(project, workspace, stack, latest.spec, ReleasePhase::Destroying)
            .await?;
        let ctx = Arc::new(self.context(OperationType::Destroy, release, progress));

        let outcome = walk_graph(Arc::clone(&ctx), &graph).await;
        let release = Self::finish(&ctx, &outcome).await?;
        let report = outcome?;

        info!("Destroy of release {} finished", release.revision);
        Ok(DestroyResponse {
            release: Some(release),
            change_order: ctx.change_order().await,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionType, Resource, ResourceType, Spec};
    use crate::release::{MemoryReleaseStorage, ReleaseStorage};
    use crate::runtime::fake::FakeRuntime;
    use crate::runtime::RuntimeRegistry;
    use serde_json::json;

    fn chain() -> Spec {
        Spec::new(vec![
            Resource::new("vpc", ResourceType::Terraform, json!({})),
            Resource::new("vswitch", ResourceType::Terraform, json!({})).with_depends_on(["vpc"]),
            Resource::new("vsecurity", ResourceType::Terraform, json!({}))
                .with_depends_on(["vswitch"]),
            Resource::new("instance", ResourceType::Terraform, json!({}))
                .with_depends_on(["vsecurity"]),
        ])
    }

    fn engine(runtime: Arc<FakeRuntime>) -> (Engine, Arc<MemoryReleaseStorage>) {
        let storage = Arc::new(MemoryReleaseStorage::new());
        let registry = RuntimeRegistry::new().with_runtime(ResourceType::Terraform, runtime);
        (Engine::new(registry, storage.clone()), storage)
    }

    #[tokio::test]
    async fn test_destroy_deletes_in_reverse_order() {
        let runtime = Arc::new(FakeRuntime::new());
        let (engine, storage) = engine(runtime.clone());
        let request = Request::new("net", "prod", "base").with_spec(chain());
        engine.apply(&request, None).await.unwrap();

        let response = engine.destroy(&request, None).await.unwrap();

        assert_eq!(
            response.change_order.step_keys,
            vec!["instance", "vsecurity", "vswitch", "vpc"]
        );
        assert!(response.change_order.steps().all(|s| s.action == ActionType::Delete));
        let deletes: Vec<String> = runtime
            .mutating_calls()
            .into_iter()
            .filter(|c| c.starts_with("delete:"))
            .collect();
        assert_eq!(
            deletes,
            vec!["delete:instance", "delete:vsecurity", "delete:vswitch", "delete:vpc"]
        );

        let release = response.release.unwrap();
        assert_eq!(release.revision, 2);
        assert_eq!(release.phase, ReleasePhase::Succeeded);
        assert!(release.state.resources.is_empty());
        assert_eq!(release.spec, chain());
        assert_eq!(storage.get("net", "prod", 2).await.unwrap(), release);
    }

    #[tokio::test]
    async fn test_destroy_without_state_is_benign() {
        let runtime = Arc::new(FakeRuntime::new());
        let (engine, storage) = engine(runtime.clone());

        let response = engine
            .destroy(&Request::new("net", "prod", "base"), None)
            .await
            .unwrap();

        assert!(response.release.is_none());
        assert!(runtime.calls().is_empty());
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_destroy_after_destroy_is_benign() {
        let runtime = Arc::new(FakeRuntime::new());
        let (engine, storage) = engine(runtime);
        let request = Request::new("net", "prod", "base").with_spec(chain());
        engine.apply(&request, None).await.unwrap();
        engine.destroy(&request, None).await.unwrap();

        let response = engine.destroy(&request, None).await.unwrap();

        assert!(response.release.is_none());
        assert_eq!(storage.revisions("net", "prod").await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_resource_already_gone_is_not_deleted_again() {
        let runtime = Arc::new(FakeRuntime::new());
        let (engine, _storage) = engine(runtime.clone());
        let spec = Spec::new(vec![Resource::new("vpc", ResourceType::Terraform, json!({}))]);
        let request = Request::new("net", "prod", "base").with_spec(spec);
        engine.apply(&request, None).await.unwrap();

        let gone_runtime = Arc::new(FakeRuntime::new());
        let storage = engine.releases().storage();
        let registry = RuntimeRegistry::new().with_runtime(ResourceType::Terraform, gone_runtime.clone());
        let engine = Engine::new(registry, storage);

        let response = engine.destroy(&request, None).await.unwrap();

        assert!(gone_runtime.mutating_calls().is_empty());
        assert!(response.release.unwrap().state.resources.is_empty());
    }
}
