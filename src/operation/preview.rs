//! Preview flows.
//!
//! A preview walks the same graph as the real operation against an in-memory
//! release. Runtimes are only asked to read and to dry-run.

use std::sync::Arc;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::error::{GraphError, Result};
use crate::graph::GraphBuilder;
use crate::model::{Release, ReleasePhase};

use super::change::ChangeOrder;
use super::models::{OperationType, ProgressSender};
use super::request::Request;
use super::walk_graph;

/// Result of a preview.
#[derive(Debug, Clone, Default)]
pub struct PreviewResponse {
    /// Changes the operation would make, in completion order.
    pub change_order: ChangeOrder,
}

impl Engine {
    pub(crate) async fn run_preview(
        &self,
        request: &Request,
        operation: OperationType,
        progress: Option<ProgressSender>,
    ) -> Result<PreviewResponse> {
        request.validate_target()?;
        let (project, workspace, stack) = (&request.project, &request.workspace, &request.stack);
        let prior = self.releases.latest_state(project, workspace, stack).await?;

        let (spec, built) = if operation.is_destroy() {
            let spec = self
                .releases
                .latest_release(project, workspace)
                .await?
                .map(|release| release.spec)
                .unwrap_or_default();
            (spec, GraphBuilder::new(None, &prior.resources).build_destroy())
        } else {
            let spec = request.validate_spec()?;
            (spec.clone(), GraphBuilder::new(Some(spec), &prior.resources).build_apply())
        };

        let graph = match built {
            Ok(graph) => graph,
            Err(err @ GraphError::NoResources { .. }) => {
                warn!("{err}");
                return Ok(PreviewResponse::default());
            }
            Err(err) => return Err(err.into()),
        };
        self.registry
            .ensure_supported(graph.resource_nodes().map(|node| &node.resource))?;

        info!("Previewing {operation} of {project}/{workspace}/{stack}");
        let release = Release::new(0, spec, prior, ReleasePhase::Previewing);
        let ctx = Arc::new(self.context(operation, release, progress));

        walk_graph(Arc::clone(&ctx), &graph).await?;

        Ok(PreviewResponse {
            change_order: ctx.change_order().await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionType, Resource, ResourceType, Spec};
    use crate::release::{MemoryReleaseStorage, ReleaseStorage};
    use crate::runtime::fake::FakeRuntime;
    use crate::runtime::{MockRuntime, RuntimeRegistry};
    use serde_json::json;

    fn spec(replicas: u64) -> Spec {
        Spec::new(vec![
            Resource::new("ns", ResourceType::Kubernetes, json!({"name": "shop"})),
            Resource::new("web", ResourceType::Kubernetes, json!({"replicas": replicas}))
                .with_depends_on(["ns"]),
        ])
    }

    fn request(spec: Spec) -> Request {
        Request::new("shop", "dev", "base").with_spec(spec)
    }

    #[tokio::test]
    async fn test_preview_on_empty_state_never_mutates() {
        let mut mock = MockRuntime::new();
        mock.expect_read().times(2).returning(|_| Ok(None));
        mock.expect_apply().never();
        mock.expect_delete().never();
        mock.expect_import().never();
        let storage = Arc::new(MemoryReleaseStorage::new());
        let registry = RuntimeRegistry::new().with_runtime(ResourceType::Kubernetes, Arc::new(mock));
        let engine = Engine::new(registry, storage.clone());

        let response = engine.preview(&request(spec(1)), None).await.unwrap();

        assert_eq!(response.change_order.step_keys, vec!["ns", "web"]);
        assert_eq!(response.change_order.summary().create, 2);
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_preview_reports_update_without_applying() {
        let runtime = Arc::new(FakeRuntime::new());
        let storage = Arc::new(MemoryReleaseStorage::new());
        let registry = RuntimeRegistry::new().with_runtime(ResourceType::Kubernetes, runtime.clone());
        let engine = Engine::new(registry, storage.clone());
        engine.apply(&request(spec(1)), None).await.unwrap();
        let mutations = runtime.mutating_calls();

        let response = engine.preview(&request(spec(4)), None).await.unwrap();

        let step = response.change_order.get("web").unwrap();
        assert_eq!(step.action, ActionType::Update);
        assert_eq!(step.to.as_ref().unwrap().attributes["replicas"], 4);
        assert_eq!(response.change_order.get("ns").unwrap().action, ActionType::UnChanged);
        assert_eq!(runtime.mutating_calls(), mutations);
        assert_eq!(runtime.live("web").unwrap().attributes["replicas"], 1);
        assert_eq!(storage.revisions("shop", "dev").await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_destroy_preview_lists_recorded_resources() {
        let runtime = Arc::new(FakeRuntime::new());
        let storage = Arc::new(MemoryReleaseStorage::new());
        let registry = RuntimeRegistry::new().with_runtime(ResourceType::Kubernetes, runtime.clone());
        let engine = Engine::new(registry, storage);
        engine.apply(&request(spec(1)), None).await.unwrap();
        let mutations = runtime.mutating_calls();

        let response = engine
            .destroy_preview(&Request::new("shop", "dev", "base"), None)
            .await
            .unwrap();

        assert_eq!(response.change_order.step_keys, vec!["web", "ns"]);
        assert_eq!(response.change_order.summary().delete, 2);
        assert_eq!(runtime.mutating_calls(), mutations);
    }
}
