//! Per-resource execution.
//!
//! Each node runs the same pipeline:
//!
//! 1. **Prepare** the planned resource by substituting references.
//! 2. **Read** the prior, planned and live versions.
//! 3. **Decide** the action from the three versions.
//! 4. **Execute** the action through the runtime (skipped in previews).
//! 5. **Publish** the result to the shared indices and record a change step.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, SecretError};
use crate::graph::{NodeOutcome, ResourceNode};
use crate::model::{ActionType, Resource};
use crate::reference::{collect_secret_refs, replace_secret_refs, resolve_implicit_refs};
use crate::runtime::{ApplyRequest, DeleteRequest, ImportRequest, ReadRequest, Runtime};

use super::change::ChangeStep;
use super::context::OperationContext;
use super::diff::{diff_values, strip_ignored};
use super::models::OperationType;

/// Three versions of one resource.
#[derive(Debug, Clone, Default)]
struct ThreeWay {
    planned: Option<Resource>,
    prior: Option<Resource>,
    live: Option<Resource>,
}

/// Runs the node pipeline for one graph vertex.
#[derive(Debug)]
pub struct NodeExecutor {
    ctx: Arc<OperationContext>,
}

impl NodeExecutor {
    /// Creates an executor over `ctx`.
    #[must_use]
    pub const fn new(ctx: Arc<OperationContext>) -> Self {
        Self { ctx }
    }

    /// Executes `node`.
    ///
    /// # Errors
    ///
    /// Returns an error if reference substitution, a runtime call, or the
    /// release persist fails.
    pub async fn execute(&self, node: ResourceNode) -> Result<NodeOutcome> {
        let runtime = self.ctx.registry.get(node.resource.resource_type)?;
        let deleting = node.is_delete() || self.ctx.operation.is_destroy();

        let planned = if deleting {
            None
        } else {
            Some(self.prepare(node.resource.clone()).await?)
        };

        let views = self.read_three_way(runtime.as_ref(), &node, planned).await?;
        let (action, predicted) = self.decide(runtime.as_ref(), &views, deleting).await?;
        debug!("Resource {} action: {action}", node.id);

        let to = if self.ctx.operation.is_preview() {
            if action == ActionType::Delete {
                None
            } else {
                predicted.or_else(|| views.planned.clone())
            }
        } else {
            let result = self.run(runtime.as_ref(), &node, &views, action).await?;
            self.ctx.publish(&node.id, result.clone()).await?;
            result
        };

        let from = views.live.clone().or_else(|| views.prior.clone());
        self.ctx
            .record_change(ChangeStep::new(node.id.clone(), action, from, to))
            .await;

        Ok(if action == ActionType::UnChanged {
            NodeOutcome::Skipped
        } else {
            NodeOutcome::Completed
        })
    }

    /// Substitutes references in the attributes of `resource`.
    ///
    /// Previews only resolve secrets; implicit references to resources that
    /// do not exist yet are left in place.
    async fn prepare(&self, mut resource: Resource) -> Result<Resource> {
        if !collect_secret_refs(&resource.attributes)?.is_empty() {
            let store = self.ctx.secrets.as_ref().ok_or_else(|| SecretError::Backend {
                message: format!("resource '{}' uses secret references but no secret store is configured", resource.id),
            })?;
            resource.attributes = replace_secret_refs(&resource.attributes, store.as_ref()).await?;
        }

        if self.ctx.operation == OperationType::Apply {
            let index = self.ctx.ctx_snapshot().await;
            let (refs, attributes) = resolve_implicit_refs(&resource.attributes, &index)?;
            if !refs.is_empty() {
                debug!("Resolved references of {} to {}", resource.id, refs.join(", "));
            }
            resource.attributes = attributes;
        }

        Ok(resource)
    }

    async fn read_three_way(
        &self,
        runtime: &dyn Runtime,
        node: &ResourceNode,
        planned: Option<Resource>,
    ) -> Result<ThreeWay> {
        let prior = self.ctx.prior_index.get(&node.id).cloned();
        let live = runtime
            .read(ReadRequest {
                planned: planned.clone(),
                prior: prior.clone().or_else(|| planned.is_none().then(|| node.resource.clone())),
                stack: self.ctx.stack.clone(),
            })
            .await?;

        Ok(ThreeWay {
            planned,
            prior,
            live,
        })
    }

    /// Decides the action. Returns the dry-run prediction when one was made.
    async fn decide(
        &self,
        runtime: &dyn Runtime,
        views: &ThreeWay,
        deleting: bool,
    ) -> Result<(ActionType, Option<Resource>)> {
        let Some(planned) = views.planned.as_ref().filter(|_| !deleting) else {
            return Ok((ActionType::Delete, None));
        };

        if views.prior.is_none() && views.live.is_none() {
            return Ok((ActionType::Create, None));
        }

        let predicted = runtime
            .apply(ApplyRequest {
                prior: views.prior.clone(),
                planned: planned.clone(),
                stack: self.ctx.stack.clone(),
                dry_run: true,
            })
            .await?;

        let mut ignored = self.ctx.ignore_fields.clone();
        ignored.extend(planned.ignore_fields());

        let live = views
            .live
            .as_ref()
            .map_or(Value::Null, |r| strip_ignored(&r.attributes, &ignored));
        let expected = strip_ignored(&predicted.attributes, &ignored);

        let changes = diff_values(&live, &expected);
        if changes.is_empty() {
            Ok((ActionType::UnChanged, Some(predicted)))
        } else {
            debug!("Resource {} drifted on {} field(s)", planned.id, changes.len());
            Ok((ActionType::Update, Some(predicted)))
        }
    }

    /// Executes `action` and returns the resource to record.
    async fn run(
        &self,
        runtime: &dyn Runtime,
        node: &ResourceNode,
        views: &ThreeWay,
        action: ActionType,
    ) -> Result<Option<Resource>> {
        let planned = views.planned.as_ref();
        let result = match (action, planned) {
            (ActionType::Delete, _) => {
                match &views.live {
                    Some(live) => {
                        runtime
                            .delete(DeleteRequest {
                                resource: live.clone(),
                                stack: self.ctx.stack.clone(),
                            })
                            .await?;
                    }
                    None => debug!("Resource {} is already gone", node.id),
                }
                None
            }
            (ActionType::Create | ActionType::Update, Some(planned)) => Some(
                runtime
                    .apply(ApplyRequest {
                        prior: views.prior.clone(),
                        planned: planned.clone(),
                        stack: self.ctx.stack.clone(),
                        dry_run: false,
                    })
                    .await?,
            ),
            (ActionType::UnChanged, Some(planned)) => match &views.prior {
                Some(prior) => Some(prior.clone()),
                None => Some(
                    runtime
                        .import(ImportRequest {
                            planned: planned.clone(),
                            stack: self.ctx.stack.clone(),
                        })
                        .await?,
                ),
            },
            (ActionType::Undefined, _) | (_, None) => None,
        };

        Ok(result.map(|mut resource| {
            if let Some(planned) = planned {
                resource.depends_on.clone_from(&planned.depends_on);
            }
            resource
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, ErrorKind, RuntimeError};
    use crate::model::{Release, ReleasePhase, ResourceType, Spec, State};
    use crate::reference::MemorySecretStore;
    use crate::runtime::fake::FakeRuntime;
    use crate::runtime::{MockRuntime, RuntimeRegistry};
    use serde_json::json;

    fn web(replicas: u64) -> Resource {
        Resource::new("web", ResourceType::Kubernetes, json!({"replicas": replicas}))
    }

    fn context(operation: OperationType, prior: Vec<Resource>, runtime: Arc<dyn Runtime>) -> Arc<OperationContext> {
        let mut state = State::new("shop", "dev", "base");
        state.resources = prior;
        let release = Release::new(1, Spec::default(), state, ReleasePhase::Applying);
        let registry = RuntimeRegistry::new().with_runtime(ResourceType::Kubernetes, runtime);
        Arc::new(OperationContext::new(operation, release, Arc::new(registry)))
    }

    fn node(resource: Resource, action: ActionType) -> ResourceNode {
        ResourceNode::new(resource, action)
    }

    #[tokio::test]
    async fn test_create_when_nothing_exists() {
        let runtime = Arc::new(FakeRuntime::new());
        let ctx = context(OperationType::Apply, Vec::new(), runtime.clone());

        let outcome = NodeExecutor::new(ctx.clone())
            .execute(node(web(1), ActionType::Update))
            .await
            .unwrap();

        assert_eq!(outcome, NodeOutcome::Completed);
        assert_eq!(runtime.mutating_calls(), vec!["apply:web"]);
        let step = ctx.change_order().await.get("web").cloned().unwrap();
        assert_eq!(step.action, ActionType::Create);
        assert!(step.from.is_none());
        assert_eq!(step.to.unwrap().attributes["uid"], "uid-web");
    }

    #[tokio::test]
    async fn test_unchanged_carries_prior_forward() {
        let runtime = Arc::new(FakeRuntime::new().with_live(web(1)));
        let prior = runtime.live("web").unwrap();
        let ctx = context(OperationType::Apply, vec![prior.clone()], runtime.clone());

        let outcome = NodeExecutor::new(ctx.clone())
            .execute(node(web(1), ActionType::Update))
            .await
            .unwrap();

        assert_eq!(outcome, NodeOutcome::Skipped);
        assert!(runtime.mutating_calls().is_empty());
        let shared = ctx.snapshot().await;
        assert_eq!(shared.ctx_index["web"], Some(prior));
    }

    #[tokio::test]
    async fn test_untracked_live_resource_is_imported() {
        let runtime = Arc::new(FakeRuntime::new().with_live(web(1)));
        let ctx = context(OperationType::Apply, Vec::new(), runtime.clone());

        NodeExecutor::new(ctx.clone())
            .execute(node(web(1), ActionType::Update))
            .await
            .unwrap();

        assert_eq!(runtime.mutating_calls(), vec!["import:web"]);
        assert_eq!(ctx.change_order().await.get("web").unwrap().action, ActionType::UnChanged);
    }

    #[tokio::test]
    async fn test_drift_triggers_update() {
        let runtime = Arc::new(FakeRuntime::new().with_live(web(1)));
        let prior = runtime.live("web").unwrap();
        let ctx = context(OperationType::Apply, vec![prior], runtime.clone());

        NodeExecutor::new(ctx.clone())
            .execute(node(web(3), ActionType::Update))
            .await
            .unwrap();

        assert_eq!(runtime.mutating_calls(), vec!["apply:web"]);
        assert_eq!(runtime.live("web").unwrap().attributes["replicas"], 3);
        assert_eq!(ctx.change_order().await.get("web").unwrap().action, ActionType::Update);
    }

    #[tokio::test]
    async fn test_ignore_fields_suppress_drift() {
        let runtime = Arc::new(FakeRuntime::new().with_live(web(1)));
        let prior = runtime.live("web").unwrap();
        let ctx = context(OperationType::Apply, vec![prior], runtime.clone());
        let desired = web(5).with_extension("ignoreFields", json!(["replicas"]));

        let outcome = NodeExecutor::new(ctx)
            .execute(node(desired, ActionType::Update))
            .await
            .unwrap();

        assert_eq!(outcome, NodeOutcome::Skipped);
        assert!(runtime.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_drift_outside_ignored_indices_triggers_update() {
        let containers = |last: &str| {
            Resource::new("web", ResourceType::Kubernetes, json!({"containers": ["a", "b", last]}))
        };
        let runtime = Arc::new(FakeRuntime::new().with_live(containers("c")));
        let prior = runtime.live("web").unwrap();
        let ctx = context(OperationType::Apply, vec![prior], runtime.clone());
        let desired = containers("d").with_extension("ignoreFields", json!(["containers.0", "containers.1"]));

        let outcome = NodeExecutor::new(ctx.clone())
            .execute(node(desired, ActionType::Update))
            .await
            .unwrap();

        assert_eq!(outcome, NodeOutcome::Completed);
        assert_eq!(runtime.mutating_calls(), vec!["apply:web"]);
        assert_eq!(ctx.change_order().await.get("web").unwrap().action, ActionType::Update);
    }

    #[tokio::test]
    async fn test_delete_node_removes_resource() {
        let runtime = Arc::new(FakeRuntime::new().with_live(web(1)));
        let prior = runtime.live("web").unwrap();
        let ctx = context(OperationType::Apply, vec![prior.clone()], runtime.clone());

        NodeExecutor::new(ctx.clone())
            .execute(node(prior, ActionType::Delete))
            .await
            .unwrap();

        assert!(runtime.live("web").is_none());
        let shared = ctx.snapshot().await;
        assert_eq!(shared.ctx_index["web"], None);
        assert!(shared.release.state.resources.is_empty());
    }

    #[tokio::test]
    async fn test_implicit_reference_resolved_from_context() {
        let runtime = Arc::new(FakeRuntime::new());
        let ctx = context(OperationType::Apply, Vec::new(), runtime.clone());
        let executor = NodeExecutor::new(ctx.clone());

        executor.execute(node(web(1), ActionType::Update)).await.unwrap();
        let svc = Resource::new(
            "svc",
            ResourceType::Kubernetes,
            json!({"target": "$kusion_path.web.uid"}),
        );
        executor.execute(node(svc, ActionType::Update)).await.unwrap();

        assert_eq!(runtime.live("svc").unwrap().attributes["target"], "uid-web");
    }

    #[tokio::test]
    async fn test_missing_reference_fails() {
        let runtime = Arc::new(FakeRuntime::new());
        let ctx = context(OperationType::Apply, Vec::new(), runtime.clone());
        let svc = Resource::new(
            "svc",
            ResourceType::Kubernetes,
            json!({"target": "$kusion_path.web.uid"}),
        );

        let err = NodeExecutor::new(ctx).execute(node(svc, ActionType::Update)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::IllegalManifest);
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_secrets_are_substituted() {
        let runtime = Arc::new(FakeRuntime::new());
        let secrets = MemorySecretStore::new().with_secret("db", json!({"password": "hunter2"}));
        let mut state = State::new("shop", "dev", "base");
        state.resources = Vec::new();
        let release = Release::new(1, Spec::default(), state, ReleasePhase::Applying);
        let registry = RuntimeRegistry::new().with_runtime(ResourceType::Kubernetes, runtime.clone());
        let ctx = Arc::new(
            OperationContext::new(OperationType::Apply, release, Arc::new(registry))
                .with_secrets(Arc::new(secrets)),
        );
        let db = Resource::new("db", ResourceType::Kubernetes, json!({"password": "ref://db/password"}));

        NodeExecutor::new(ctx).execute(node(db, ActionType::Update)).await.unwrap();

        assert_eq!(runtime.live("db").unwrap().attributes["password"], "hunter2");
    }

    #[tokio::test]
    async fn test_secret_without_store_fails() {
        let runtime = Arc::new(FakeRuntime::new());
        let ctx = context(OperationType::ApplyPreview, Vec::new(), runtime);
        let db = Resource::new("db", ResourceType::Kubernetes, json!({"password": "ref://db/password"}));

        let err = NodeExecutor::new(ctx).execute(node(db, ActionType::Update)).await.unwrap_err();
        assert!(matches!(err, EngineError::Secret(_)));
    }

    #[tokio::test]
    async fn test_preview_never_mutates() {
        let mut mock = MockRuntime::new();
        mock.expect_read().returning(|_| Ok(None));
        mock.expect_apply().never();
        mock.expect_delete().never();
        mock.expect_import().never();
        let ctx = context(OperationType::ApplyPreview, Vec::new(), Arc::new(mock));

        let outcome = NodeExecutor::new(ctx.clone())
            .execute(node(web(1), ActionType::Update))
            .await
            .unwrap();

        assert_eq!(outcome, NodeOutcome::Completed);
        let shared = ctx.snapshot().await;
        assert!(shared.ctx_index.is_empty());
        assert_eq!(shared.release.state.serial, 0);
        let step = shared.change_order.get("web").cloned().unwrap();
        assert_eq!(step.action, ActionType::Create);
        assert_eq!(step.to, Some(web(1)));
    }

    #[tokio::test]
    async fn test_destroy_preview_reports_delete() {
        let prior = web(1);
        let mut mock = MockRuntime::new();
        let live = prior.clone();
        mock.expect_read().returning(move |_| Ok(Some(live.clone())));
        mock.expect_apply().never();
        mock.expect_delete().never();
        let ctx = context(OperationType::DestroyPreview, vec![prior.clone()], Arc::new(mock));

        NodeExecutor::new(ctx.clone())
            .execute(node(prior.clone(), ActionType::Delete))
            .await
            .unwrap();

        let step = ctx.change_order().await.get("web").cloned().unwrap();
        assert_eq!(step.action, ActionType::Delete);
        assert_eq!(step.from, Some(prior));
        assert!(step.to.is_none());
    }

    #[tokio::test]
    async fn test_runtime_error_propagates() {
        let mut mock = MockRuntime::new();
        mock.expect_read()
            .returning(|_| Err(RuntimeError::adapter("read", "web", "connection refused")));
        let ctx = context(OperationType::Apply, Vec::new(), Arc::new(mock));

        let err = NodeExecutor::new(ctx).execute(node(web(1), ActionType::Update)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("connection refused"));
    }
}
