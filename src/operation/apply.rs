//! Apply flow.

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

/// Result of an apply.
#[derive(Debug, Clone, Default)]
pub struct ApplyResponse {
    /// Release produced, `None` when there was nothing to apply.
    pub release: Option<Release>,
    /// Changes made, in completion order.
    pub change_order: ChangeOrder,
    /// Walk statistics.
    pub report: WalkReport,
}

impl Engine {
    pub(crate) async fn run_apply(
        &self,
        request: &Request,
        progress: Option<ProgressSender>,
    ) -> Result<ApplyResponse> {
        let spec = request.validate_spec()?;
        let (project, workspace, stack) = (&request.project, &request.workspace, &request.stack);
        info!(
            "Applying {} resources to {project}/{workspace}/{stack} as {}",
            spec.len(),
            request.operator
        );

        let prior = self.releases.latest_state(project, workspace, stack).await?;
        let graph = match GraphBuilder::new(Some(spec), &prior.resources).build_apply() {
            Ok(graph) => graph,
            Err(err @ GraphError::NoResources { .. }) => {
                warn!("{err}");
                return Ok(ApplyResponse::default());
            }
            Err(err) => return Err(err.into()),
        };
        self.registry
            .ensure_supported(graph.resource_nodes().map(|node| &node.resource))?;

        let release = self
            .releases
            .new_release(project, workspace, stack, spec.clone(), ReleasePhase::Applying)
            .await?;
        let ctx = Arc::new(self.context(OperationType::Apply, release, progress));

        let outcome = walk_graph(Arc::clone(&ctx), &graph).await;
        let release = Self::finish(&ctx, &outcome).await?;
        let report = outcome?;
        let change_order = ctx.change_order().await;

        info!(
            "Apply of release {} finished: {}",
            release.revision,
            change_order.summary()
        );
        Ok(ApplyResponse {
            release: Some(release),
            change_order,
            report,
        })
    }
}
