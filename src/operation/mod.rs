//! Operations over the execution graph.
//!
//! This module provides:
//! - Request validation and progress messages
//! - The per-node executor and the shared operation context
//! - Change reporting
//! - The apply, preview, destroy and watch flows

mod apply;
mod change;
mod context;
mod destroy;
mod diff;
mod executor;
mod models;
mod preview;
mod request;
mod watch;

use std::sync::Arc;
use tracing::Instrument;

use crate::error::Result;
use crate::graph::{ExecutionGraph, WalkReport, Walker};

pub use apply::ApplyResponse;
pub use change::{ChangeOrder, ChangeStep, ChangeSummary};
pub use context::{OperationContext, SharedState};
pub use destroy::DestroyResponse;
pub use diff::{diff_values, strip_ignored, FieldChange, FieldDiff};
pub use executor::NodeExecutor;
pub use models::{progress_channel, Message, OpResult, OperationType, ProgressReceiver, ProgressSender};
pub use preview::PreviewResponse;
pub use request::{default_operator, Request};

/// Walks `graph`, running every resource node through a [`NodeExecutor`].
///
/// # Errors
///
/// Returns the first node failure.
pub async fn walk_graph(ctx: Arc<OperationContext>, graph: &ExecutionGraph) -> Result<WalkReport> {
    let executor = Arc::new(NodeExecutor::new(Arc::clone(&ctx)));
    let mut walker = Walker::new(graph)
        .with_max_concurrency(ctx.max_concurrency)
        .with_span(ctx.span.clone());
    if let Some(sender) = &ctx.progress {
        walker = walker.with_progress(sender.clone());
    }

    walker
        .walk(move |node| {
            let executor = Arc::clone(&executor);
            async move { executor.execute(node).await }
        })
        .instrument(ctx.span.clone())
        .await
}
