//! Concurrent walk of an execution graph in dependency order.
//!
//! A vertex is spawned as its own task once every predecessor completed
//! successfully. A failed vertex never releases its successors, so only its
//! descendants are held back while independent branches run to the end.

use futures::FutureExt;
use petgraph::graph::NodeIndex;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, Instrument, Span};

use crate::error::{EngineError, Result};
use crate::operation::{Message, OpResult, ProgressSender};

use super::dag::ExecutionGraph;
use super::node::{GraphNode, ResourceNode};

/// What a visited resource node did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    /// The node changed, or would change, its resource.
    Completed,
    /// The resource was already converged.
    Skipped,
}

/// Result of a finished walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    /// Nodes that completed, in completion order.
    pub completed: Vec<String>,
    /// Nodes that found nothing to do, in completion order.
    pub skipped: Vec<String>,
    /// Nodes that failed.
    pub failed: Vec<String>,
    /// Nodes never started because a predecessor failed.
    pub blocked: Vec<String>,
}

impl WalkReport {
    /// Returns the number of nodes that finished without error.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.completed.len() + self.skipped.len()
    }

    /// Returns true if no node failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives a visitor over every resource vertex of a graph.
#[derive(Debug)]
pub struct Walker<'g> {
    /// Graph to walk.
    graph: &'g ExecutionGraph,
    /// Maximum number of nodes running at once, unbounded if `None`.
    max_concurrency: Option<usize>,
    /// Progress channel.
    progress: Option<ProgressSender>,
    /// Span every node task runs in.
    span: Span,
}

impl<'g> Walker<'g> {
    /// Creates an unbounded walker over `graph`.
    #[must_use]
    pub fn new(graph: &'g ExecutionGraph) -> Self {
        Self {
            graph,
            max_concurrency: None,
            progress: None,
            span: Span::current(),
        }
    }

    /// Bounds the number of concurrently running nodes. Zero means unbounded.
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = (limit > 0).then_some(limit);
        self
    }

    /// Emits a start and a finish [`Message`] per node on `sender`.
    #[must_use]
    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Runs every node task inside `span`.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Visits every resource vertex once, dependencies first.
    ///
    /// # Errors
    ///
    /// Returns the first node failure wrapped in [`EngineError::NodeFailed`].
    /// A panicking node fails with an internal error.
    pub async fn walk<F, Fut>(&self, visit: F) -> Result<WalkReport>
    where
        F: Fn(ResourceNode) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeOutcome>> + Send + 'static,
    {
        let visit = Arc::new(visit);
        let semaphore = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));

        let mut remaining: HashMap<NodeIndex, usize> = self
            .graph
            .indices()
            .into_iter()
            .map(|idx| (idx, self.graph.predecessors(idx).len()))
            .collect();
        let mut started: HashSet<NodeIndex> = HashSet::new();
        let mut tasks: JoinSet<(NodeIndex, Result<NodeOutcome>)> = JoinSet::new();
        let mut report = WalkReport::default();
        let mut first_error: Option<EngineError> = None;
        let mut ready = vec![self.graph.root()];

        loop {
            while let Some(idx) = ready.pop() {
                if !started.insert(idx) {
                    continue;
                }
                match self.graph.node(idx) {
                    GraphNode::Root => ready.extend(self.release(idx, &mut remaining)),
                    GraphNode::Resource(node) => {
                        self.spawn(&mut tasks, idx, node.clone(), &visit, semaphore.clone());
                    }
                }
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };

            match joined {
                Ok((idx, Ok(outcome))) => {
                    let id = self.graph.node(idx).id().to_string();
                    match outcome {
                        NodeOutcome::Completed => report.completed.push(id),
                        NodeOutcome::Skipped => report.skipped.push(id),
                    }
                    ready.extend(self.release(idx, &mut remaining));
                }
                Ok((idx, Err(err))) => {
                    let id = self.graph.node(idx).id().to_string();
                    error!("Resource node {id} failed: {err}");
                    report.failed.push(id.clone());
                    if first_error.is_none() {
                        first_error = Some(EngineError::node_failed(id, err));
                    }
                }
                Err(join_err) => {
                    error!("Resource node task aborted: {join_err}");
                    if first_error.is_none() {
                        first_error = Some(EngineError::internal(format!(
                            "resource node task aborted: {join_err}"
                        )));
                    }
                }
            }
        }

        let mut blocked: Vec<String> = self
            .graph
            .resource_nodes()
            .filter(|node| {
                self.graph
                    .index_of(&node.id)
                    .is_some_and(|idx| !started.contains(&idx))
            })
            .map(|node| node.id.clone())
            .collect();
        blocked.sort();
        if !blocked.is_empty() {
            debug!("Resource nodes never started: {}", blocked.join(", "));
        }
        report.blocked = blocked;

        match first_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Marks `idx` finished and returns the successors that became ready.
    fn release(&self, idx: NodeIndex, remaining: &mut HashMap<NodeIndex, usize>) -> Vec<NodeIndex> {
        let mut ready = Vec::new();
        for next in self.graph.successors(idx) {
            if let Some(count) = remaining.get_mut(&next) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.push(next);
                }
            }
        }
        ready
    }

    fn spawn<F, Fut>(
        &self,
        tasks: &mut JoinSet<(NodeIndex, Result<NodeOutcome>)>,
        idx: NodeIndex,
        node: ResourceNode,
        visit: &Arc<F>,
        semaphore: Option<Arc<Semaphore>>,
    ) where
        F: Fn(ResourceNode) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeOutcome>> + Send + 'static,
    {
        let visit = Arc::clone(visit);
        let progress = self.progress.clone();
        let id = node.id.clone();

        let task = async move {
            let _permit = match semaphore {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(err) => {
                        return (idx, Err(EngineError::internal(format!("concurrency limiter closed: {err}"))));
                    }
                },
                None => None,
            };

            debug!("Executing resource node {id}");
            notify(progress.as_ref(), Message::started(&id));

            let result = match AssertUnwindSafe(async move { visit(node).await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(payload) => Err(EngineError::internal(format!(
                    "resource node {id} panicked: {}",
                    panic_message(payload.as_ref())
                ))),
            };

            let message = match &result {
                Ok(NodeOutcome::Completed) => Message::finished(&id, OpResult::Success),
                Ok(NodeOutcome::Skipped) => Message::finished(&id, OpResult::Skip),
                Err(err) => Message::failed(&id, err),
            };
            notify(progress.as_ref(), message);

            (idx, result)
        };

        tasks.spawn(task.instrument(self.span.clone()));
    }
}

/// Sends `message` if a receiver is still listening.
fn notify(progress: Option<&ProgressSender>, message: Message) {
    if let Some(sender) = progress
        && sender.send(message).is_err()
    {
        debug!("Progress receiver dropped");
    }
}

/// Extracts the text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic")
    }
}
