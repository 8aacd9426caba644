//! Execution graph construction and traversal.
//!
//! This module provides:
//! - Graph vertices bound to default actions
//! - Builders for apply and destroy graphs
//! - A concurrent dependency-ordered walker

mod builder;
mod dag;
mod node;
mod walker;

pub use builder::GraphBuilder;
pub use dag::ExecutionGraph;
pub use node::{GraphNode, ResourceNode, ROOT_NODE_ID};
pub use walker::{NodeOutcome, WalkReport, Walker};

pub(crate) use walker::panic_message;
