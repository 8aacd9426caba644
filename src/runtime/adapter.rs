//! Runtime adapter contract.
//!
//! A runtime converges resources of one [`ResourceType`](crate::model::ResourceType)
//! against real infrastructure. The engine calls it once per graph node and
//! treats any error as a failure of that node.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::model::Resource;

/// Request to create or update a resource.
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    /// Last recorded version of the resource.
    pub prior: Option<Resource>,
    /// Desired version of the resource.
    pub planned: Resource,
    /// Stack the resource belongs to.
    pub stack: String,
    /// Predict the post-apply resource without mutating anything.
    pub dry_run: bool,
}

/// Request to observe the live version of a resource.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    /// Desired version, `None` when the resource is being deleted.
    pub planned: Option<Resource>,
    /// Last recorded version.
    pub prior: Option<Resource>,
    /// Stack the resource belongs to.
    pub stack: String,
}

/// Request to delete a resource.
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    /// The resource to delete.
    pub resource: Resource,
    /// Stack the resource belongs to.
    pub stack: String,
}

/// Request to adopt a live resource that is not tracked yet.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// Desired version of the resource.
    pub planned: Resource,
    /// Stack the resource belongs to.
    pub stack: String,
}

/// Request to watch a resource for changes.
#[derive(Debug, Clone)]
pub struct WatchRequest {
    /// The resource to watch.
    pub resource: Resource,
}

/// Kind of a watch event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WatchEventKind {
    /// The resource appeared.
    Added,
    /// The resource changed.
    Modified,
    /// The resource disappeared.
    Deleted,
}

/// A change observed on a watched resource.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    /// Key of the watched resource.
    pub resource_id: String,
    /// What happened.
    pub kind: WatchEventKind,
    /// Latest observed version, if any.
    pub resource: Option<Resource>,
}

/// Adapter converging resources of one type.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Creates or updates a resource. With `dry_run` set, only predicts the result.
    async fn apply(&self, request: ApplyRequest) -> Result<Resource, RuntimeError>;

    /// Reads the live version of a resource, `None` if it does not exist.
    async fn read(&self, request: ReadRequest) -> Result<Option<Resource>, RuntimeError>;

    /// Deletes a resource.
    async fn delete(&self, request: DeleteRequest) -> Result<(), RuntimeError>;

    /// Adopts a live resource and returns its recorded version.
    async fn import(&self, request: ImportRequest) -> Result<Resource, RuntimeError>;

    /// Streams changes of a resource.
    async fn watch(
        &self,
        request: WatchRequest,
    ) -> Result<BoxStream<'static, WatchEvent>, RuntimeError>;
}
