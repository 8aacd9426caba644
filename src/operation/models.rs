//! Operation kinds and progress messages.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// The four operation modes a walk runs in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OperationType {
    /// Converge live infrastructure to the spec.
    Apply,
    /// Compute the apply change order without mutating anything.
    ApplyPreview,
    /// Delete every recorded resource.
    Destroy,
    /// Compute the destroy change order without mutating anything.
    DestroyPreview,
}

impl OperationType {
    /// Returns true for the two preview modes.
    #[must_use]
    pub const fn is_preview(&self) -> bool {
        matches!(self, Self::ApplyPreview | Self::DestroyPreview)
    }

    /// Returns true for the two destroy modes.
    #[must_use]
    pub const fn is_destroy(&self) -> bool {
        matches!(self, Self::Destroy | Self::DestroyPreview)
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Apply => "apply",
            Self::ApplyPreview => "apply-preview",
            Self::Destroy => "destroy",
            Self::DestroyPreview => "destroy-preview",
        };
        write!(f, "{s}")
    }
}

/// Final status of one node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OpResult {
    /// The node finished and changed, or would change, its resource.
    Success,
    /// The node failed.
    Failed,
    /// The resource was already converged.
    Skip,
}

/// Progress notification for one resource.
///
/// A message with no `op_result` announces that the node started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Resource key.
    pub resource_id: String,
    /// Final status, absent while running.
    pub op_result: Option<OpResult>,
    /// Rendered error, set with [`OpResult::Failed`].
    pub op_err: Option<String>,
}

/// Sending half of the progress channel.
pub type ProgressSender = mpsc::UnboundedSender<Message>;

/// Receiving half of the progress channel.
pub type ProgressReceiver = mpsc::UnboundedReceiver<Message>;

/// Creates a progress channel.
#[must_use]
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

impl Message {
    /// Announces that the node of `resource_id` started.
    #[must_use]
    pub fn started(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            op_result: None,
            op_err: None,
        }
    }

    /// Reports a final status.
    #[must_use]
    pub fn finished(resource_id: impl Into<String>, op_result: OpResult) -> Self {
        Self {
            resource_id: resource_id.into(),
            op_result: Some(op_result),
            op_err: None,
        }
    }

    /// Reports a failure.
    #[must_use]
    pub fn failed(resource_id: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self {
            resource_id: resource_id.into(),
            op_result: Some(OpResult::Failed),
            op_err: Some(err.to_string()),
        }
    }

    /// Returns true if the message announces a start.
    #[must_use]
    pub const fn is_start(&self) -> bool {
        self.op_result.is_none()
    }
}
