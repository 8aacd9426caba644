//! Graph vertices.

use crate::model::{ActionType, Resource};

/// Label of the synthetic root vertex.
pub const ROOT_NODE_ID: &str = "root";

/// A vertex of the execution graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode {
    /// Singleton anchor every resource hangs off.
    Root,
    /// A resource to reconcile.
    Resource(ResourceNode),
}

/// A resource bound to the action the graph was built with.
///
/// The action is a default (`Update` for desired resources, `Delete` for
/// resources that vanished from the spec); the executor recomputes it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    /// Resource key, the vertex identity.
    pub id: String,
    /// Default action.
    pub action: ActionType,
    /// Bound resource, with implicit dependencies merged into `depends_on`.
    pub resource: Resource,
}

impl GraphNode {
    /// Returns the vertex identity.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Root => ROOT_NODE_ID,
            Self::Resource(node) => &node.id,
        }
    }

    /// Returns the resource node, if any.
    #[must_use]
    pub const fn as_resource(&self) -> Option<&ResourceNode> {
        match self {
            Self::Root => None,
            Self::Resource(node) => Some(node),
        }
    }
}

impl ResourceNode {
    /// Binds `resource` to `action`.
    #[must_use]
    pub fn new(resource: Resource, action: ActionType) -> Self {
        Self {
            id: resource.id.clone(),
            action,
            resource,
        }
    }

    /// Returns true if the node was built to delete its resource.
    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.action == ActionType::Delete
    }
}

impl std::fmt::Display for GraphNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => write!(f, "{ROOT_NODE_ID}"),
            Self::Resource(node) => write!(f, "{} ({})", node.id, node.action),
        }
    }
}
