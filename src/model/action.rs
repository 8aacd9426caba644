//! Per-resource action classification.

use serde::{Deserialize, Serialize};

/// Outcome decided for one resource during a walk.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ActionType {
    /// Not decided yet.
    #[default]
    Undefined,
    /// Live state already matches the desired state.
    UnChanged,
    /// The resource does not exist yet.
    Create,
    /// The resource exists and differs from the desired state.
    Update,
    /// The resource must be removed.
    Delete,
}

impl ActionType {
    /// Returns true if the action changes infrastructure.
    #[must_use]
    pub const fn is_mutating(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }

    /// Returns a short symbol used when rendering change orders.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Undefined => "?",
            Self::UnChanged => "=",
            Self::Create => "+",
            Self::Update => "~",
            Self::Delete => "-",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Undefined => "Undefined",
            Self::UnChanged => "UnChanged",
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        };
        write!(f, "{s}")
    }
}
