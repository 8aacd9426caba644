//! Release and state types.
//!
//! A [`Release`] records one reconciliation attempt: the desired spec, the
//! resulting [`State`], and the phase the attempt reached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::resource::{Resource, ResourceIndex, Spec};

/// Lifecycle phase of a release.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReleasePhase {
    /// The spec is being generated.
    Generating,
    /// A preview is running.
    Previewing,
    /// An apply is running.
    Applying,
    /// A destroy is running.
    Destroying,
    /// The operation finished successfully.
    Succeeded,
    /// The operation failed.
    Failed,
}

/// Recorded state of the managed resources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct State {
    /// Project name.
    pub project: String,
    /// Workspace name.
    pub workspace: String,
    /// Stack name.
    pub stack: String,
    /// Counter incremented on every persisted change of this state.
    #[serde(default)]
    pub serial: u64,
    /// Last-applied resources, sorted by key.
    #[serde(default)]
    pub resources: Vec<Resource>,
    /// When the state was created.
    pub create_time: DateTime<Utc>,
    /// When the state was last modified.
    pub modified_time: DateTime<Utc>,
}

/// One reconciliation attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Release {
    /// Project name.
    pub project: String,
    /// Workspace name.
    pub workspace: String,
    /// Stack name.
    pub stack: String,
    /// Monotonically increasing revision within the project and workspace.
    pub revision: u64,
    /// Desired state of this attempt.
    pub spec: Spec,
    /// Resulting state.
    pub state: State,
    /// Phase reached.
    pub phase: ReleasePhase,
    /// When the release was created.
    pub create_time: DateTime<Utc>,
    /// When the release was last modified.
    pub modified_time: DateTime<Utc>,
}

impl State {
    /// Creates a new empty state.
    #[must_use]
    pub fn new(project: &str, workspace: &str, stack: &str) -> Self {
        let now = Utc::now();
        Self {
            project: project.to_string(),
            workspace: workspace.to_string(),
            stack: stack.to_string(),
            serial: 0,
            resources: Vec::new(),
            create_time: now,
            modified_time: now,
        }
    }

    /// Builds the index of recorded resources.
    #[must_use]
    pub fn index(&self) -> BTreeMap<String, Resource> {
        super::resource::index_resources(&self.resources)
    }

    /// Replaces the recorded resources with the live entries of `index`.
    ///
    /// Deleted entries are dropped and the serial is bumped.
    pub fn apply_index(&mut self, index: &ResourceIndex) {
        self.resources = index.values().flatten().cloned().collect();
        self.serial += 1;
        self.modified_time = Utc::now();
    }

    /// Gets a resource by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == key)
    }
}

impl Release {
    /// Creates a release for `revision` carrying `spec` and the prior `state`.
    #[must_use]
    pub fn new(revision: u64, spec: Spec, state: State, phase: ReleasePhase) -> Self {
        let now = Utc::now();
        Self {
            project: state.project.clone(),
            workspace: state.workspace.clone(),
            stack: state.stack.clone(),
            revision,
            spec,
            state,
            phase,
            create_time: now,
            modified_time: now,
        }
    }

    /// Moves the release into `phase`.
    pub fn set_phase(&mut self, phase: ReleasePhase) {
        self.phase = phase;
        self.modified_time = Utc::now();
    }

    /// Returns true if the release reached a terminal phase.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self.phase, ReleasePhase::Succeeded | ReleasePhase::Failed)
    }
}

impl std::fmt::Display for ReleasePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match self {
            Self::Generating => "generating",
            Self::Previewing => "previewing",
            Self::Applying => "applying",
            Self::Destroying => "destroying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        write!(f, "{phase}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceType;
    use serde_json::json;

    #[test]
    fn test_apply_index_drops_deleted_and_bumps_serial() {
        let mut state = State::new("demo", "dev", "base");
        let mut index = ResourceIndex::new();
        index.insert(
            String::from("b"),
            Some(Resource::new("b", ResourceType::Kubernetes, json!({}))),
        );
        index.insert(String::from("a"), None);

        state.apply_index(&index);

        assert_eq!(state.serial, 1);
        assert_eq!(state.resources.len(), 1);
        assert!(state.get("b").is_some());
        assert!(state.get("a").is_none());
    }

    #[test]
    fn test_release_phase() {
        let state = State::new("demo", "dev", "base");
        let mut release = Release::new(1, Spec::default(), state, ReleasePhase::Applying);
        assert!(!release.is_finished());

        release.set_phase(ReleasePhase::Succeeded);
        assert!(release.is_finished());
        assert_eq!(release.phase.to_string(), "succeeded");
    }
}
