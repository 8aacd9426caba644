//! Release lifecycle on top of a [`ReleaseStorage`].

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{RequestError, Result};
use crate::model::{Release, ReleasePhase, Spec, State};

use super::store::ReleaseStorage;

/// Creates, advances and loads releases of one storage.
#[derive(Clone)]
pub struct ReleaseManager {
    storage: Arc<dyn ReleaseStorage>,
}

impl std::fmt::Debug for ReleaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseManager")
            .field("backend", &self.storage.backend_type())
            .finish()
    }
}

impl ReleaseManager {
    /// Creates a manager over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn ReleaseStorage>) -> Self {
        Self { storage }
    }

    /// Returns the underlying storage.
    #[must_use]
    pub fn storage(&self) -> Arc<dyn ReleaseStorage> {
        Arc::clone(&self.storage)
    }

    /// Loads the latest release of a workspace, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    pub async fn latest_release(&self, project: &str, workspace: &str) -> Result<Option<Release>> {
        match self.storage.latest_revision(project, workspace).await? {
            Some(revision) => Ok(Some(self.storage.get(project, workspace, revision).await?)),
            None => Ok(None),
        }
    }

    /// Loads the state recorded by the latest release, or an empty state.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    pub async fn latest_state(&self, project: &str, workspace: &str, stack: &str) -> Result<State> {
        let state = self
            .latest_release(project, workspace)
            .await?
            .map_or_else(|| State::new(project, workspace, stack), |release| release.state);
        Ok(state)
    }

    /// Creates and stores the next revision of a workspace.
    ///
    /// The revision is one past the latest stored one and starts from the
    /// state the latest release recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read or written.
    pub async fn new_release(
        &self,
        project: &str,
        workspace: &str,
        stack: &str,
        spec: Spec,
        phase: ReleasePhase,
    ) -> Result<Release> {
        let latest = self.latest_release(project, workspace).await?;
        let revision = latest.as_ref().map_or(1, |r| r.revision + 1);

        let mut state = latest.map_or_else(|| State::new(project, workspace, stack), |r| r.state);
        state.stack = stack.to_string();

        let release = Release::new(revision, spec, state, phase);
        validate_release(&release)?;
        self.storage.create(&release).await?;

        info!("Created release {revision} for {project}/{workspace} ({phase})");
        Ok(release)
    }

    /// Moves `release` into `phase` and persists it.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage write fails.
    pub async fn update_release_phase(&self, release: &mut Release, phase: ReleasePhase) -> Result<()> {
        debug!("Release {} phase {} -> {phase}", release.revision, release.phase);
        release.set_phase(phase);
        self.storage.update(release).await
    }
}

/// Checks the structural invariants of a release.
///
/// # Errors
///
/// Returns an error if a coordinate is empty or not a plain name, the
/// revision is zero, or the state belongs to another project or workspace.
pub fn validate_release(release: &Release) -> std::result::Result<(), RequestError> {
    check_segment("project", &release.project)?;
    check_segment("workspace", &release.workspace)?;
    if release.stack.is_empty() {
        return Err(RequestError::MissingField { field: "stack" });
    }

    if release.revision == 0 {
        return Err(RequestError::InvalidRelease {
            reason: String::from("revision must be positive"),
        });
    }

    if release.state.project != release.project {
        return Err(RequestError::ReleaseMismatch {
            field: "project",
            expected: release.project.clone(),
            found: release.state.project.clone(),
        });
    }

    if release.state.workspace != release.workspace {
        return Err(RequestError::ReleaseMismatch {
            field: "workspace",
            expected: release.workspace.clone(),
            found: release.state.workspace.clone(),
        });
    }

    Ok(())
}

/// Checks that `value` can name a directory directly under its parent.
pub(crate) fn check_segment(field: &'static str, value: &str) -> std::result::Result<(), RequestError> {
    if value.is_empty() {
        return Err(RequestError::MissingField { field });
    }
    if value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(RequestError::InvalidName {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Resource, ResourceType};
    use crate::release::MemoryReleaseStorage;
    use serde_json::json;

    fn manager() -> ReleaseManager {
        ReleaseManager::new(Arc::new(MemoryReleaseStorage::new()))
    }

    #[tokio::test]
    async fn test_first_release_starts_empty() {
        let manager = manager();
        let release = manager
            .new_release("shop", "dev", "base", Spec::default(), ReleasePhase::Generating)
            .await
            .unwrap();

        assert_eq!(release.revision, 1);
        assert!(release.state.resources.is_empty());
    }

    #[tokio::test]
    async fn test_next_release_inherits_state() {
        let manager = manager();
        let mut first = manager
            .new_release("shop", "dev", "base", Spec::default(), ReleasePhase::Applying)
            .await
            .unwrap();
        first
            .state
            .resources
            .push(Resource::new("svc", ResourceType::Kubernetes, json!({})));
        manager
            .update_release_phase(&mut first, ReleasePhase::Succeeded)
            .await
            .unwrap();

        let second = manager
            .new_release("shop", "dev", "base", Spec::default(), ReleasePhase::Applying)
            .await
            .unwrap();

        assert_eq!(second.revision, 2);
        assert!(second.state.get("svc").is_some());

        let stored = manager.latest_release("shop", "dev").await.unwrap().unwrap();
        assert_eq!(stored.revision, 2);
    }

    #[test]
    fn test_validate_release() {
        let state = State::new("shop", "dev", "base");
        let mut release = Release::new(1, Spec::default(), state, ReleasePhase::Generating);
        assert!(validate_release(&release).is_ok());

        release.state.workspace = String::from("prod");
        assert!(matches!(
            validate_release(&release),
            Err(RequestError::ReleaseMismatch { field: "workspace", .. })
        ));

        release.revision = 0;
        assert!(matches!(
            validate_release(&release),
            Err(RequestError::InvalidRelease { .. })
        ));
    }

    #[test]
    fn test_validate_release_rejects_nested_names() {
        let state = State::new("../shop", "dev", "base");
        let release = Release::new(1, Spec::default(), state, ReleasePhase::Generating);
        assert!(matches!(
            validate_release(&release),
            Err(RequestError::InvalidName { field: "project", .. })
        ));
    }
}
