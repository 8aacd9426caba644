//! In-memory release storage backend.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::error::{EngineError, Result, StorageError};
use crate::model::Release;

use super::store::ReleaseStorage;

type WorkspaceKey = (String, String);

/// Release storage kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryReleaseStorage {
    releases: RwLock<BTreeMap<WorkspaceKey, BTreeMap<u64, Release>>>,
}

impl MemoryReleaseStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored releases across all workspaces.
    pub async fn len(&self) -> usize {
        self.releases.read().await.values().map(BTreeMap::len).sum()
    }

    /// Returns true if nothing was stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn key(project: &str, workspace: &str) -> WorkspaceKey {
    (project.to_string(), workspace.to_string())
}

#[async_trait]
impl ReleaseStorage for MemoryReleaseStorage {
    async fn latest_revision(&self, project: &str, workspace: &str) -> Result<Option<u64>> {
        let releases = self.releases.read().await;
        Ok(releases
            .get(&key(project, workspace))
            .and_then(|revisions| revisions.keys().next_back().copied()))
    }

    async fn get(&self, project: &str, workspace: &str, revision: u64) -> Result<Release> {
        let releases = self.releases.read().await;
        releases
            .get(&key(project, workspace))
            .and_then(|revisions| revisions.get(&revision))
            .cloned()
            .ok_or_else(|| {
                EngineError::Storage(StorageError::RevisionNotFound {
                    project: project.to_string(),
                    workspace: workspace.to_string(),
                    revision,
                })
            })
    }

    async fn revisions(&self, project: &str, workspace: &str) -> Result<Vec<u64>> {
        let releases = self.releases.read().await;
        Ok(releases
            .get(&key(project, workspace))
            .map(|revisions| revisions.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn create(&self, release: &Release) -> Result<()> {
        let mut releases = self.releases.write().await;
        let revisions = releases
            .entry(key(&release.project, &release.workspace))
            .or_default();
        if revisions.contains_key(&release.revision) {
            return Err(EngineError::Storage(StorageError::RevisionExists {
                revision: release.revision,
            }));
        }
        revisions.insert(release.revision, release.clone());
        Ok(())
    }

    async fn update(&self, release: &Release) -> Result<()> {
        let mut releases = self.releases.write().await;
        match releases
            .get_mut(&key(&release.project, &release.workspace))
            .and_then(|revisions| revisions.get_mut(&release.revision))
        {
            Some(stored) => {
                *stored = release.clone();
                Ok(())
            }
            None => Err(EngineError::Storage(StorageError::RevisionNotFound {
                project: release.project.clone(),
                workspace: release.workspace.clone(),
                revision: release.revision,
            })),
        }
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReleasePhase, Spec, State};

    fn release(revision: u64) -> Release {
        Release::new(
            revision,
            Spec::default(),
            State::new("shop", "dev", "base"),
            ReleasePhase::Generating,
        )
    }

    #[tokio::test]
    async fn test_create_get_update() {
        let storage = MemoryReleaseStorage::new();
        assert!(storage.is_empty().await);

        let mut r = release(1);
        storage.create(&r).await.unwrap();
        r.set_phase(ReleasePhase::Failed);
        storage.update(&r).await.unwrap();

        let loaded = storage.get("shop", "dev", 1).await.unwrap();
        assert_eq!(loaded.phase, ReleasePhase::Failed);
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_workspaces_are_isolated() {
        let storage = MemoryReleaseStorage::new();
        storage.create(&release(1)).await.unwrap();

        assert_eq!(storage.latest_revision("shop", "prod").await.unwrap(), None);
        assert!(storage.get("shop", "prod", 1).await.is_err());
    }
}
