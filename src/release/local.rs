//! Local file-based release storage backend.
//!
//! Layout under the base directory:
//!
//! ```text
//! <base>/<project>/<workspace>/<revision>.json
//! <base>/<project>/<workspace>/.metadata.json
//! ```
//!
//! The metadata file tracks every revision with the SHA-256 of its file so a
//! tampered or truncated release is reported as corrupted on load.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result, StorageError};
use crate::model::{Release, ReleasePhase};

use super::digest;
use super::manager::check_segment;
use super::store::ReleaseStorage;

/// Metadata file name.
const METADATA_FILE: &str = ".metadata.json";

/// Per-workspace index of stored revisions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ReleaseMetadata {
    /// Highest stored revision.
    latest_revision: u64,
    /// Stored revisions.
    releases: BTreeMap<u64, ReleaseRecord>,
}

/// Metadata of one stored revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReleaseRecord {
    stack: String,
    phase: ReleasePhase,
    checksum: String,
    modified_time: DateTime<Utc>,
}

/// Local file-based release storage.
#[derive(Debug)]
pub struct LocalReleaseStorage {
    /// Base directory for release files.
    base_dir: PathBuf,
    /// Serializes metadata read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl LocalReleaseStorage {
    /// Creates a storage rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the base directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolves the directory of a workspace, rejecting names that would
    /// leave the base directory.
    fn workspace_dir(&self, project: &str, workspace: &str) -> Result<PathBuf> {
        check_segment("project", project)?;
        check_segment("workspace", workspace)?;
        Ok(self.base_dir.join(project).join(workspace))
    }

    fn release_path(&self, project: &str, workspace: &str, revision: u64) -> Result<PathBuf> {
        Ok(self
            .workspace_dir(project, workspace)?
            .join(format!("{revision}.json")))
    }

    fn metadata_path(&self, project: &str, workspace: &str) -> Result<PathBuf> {
        Ok(self.workspace_dir(project, workspace)?.join(METADATA_FILE))
    }

    /// Reads the metadata of a workspace, empty if none was written.
    async fn read_metadata(&self, project: &str, workspace: &str) -> Result<ReleaseMetadata> {
        let path = self.metadata_path(project, workspace)?;
        if !path.exists() {
            return Ok(ReleaseMetadata::default());
        }

        let content = fs::read_to_string(&path).await.map_err(|e| {
            EngineError::Storage(StorageError::corrupted(format!(
                "Failed to read release metadata: {e}"
            )))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            EngineError::Storage(StorageError::corrupted(format!(
                "Failed to parse release metadata: {e}"
            )))
        })
    }

    async fn write_metadata(&self, project: &str, workspace: &str, metadata: &ReleaseMetadata) -> Result<()> {
        let content = serde_json::to_vec_pretty(metadata).map_err(|e| {
            EngineError::Storage(StorageError::serialization(format!(
                "Failed to serialize release metadata: {e}"
            )))
        })?;
        write_atomic(&self.metadata_path(project, workspace)?, &content).await
    }

    /// Writes `release` and records it in the metadata.
    async fn store(&self, release: &Release, metadata: &mut ReleaseMetadata) -> Result<()> {
        let dir = self.workspace_dir(&release.project, &release.workspace)?;
        if !dir.exists() {
            debug!("Creating release directory: {}", dir.display());
            fs::create_dir_all(&dir).await.map_err(|e| {
                EngineError::Storage(StorageError::WriteFailed {
                    path: dir.clone(),
                    message: format!("Failed to create release directory: {e}"),
                })
            })?;
        }

        let content = serde_json::to_vec_pretty(release).map_err(|e| {
            EngineError::Storage(StorageError::serialization(format!(
                "Failed to serialize release: {e}"
            )))
        })?;

        let path = self.release_path(&release.project, &release.workspace, release.revision)?;
        write_atomic(&path, &content).await?;

        metadata.releases.insert(
            release.revision,
            ReleaseRecord {
                stack: release.stack.clone(),
                phase: release.phase,
                checksum: digest::checksum(&content),
                modified_time: release.modified_time,
            },
        );
        metadata.latest_revision = metadata.latest_revision.max(release.revision);
        self.write_metadata(&release.project, &release.workspace, metadata)
            .await
    }
}

/// Writes `content` to a temporary file, syncs it, then renames it over `path`.
///
/// The temporary file is removed again when any step after its creation fails.
async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let write_failed = |message: String| {
        EngineError::Storage(StorageError::WriteFailed {
            path: path.to_path_buf(),
            message,
        })
    };

    let temp_path = path.with_extension("tmp");

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| write_failed(format!("Failed to create temp file: {e}")))?;

    let result = async {
        file.write_all(content)
            .await
            .map_err(|e| write_failed(format!("Failed to write file: {e}")))?;

        file.sync_all()
            .await
            .map_err(|e| write_failed(format!("Failed to sync file: {e}")))?;
        drop(file);

        fs::rename(&temp_path, path)
            .await
            .map_err(|e| write_failed(format!("Failed to rename file: {e}")))
    }
    .await;

    if result.is_err()
        && let Err(e) = fs::remove_file(&temp_path).await
    {
        warn!("Failed to remove temp file {}: {e}", temp_path.display());
    }
    result
}

#[async_trait]
impl ReleaseStorage for LocalReleaseStorage {
    async fn latest_revision(&self, project: &str, workspace: &str) -> Result<Option<u64>> {
        let metadata = self.read_metadata(project, workspace).await?;
        Ok(metadata.releases.keys().next_back().copied())
    }

    async fn get(&self, project: &str, workspace: &str, revision: u64) -> Result<Release> {
        let metadata = self.read_metadata(project, workspace).await?;
        let record = metadata.releases.get(&revision).ok_or_else(|| {
            EngineError::Storage(StorageError::RevisionNotFound {
                project: project.to_string(),
                workspace: workspace.to_string(),
                revision,
            })
        })?;

        let path = self.release_path(project, workspace, revision)?;
        debug!("Loading release from: {}", path.display());

        let content = fs::read(&path).await.map_err(|e| {
            EngineError::Storage(StorageError::corrupted(format!(
                "Failed to read release {revision}: {e}"
            )))
        })?;

        if !digest::verify(&content, &record.checksum) {
            return Err(EngineError::Storage(StorageError::corrupted(format!(
                "checksum mismatch for release {revision} at {}",
                path.display()
            ))));
        }

        serde_json::from_slice(&content).map_err(|e| {
            EngineError::Storage(StorageError::corrupted(format!(
                "Failed to parse release {revision}: {e}"
            )))
        })
    }

    async fn revisions(&self, project: &str, workspace: &str) -> Result<Vec<u64>> {
        let metadata = self.read_metadata(project, workspace).await?;
        Ok(metadata.releases.keys().copied().collect())
    }

    async fn create(&self, release: &Release) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut metadata = self.read_metadata(&release.project, &release.workspace).await?;

        if metadata.releases.contains_key(&release.revision) {
            return Err(EngineError::Storage(StorageError::RevisionExists {
                revision: release.revision,
            }));
        }

        info!(
            "Creating release {} for {}/{}",
            release.revision, release.project, release.workspace
        );
        self.store(release, &mut metadata).await
    }

    async fn update(&self, release: &Release) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut metadata = self.read_metadata(&release.project, &release.workspace).await?;

        if !metadata.releases.contains_key(&release.revision) {
            return Err(EngineError::Storage(StorageError::RevisionNotFound {
                project: release.project.clone(),
                workspace: release.workspace.clone(),
                revision: release.revision,
            }));
        }

        debug!("Updating release {} ({})", release.revision, release.phase);
        self.store(release, &mut metadata).await
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::{Spec, State};
    use tempfile::TempDir;

    fn create_test_storage() -> (LocalReleaseStorage, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = LocalReleaseStorage::new(temp_dir.path());
        (storage, temp_dir)
    }

    fn release(revision: u64) -> Release {
        let state = State::new("shop", "dev", "base");
        Release::new(revision, Spec::default(), state, ReleasePhase::Generating)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (storage, _temp) = create_test_storage();

        storage.create(&release(1)).await.expect("Failed to create release");
        let loaded = storage.get("shop", "dev", 1).await.expect("Failed to load release");

        assert_eq!(loaded.revision, 1);
        assert_eq!(loaded.stack, "base");
        assert_eq!(storage.latest_revision("shop", "dev").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_empty_workspace() {
        let (storage, _temp) = create_test_storage();

        assert_eq!(storage.latest_revision("shop", "dev").await.unwrap(), None);
        assert!(storage.revisions("shop", "dev").await.unwrap().is_empty());

        let err = storage.get("shop", "dev", 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let (storage, _temp) = create_test_storage();

        storage.create(&release(1)).await.unwrap();
        let result = storage.create(&release(1)).await;
        assert!(matches!(
            result,
            Err(EngineError::Storage(StorageError::RevisionExists { revision: 1 }))
        ));
    }

    #[tokio::test]
    async fn test_update() {
        let (storage, _temp) = create_test_storage();

        let mut r = release(1);
        assert!(storage.update(&r).await.is_err());

        storage.create(&r).await.unwrap();
        r.set_phase(ReleasePhase::Succeeded);
        storage.update(&r).await.unwrap();

        let loaded = storage.get("shop", "dev", 1).await.unwrap();
        assert_eq!(loaded.phase, ReleasePhase::Succeeded);
    }

    #[tokio::test]
    async fn test_revisions_sorted() {
        let (storage, _temp) = create_test_storage();

        for revision in [2, 1, 3] {
            storage.create(&release(revision)).await.unwrap();
        }

        assert_eq!(storage.revisions("shop", "dev").await.unwrap(), vec![1, 2, 3]);
        assert_eq!(storage.latest_revision("shop", "dev").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_rejects_names_outside_base_dir() {
        let outside = TempDir::new().unwrap();
        let base = outside.path().join("releases");
        let storage = LocalReleaseStorage::new(&base);

        let state = State::new("../escape", "dev", "base");
        let escaping = Release::new(1, Spec::default(), state, ReleasePhase::Generating);
        let err = storage.create(&escaping).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!outside.path().join("escape").exists());
        assert!(!base.exists());

        let err = storage.revisions("shop", "..").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_failed_write_removes_temp_file() {
        let (storage, temp) = create_test_storage();
        let dir = temp.path().join("shop").join("dev");
        std::fs::create_dir_all(dir.join("1.json").join("occupied")).unwrap();

        let err = storage.create(&release(1)).await.unwrap_err();

        assert!(matches!(err, EngineError::Storage(StorageError::WriteFailed { .. })));
        assert!(!dir.join("1.tmp").exists());
        assert!(!dir.join(METADATA_FILE).exists());
    }

    #[tokio::test]
    async fn test_detects_tampered_file() {
        let (storage, temp) = create_test_storage();
        storage.create(&release(1)).await.unwrap();

        let path = temp.path().join("shop").join("dev").join("1.json");
        std::fs::write(&path, b"{\"tampered\": true}").unwrap();

        let result = storage.get("shop", "dev", 1).await;
        assert!(matches!(
            result,
            Err(EngineError::Storage(StorageError::Corrupted { .. }))
        ));
    }
}
