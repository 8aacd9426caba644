//! Release storage trait definition.
//!
//! This module defines the common interface for release storage backends.
//! Releases are partitioned by project and workspace; revisions grow
//! monotonically inside one partition.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::Release;

/// Trait for release storage backends.
///
/// Every write is durable before the call returns.
#[async_trait]
pub trait ReleaseStorage: Send + Sync {
    /// Returns the highest stored revision, or `None` if nothing was stored.
    async fn latest_revision(&self, project: &str, workspace: &str) -> Result<Option<u64>>;

    /// Loads one revision.
    async fn get(&self, project: &str, workspace: &str, revision: u64) -> Result<Release>;

    /// Lists stored revisions in ascending order.
    async fn revisions(&self, project: &str, workspace: &str) -> Result<Vec<u64>>;

    /// Stores a new revision. Fails if the revision exists.
    async fn create(&self, release: &Release) -> Result<()>;

    /// Overwrites an existing revision. Fails if the revision does not exist.
    async fn update(&self, release: &Release) -> Result<()>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl ReleaseStorage for Box<dyn ReleaseStorage> {
    async fn latest_revision(&self, project: &str, workspace: &str) -> Result<Option<u64>> {
        (**self).latest_revision(project, workspace).await
    }

    async fn get(&self, project: &str, workspace: &str, revision: u64) -> Result<Release> {
        (**self).get(project, workspace, revision).await
    }

    async fn revisions(&self, project: &str, workspace: &str) -> Result<Vec<u64>> {
        (**self).revisions(project, workspace).await
    }

    async fn create(&self, release: &Release) -> Result<()> {
        (**self).create(release).await
    }

    async fn update(&self, release: &Release) -> Result<()> {
        (**self).update(release).await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}
