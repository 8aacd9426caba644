//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Default directory release files are written under.
pub const DEFAULT_RELEASE_DIR: &str = ".kusion/releases";

/// Upper bound accepted for `max_concurrency`.
pub const MAX_CONCURRENCY_LIMIT: usize = 1024;

/// Tunables shared by every operation an engine runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of resource nodes running at once. Zero means unbounded.
    pub max_concurrency: usize,
    /// Dotted attribute paths excluded from drift detection on every resource.
    pub ignore_fields: Vec<String>,
    /// Root directory of the local release storage.
    pub release_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 0,
            ignore_fields: Vec::new(),
            release_dir: PathBuf::from(DEFAULT_RELEASE_DIR),
        }
    }
}

impl EngineConfig {
    /// Sets the concurrency bound.
    #[must_use]
    pub const fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Adds a globally ignored attribute path.
    #[must_use]
    pub fn with_ignore_field(mut self, path: impl Into<String>) -> Self {
        self.ignore_fields.push(path.into());
        self
    }

    /// Sets the release storage directory.
    #[must_use]
    pub fn with_release_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.release_dir = dir.into();
        self
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency > MAX_CONCURRENCY_LIMIT {
            return Err(ConfigError::validation(
                format!("must not exceed {MAX_CONCURRENCY_LIMIT}, got {}", self.max_concurrency),
                "max_concurrency",
            ));
        }

        for (i, path) in self.ignore_fields.iter().enumerate() {
            if path.is_empty() || path.split('.').any(str::is_empty) {
                return Err(ConfigError::validation(
                    format!("invalid attribute path '{path}'"),
                    format!("ignore_fields[{i}]"),
                ));
            }
        }

        if self.release_dir.as_os_str().is_empty() {
            return Err(ConfigError::validation("must not be empty", "release_dir"));
        }

        Ok(())
    }
}
