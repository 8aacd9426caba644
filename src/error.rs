//! Error types for the reconciliation engine.
//!
//! This module provides the error hierarchy for every stage of an operation:
//! request validation, graph construction, runtime adapter calls, release
//! storage, configuration and secret resolution. Callers classify an error
//! through [`EngineError::kind`].

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of an engine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself is malformed.
    InvalidArgument,
    /// The desired state cannot be turned into a valid execution graph.
    IllegalManifest,
    /// An adapter, storage backend or the engine itself failed.
    Internal,
    /// A requested record does not exist.
    NotFound,
    /// Benign condition, the operation returns early without failing.
    Warning,
}

/// The main error type for the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Request validation errors.
    #[error("Invalid request: {0}")]
    Request(#[from] RequestError),

    /// Graph construction errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Runtime adapter errors.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Release storage errors.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Secret resolution errors.
    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    /// A graph node failed during the walk.
    #[error("Failed to execute resource node '{id}': {source}")]
    NodeFailed {
        /// Key of the failed resource.
        id: String,
        /// Underlying failure.
        #[source]
        source: Box<EngineError>,
    },

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error, including recovered panics.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Request validation errors.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request carries no spec.
    #[error("request spec is empty; to delete all resources use the destroy operation")]
    MissingSpec,

    /// The spec declares the same resource key twice.
    #[error("duplicate resource key in spec: {id}")]
    DuplicateResource {
        /// The duplicated key.
        id: String,
    },

    /// A resource declares an empty key.
    #[error("resource at index {index} has an empty id")]
    EmptyResourceId {
        /// Position in the spec.
        index: usize,
    },

    /// A required request field is empty.
    #[error("request {field} must not be empty")]
    MissingField {
        /// Name of the empty field.
        field: &'static str,
    },

    /// A request field is used as a directory name but is not one.
    #[error("request {field} '{value}' must be a single path segment")]
    InvalidName {
        /// Name of the offending field.
        field: &'static str,
        /// Rejected value.
        value: String,
    },

    /// A release failed structural validation.
    #[error("invalid release: {reason}")]
    InvalidRelease {
        /// What is wrong with it.
        reason: String,
    },

    /// The release does not belong to the request.
    #[error("release {field} mismatch: request has '{expected}', release has '{found}'")]
    ReleaseMismatch {
        /// Field that differs.
        field: &'static str,
        /// Value carried by the request.
        expected: String,
        /// Value carried by the release.
        found: String,
    },
}

/// Graph construction errors.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Nothing to build.
    #[error("no resources to {operation}")]
    NoResources {
        /// Operation that found the empty set.
        operation: String,
    },

    /// The dependency graph contains a cycle.
    #[error("circular dependency detected: {cycle}")]
    CircularDependency {
        /// Description of the cycle members.
        cycle: String,
    },

    /// A dependency key cannot be found in the spec or the prior state.
    #[error("resource '{resource}' depends on '{dependency}', which is not found in spec or state")]
    UnresolvedDependency {
        /// The depending resource.
        resource: String,
        /// The missing dependency.
        dependency: String,
    },

    /// A resource removed from the spec is still depended upon.
    #[error("cannot delete resource '{resource}': resource '{dependent}' still depends on it")]
    DeleteBlocked {
        /// The resource scheduled for deletion.
        resource: String,
        /// The surviving resource that depends on it.
        dependent: String,
    },

    /// An implicit reference could not be resolved.
    #[error("cannot resolve reference '{reference}': {reason}")]
    UnresolvedReference {
        /// The full reference string.
        reference: String,
        /// Why it did not resolve.
        reason: String,
    },
}

/// Runtime adapter errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No adapter is registered for the resource type.
    #[error("no runtime registered for resource type {resource_type}")]
    Unsupported {
        /// The unsupported type.
        resource_type: String,
    },

    /// An adapter call failed.
    #[error("{operation} of resource '{id}' failed: {message}")]
    Adapter {
        /// Adapter operation name.
        operation: &'static str,
        /// Resource key.
        id: String,
        /// Message from the adapter.
        message: String,
    },

    /// An adapter call returned no usable resource.
    #[error("{operation} of resource '{id}' returned no resource")]
    EmptyResponse {
        /// Adapter operation name.
        operation: &'static str,
        /// Resource key.
        id: String,
    },
}

/// Release storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested revision does not exist.
    #[error("release revision {revision} not found for {project}/{workspace}")]
    RevisionNotFound {
        /// Project name.
        project: String,
        /// Workspace name.
        workspace: String,
        /// Missing revision.
        revision: u64,
    },

    /// A revision is created twice.
    #[error("release revision {revision} already exists")]
    RevisionExists {
        /// Existing revision.
        revision: u64,
    },

    /// Stored data is corrupted.
    #[error("release data is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Serialization error.
    #[error("release serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
    },

    /// Filesystem write failure.
    #[error("failed to write {path}: {message}")]
    WriteFailed {
        /// Path being written.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },
}

/// Secret resolution errors.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The reference string is malformed.
    #[error("malformed secret reference '{reference}'")]
    Malformed {
        /// The offending reference.
        reference: String,
    },

    /// The secret store has no such secret.
    #[error("secret '{name}' not found")]
    NotFound {
        /// Secret name.
        name: String,
    },

    /// The secret exists but the property does not.
    #[error("property '{property}' not found in secret '{name}'")]
    PropertyNotFound {
        /// Secret name.
        name: String,
        /// Missing property.
        property: String,
    },

    /// Backend failure.
    #[error("secret store error: {message}")]
    Backend {
        /// Description of the backend failure.
        message: String,
    },
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Wraps a failure of the resource node `id`.
    #[must_use]
    pub fn node_failed(id: impl Into<String>, source: Self) -> Self {
        Self::NodeFailed {
            id: id.into(),
            source: Box::new(source),
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Request(_) => ErrorKind::InvalidArgument,
            Self::Graph(GraphError::NoResources { .. }) => ErrorKind::Warning,
            Self::Graph(_) => ErrorKind::IllegalManifest,
            Self::Storage(StorageError::RevisionNotFound { .. }) => ErrorKind::NotFound,
            Self::Secret(SecretError::Malformed { .. }) => ErrorKind::IllegalManifest,
            Self::Config(_) => ErrorKind::InvalidArgument,
            Self::NodeFailed { source, .. } => source.kind(),
            Self::Runtime(RuntimeError::Unsupported { .. }) => ErrorKind::InvalidArgument,
            Self::Runtime(_)
            | Self::Storage(_)
            | Self::Secret(_)
            | Self::Io(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if the error only signals that there was nothing to do.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self.kind(), ErrorKind::Warning | ErrorKind::NotFound)
    }

    /// Returns the resource key of the failed node, if this error came out of a walk.
    #[must_use]
    pub fn failed_resource(&self) -> Option<&str> {
        match self {
            Self::NodeFailed { id, .. } => Some(id),
            _ => None,
        }
    }
}

impl RuntimeError {
    /// Creates an adapter failure for `operation` on resource `id`.
    #[must_use]
    pub fn adapter(operation: &'static str, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Adapter {
            operation,
            id: id.into(),
            message: message.into(),
        }
    }
}

impl StorageError {
    /// Creates a corruption error with the given message.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let err = EngineError::from(RequestError::MissingSpec);
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = EngineError::from(GraphError::CircularDependency {
            cycle: String::from("a -> b -> a"),
        });
        assert_eq!(err.kind(), ErrorKind::IllegalManifest);

        let err = EngineError::from(GraphError::NoResources {
            operation: String::from("apply"),
        });
        assert!(err.is_benign());
    }

    #[test]
    fn test_node_failed_inherits_kind() {
        let inner = EngineError::from(RuntimeError::adapter("apply", "a", "boom"));
        let err = EngineError::node_failed("a", inner);

        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.failed_resource(), Some("a"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_delete_blocked_names_both_resources() {
        let err = EngineError::from(GraphError::DeleteBlocked {
            resource: String::from("vpc"),
            dependent: String::from("vswitch"),
        });
        let message = err.to_string();

        assert!(message.contains("vpc"));
        assert!(message.contains("vswitch"));
    }
}
