//! Operation requests.

use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::model::Spec;
use crate::release::check_segment;

/// Input shared by every operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    /// Project name.
    pub project: String,
    /// Workspace name.
    pub workspace: String,
    /// Stack name.
    pub stack: String,
    /// Who runs the operation.
    #[serde(default = "default_operator")]
    pub operator: String,
    /// Desired state. Required by apply and preview, ignored by destroy.
    #[serde(default)]
    pub spec: Option<Spec>,
}

impl Request {
    /// Creates a request without a spec, run by the current process.
    #[must_use]
    pub fn new(project: impl Into<String>, workspace: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            workspace: workspace.into(),
            stack: stack.into(),
            operator: default_operator(),
            spec: None,
        }
    }

    /// Sets the desired state.
    #[must_use]
    pub fn with_spec(mut self, spec: Spec) -> Self {
        self.spec = Some(spec);
        self
    }

    /// Sets the operator.
    #[must_use]
    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = operator.into();
        self
    }

    /// Checks the coordinates of the request.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first empty coordinate, or a project or
    /// workspace that is not a plain directory name.
    pub fn validate_target(&self) -> Result<(), RequestError> {
        check_segment("project", &self.project)?;
        check_segment("workspace", &self.workspace)?;
        if self.stack.is_empty() {
            return Err(RequestError::MissingField { field: "stack" });
        }
        Ok(())
    }

    /// Checks the request for apply and preview, returning its spec.
    ///
    /// # Errors
    ///
    /// Returns an error if a coordinate is empty, the spec is missing, or a
    /// resource key is empty or duplicated.
    pub fn validate_spec(&self) -> Result<&Spec, RequestError> {
        self.validate_target()?;
        let spec = self.spec.as_ref().ok_or(RequestError::MissingSpec)?;

        if let Some(index) = spec.resources.iter().position(|r| r.id.is_empty()) {
            return Err(RequestError::EmptyResourceId { index });
        }
        if let Some(id) = spec.first_duplicate() {
            return Err(RequestError::DuplicateResource { id: id.to_string() });
        }
        Ok(spec)
    }
}

/// Identifies the current process as `<hostname>-<pid>`.
#[must_use]
pub fn default_operator() -> String {
    let hostname = hostname::get().map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());
    format!("{hostname}-{}", std::process::id())
}
