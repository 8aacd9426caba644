//! Logging setup and per-operation spans.

use tracing::Span;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::operation::OperationType;

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the verbosity flag when set. Calling this
/// twice is harmless; the second subscriber is ignored.
pub fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Creates the span an operation runs in, tagged with a fresh operation id.
#[must_use]
pub fn operation_span(operation: OperationType, project: &str, workspace: &str, stack: &str) -> Span {
    tracing::info_span!(
        "operation",
        id = %Uuid::new_v4(),
        kind = %operation,
        project = %project,
        workspace = %workspace,
        stack = %stack,
    )
}
