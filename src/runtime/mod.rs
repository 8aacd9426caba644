//! Runtime adapter interfaces.
//!
//! Concrete adapters (Kubernetes, Terraform) live outside this crate; the
//! engine only depends on the [`Runtime`] trait and looks adapters up through
//! a [`RuntimeRegistry`].

mod adapter;
mod registry;

#[cfg(test)]
pub(crate) mod fake;

pub use adapter::{
    ApplyRequest, DeleteRequest, ImportRequest, ReadRequest, Runtime, WatchEvent, WatchEventKind,
    WatchRequest,
};
#[cfg(test)]
pub use adapter::MockRuntime;
pub use registry::RuntimeRegistry;
