//! Release persistence.
//!
//! This module provides:
//! - The [`ReleaseStorage`] trait
//! - Local file and in-memory backends
//! - The [`ReleaseManager`] that allocates revisions

mod digest;
mod local;
mod manager;
mod memory;
mod store;

pub use digest::{checksum, verify};
pub use local::LocalReleaseStorage;
pub use manager::{validate_release, ReleaseManager};
pub(crate) use manager::check_segment;
pub use memory::MemoryReleaseStorage;
pub use store::ReleaseStorage;
