//! Configuration module for the reconciliation engine.
//!
//! This module handles:
//! - The [`EngineConfig`] tunables shared by every operation
//! - Loading them from YAML, `.env` files and `KUSION_*` variables

mod parser;
mod settings;

pub use parser::{ConfigParser, ENV_IGNORE_FIELDS, ENV_MAX_CONCURRENCY, ENV_RELEASE_DIR};
pub use settings::{EngineConfig, DEFAULT_RELEASE_DIR, MAX_CONCURRENCY_LIMIT};
