// ============================================================================
// Linting
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // Public items should be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Kusion Engine
//!
//! A resource-graph reconciliation engine: given a desired set of resources
//! and the state recorded by the previous release, it computes and executes
//! the create, update and delete actions that converge live infrastructure.
//!
//! ## Architecture
//!
//! 1. **Graph Builder**: turns the spec and the prior state into an acyclic
//!    graph, with explicit and `$kusion_path.` references as edges
//! 2. **Graph Walker**: runs every vertex once its dependencies succeeded,
//!    with bounded concurrency
//! 3. **Node Executor**: compares prior, desired and live versions, then
//!    applies, deletes, imports or leaves the resource alone
//! 4. **Release Storage**: persists the working state after every node
//!
//! ## Modules
//!
//! - [`model`]: Resources, specs, states and releases
//! - [`reference`]: Implicit and secret reference handling
//! - [`graph`]: Graph construction and traversal
//! - [`runtime`]: Runtime adapter contract
//! - [`operation`]: Apply, preview, destroy and watch
//! - [`release`]: Release storage backends
//! - [`config`]: Engine configuration
//! - [`engine`]: The [`Engine`] facade
//!
//! ## Example
//!
//! ```no_run
//! use kusion_engine::{Engine, EngineConfig, Request, RuntimeRegistry, Spec};
//!
//! # async fn run(registry: RuntimeRegistry, spec: Spec) -> kusion_engine::Result<()> {
//! let engine = Engine::with_local_storage(registry, EngineConfig::default())?;
//! let request = Request::new("shop", "dev", "base").with_spec(spec);
//!
//! let preview = engine.preview(&request, None).await?;
//! println!("{}", preview.change_order);
//!
//! engine.apply(&request, None).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod model;
pub mod operation;
pub mod reference;
pub mod release;
pub mod runtime;
pub mod telemetry;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ConfigParser, EngineConfig};
pub use engine::Engine;
pub use error::{EngineError, ErrorKind, Result};
pub use graph::{ExecutionGraph, GraphBuilder, Walker};
pub use model::{ActionType, Release, ReleasePhase, Resource, ResourceType, Spec, State};
pub use operation::{
    ApplyResponse, ChangeOrder, ChangeStep, DestroyResponse, Message, OpResult, OperationType,
    PreviewResponse, Request,
};
pub use reference::{MemorySecretStore, SecretStore};
pub use release::{LocalReleaseStorage, MemoryReleaseStorage, ReleaseManager, ReleaseStorage};
pub use runtime::{Runtime, RuntimeRegistry};
