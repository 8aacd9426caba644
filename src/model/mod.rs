//! Resource model shared by every engine stage.

mod action;
mod release;
mod resource;

pub use action::ActionType;
pub use release::{Release, ReleasePhase, State};
pub use resource::{
    index_resources, Resource, ResourceIndex, ResourceType, Spec, IGNORE_FIELDS_EXTENSION,
};
