//! Change reporting.
//!
//! Every visited node records a [`ChangeStep`]; the [`ChangeOrder`] keeps
//! them in the order nodes finished.

use serde::Serialize;
use std::collections::HashMap;

use crate::model::{ActionType, Resource};

use super::diff::{diff_values, FieldDiff};

/// Change decided for one resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeStep {
    /// Resource key.
    pub id: String,
    /// Decided action.
    pub action: ActionType,
    /// Version before the change.
    pub from: Option<Resource>,
    /// Version after the change.
    pub to: Option<Resource>,
}

/// Counts of decided actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    /// Resources to create.
    pub create: usize,
    /// Resources to update.
    pub update: usize,
    /// Resources to delete.
    pub delete: usize,
    /// Resources already converged.
    pub unchanged: usize,
}

/// Ordered collection of change steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeOrder {
    /// Keys in insertion order.
    pub step_keys: Vec<String>,
    /// Steps by key.
    pub change_steps: HashMap<String, ChangeStep>,
}

impl ChangeStep {
    /// Creates a step.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        action: ActionType,
        from: Option<Resource>,
        to: Option<Resource>,
    ) -> Self {
        Self {
            id: id.into(),
            action,
            from,
            to,
        }
    }

    /// Lists the attribute differences between `from` and `to`.
    #[must_use]
    pub fn diff(&self) -> Vec<FieldDiff> {
        let null = serde_json::Value::Null;
        let from = self.from.as_ref().map_or(&null, |r| &r.attributes);
        let to = self.to.as_ref().map_or(&null, |r| &r.attributes);
        diff_values(from, to)
    }
}

impl ChangeOrder {
    /// Creates an empty change order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `step`. A second step for the same key replaces the first and
    /// keeps its position.
    pub fn insert(&mut self, step: ChangeStep) {
        if !self.change_steps.contains_key(&step.id) {
            self.step_keys.push(step.id.clone());
        }
        self.change_steps.insert(step.id.clone(), step);
    }

    /// Gets the step of `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ChangeStep> {
        self.change_steps.get(id)
    }

    /// Iterates steps in insertion order.
    pub fn steps(&self) -> impl Iterator<Item = &ChangeStep> {
        self.step_keys
            .iter()
            .filter_map(|key| self.change_steps.get(key))
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.step_keys.len()
    }

    /// Returns true if no step was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.step_keys.is_empty()
    }

    /// Counts steps per action.
    #[must_use]
    pub fn summary(&self) -> ChangeSummary {
        let mut summary = ChangeSummary::default();
        for step in self.steps() {
            match step.action {
                ActionType::Create => summary.create += 1,
                ActionType::Update => summary.update += 1,
                ActionType::Delete => summary.delete += 1,
                ActionType::UnChanged => summary.unchanged += 1,
                ActionType::Undefined => {}
            }
        }
        summary
    }

    /// Returns true if every step is `UnChanged`.
    #[must_use]
    pub fn all_unchanged(&self) -> bool {
        self.steps().all(|step| step.action == ActionType::UnChanged)
    }
}

impl std::fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.unchanged
        )
    }
}

impl std::fmt::Display for ChangeOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for step in self.steps() {
            writeln!(f, "{} {} ({})", step.action.symbol(), step.id, step.action)?;
            if step.action == ActionType::Update {
                for diff in step.diff() {
                    writeln!(f, "    {diff}")?;
                }
            }
        }
        write!(f, "Summary: {}", self.summary())
    }
}
