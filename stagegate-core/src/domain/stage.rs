//! Stage domain types

use serde::{Deserialize, Serialize};

use super::action::Action;

/// Pipeline stage
///
/// Structure shared between orchestrator (persists) and the execution layer
/// (runs the actions of eligible stages in `build_order`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: i64,
    pub pipeline_id: i64,
    pub name: String,
    /// Position within the pipeline, dense over `1..=N`
    pub build_order: i32,
    pub enabled: bool,
    pub last_modified: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Stage {
    /// Adds a prerequisite unless the same (parameter, expected value) pair
    /// is already present. Returns whether it was added.
    pub fn add_prerequisite(&mut self, prerequisite: Prerequisite) -> bool {
        if self.prerequisites.contains(&prerequisite) {
            return false;
        }
        self.prerequisites.push(prerequisite);
        true
    }
}

/// Condition on a build parameter that gates a stage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prerequisite {
    pub parameter: String,
    pub expected_value: String,
}

impl Prerequisite {
    pub fn new(parameter: impl Into<String>, expected_value: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            expected_value: expected_value.into(),
        }
    }
}
