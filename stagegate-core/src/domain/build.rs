//! Pipeline build domain types

use serde::{Deserialize, Serialize};

use super::action::Parameter;

/// One execution of a pipeline
///
/// Produced by the build-triggering service; the gating logic only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineBuild {
    pub id: i64,
    pub pipeline_id: i64,
    pub build_number: i64,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl PipelineBuild {
    /// Returns the value of the first parameter named `name`
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}
