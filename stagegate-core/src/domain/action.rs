//! Action domain types

use serde::{Deserialize, Serialize};

/// Action placed in a stage
///
/// A placement binds a shared [`ActionDefinition`] to one stage. The
/// placement carries its own `enabled` flag and its parameters are the
/// definition defaults with the placement overrides applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Id of the shared action definition
    pub id: i64,
    /// Id of this stage placement
    pub pipeline_action_id: i64,
    pub pipeline_stage_id: i64,
    pub name: String,
    pub enabled: bool,
    pub last_modified: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

/// Shared action definition, owned by the action management service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub last_modified: chrono::DateTime<chrono::Utc>,
    /// Default parameters, in definition order
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

/// Named parameter of an action or a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub description: String,
}

impl Parameter {
    /// Creates a string parameter without description
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: "string".to_string(),
            value: value.into(),
            description: String::new(),
        }
    }
}
