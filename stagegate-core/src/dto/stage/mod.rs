//! Stage DTOs

use serde::{Deserialize, Serialize};

use crate::domain::stage::Prerequisite;

/// Request to append a new stage to a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStage {
    pub pipeline_id: i64,
    pub name: String,
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
}
