//! Error types for stage operations

use stagegate_core::prerequisite::EvaluationError;
use thiserror::Error;

/// Result type alias for stage operations
pub type Result<T> = std::result::Result<T, StageError>;

/// Errors returned by the stage store and orchestrator
#[derive(Debug, Error)]
pub enum StageError {
    /// No stage with this id in the pipeline
    #[error("Stage {stage_id} not found in pipeline {pipeline_id}")]
    StageNotFound { pipeline_id: i64, stage_id: i64 },

    /// Action definition referenced by a placement does not exist
    #[error("Action {0} not found")]
    ActionNotFound(i64),

    /// Storage or transport failure
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Placement override blob is not a valid parameter list
    #[error("Cannot decode parameters of pipeline action {pipeline_action_id}: {source}")]
    Decode {
        pipeline_action_id: i64,
        #[source]
        source: serde_json::Error,
    },

    /// Prerequisite could not be evaluated
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// Request rejected before touching storage
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl StageError {
    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::StageNotFound { .. } | Self::ActionNotFound(_))
    }
}
