//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Each repository holds the SQL statements for a specific domain entity.

pub mod action;
pub mod pipeline;
pub mod stage;

// Re-export for convenience
pub use action as action_repository;
pub use pipeline as pipeline_repository;
pub use stage as stage_repository;
