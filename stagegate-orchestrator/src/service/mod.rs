//! Service Module
//!
//! Business logic layer of the stage core.
//! Services drive the persistence port and contain the ordering rules.

pub mod composition;
pub mod orchestrator;
pub mod stage;

// Re-export for convenience
pub use orchestrator::StageOrchestrator;
pub use stage::StageStore;
