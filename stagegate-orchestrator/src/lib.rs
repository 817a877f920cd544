//! Stagegate Orchestrator
//!
//! Storage-backed stage management for pipelines: ordered stages, their
//! prerequisites, hydrated actions and eligibility checks against builds.

pub mod actions;
pub mod config;
pub mod db;
pub mod error;
pub mod persistence;
pub mod repository;
pub mod service;

pub use error::{Result, StageError};
pub use service::{StageOrchestrator, StageStore};
