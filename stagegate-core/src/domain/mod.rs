//! Core domain types
//!
//! This module contains the domain structures shared by the stage store,
//! the orchestrator and the execution layer that consumes the stage graph.

pub mod action;
pub mod build;
pub mod stage;
