//! Stagegate Core
//!
//! Core types and pure logic for stage ordering and gating.
//!
//! This crate contains:
//! - Domain types: stages, prerequisites, actions, builds
//! - DTOs: requests accepted by the stage store
//! - Build-order shift arithmetic used to keep stage ordering dense
//! - Prerequisite evaluation and action parameter merging
//!
//! Note: Persistence lives in the orchestrator; nothing here performs I/O.

pub mod domain;
pub mod dto;
pub mod ordering;
pub mod parameters;
pub mod prerequisite;
