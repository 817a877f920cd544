//! Data Transfer Objects
//!
//! Requests accepted by the stage store. DTOs carry only what a caller
//! supplies; identity, ordering and timestamps are assigned on write.

pub mod stage;
