//! Tollgate Core
//!
//! Domain types, traits, and error handling for the Tollgate orchestrator.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used by the scheduler, the runner, and the CLI.

pub mod error;
pub mod events;
pub mod ids;
pub mod interpolation;
pub mod ports;
pub mod run;
pub mod task;
pub mod workflow;

pub use error::{Error, Result};
pub use ids::*;
