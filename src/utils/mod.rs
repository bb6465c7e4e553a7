//! Utility functions and helpers for the dashgate gateway.
//!
//! # Submodules
//!
//! - `logging`: Tracing and logging initialization with token redaction.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod logging;
