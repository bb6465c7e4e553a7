// dashgate - Session-gated, offline-capable gateway for the case management dashboard
// Author: kelexine (https://github.com/kelexine)

pub mod cli;
pub mod config;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod offline;
pub mod server;
pub mod utils;
