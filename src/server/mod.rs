//! Axum-based HTTP server implementation for the dashgate gateway.
//!
//! This module is responsible for setting up the HTTP server, configuring
//! routes, and sending dashboard traffic through the route guard and the
//! offline cache worker.
//!
//! # Components
//!
//! - `handlers`: Gateway endpoints (health, metrics, worker events) and the proxy fallback.
//! - `middleware`: Request ID tracking and the route guard layer.
//! - `routes`: The main router configuration that ties everything together.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod handlers;
mod middleware;
mod routes;

pub use routes::{create_router, AppState, BackendGuard};
