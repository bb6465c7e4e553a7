// HTTP routes configuration
// Author: kelexine (https://github.com/kelexine)

use super::handlers::{
    events_handler, health_handler, message_handler, metrics_handler, notification_click_handler,
    permission_handler, proxy_handler, push_handler, register_handler, sync_handler,
};
use super::middleware::{guard_middleware, operator_middleware, request_id_layers, session_middleware};
use crate::config::AppConfig;
use crate::error::Result;
use crate::guard::{AuthBackendClient, RouteGuard};
use crate::offline::{UpstreamClient, WorkerHost};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

/// Route guard backed by the hosted auth service.
pub type BackendGuard = RouteGuard<AuthBackendClient, AuthBackendClient>;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub host: Arc<WorkerHost<UpstreamClient>>,
    pub guard: Arc<BackendGuard>,
}

pub fn create_router(
    config: AppConfig,
    host: Arc<WorkerHost<UpstreamClient>>,
    guard: BackendGuard,
) -> Result<Router> {
    let body_limit = config.performance.max_body_bytes;
    let enable_compression = config.performance.enable_compression;

    let state = AppState {
        config,
        host,
        guard: Arc::new(guard),
    };

    let (set_request_id, propagate_request_id) = request_id_layers();

    // Everything that is not a gateway endpoint goes through the guard and
    // then the offline worker.
    let proxy = Router::new()
        .fallback(proxy_handler)
        .layer(middleware::from_fn_with_state(state.clone(), guard_middleware));

    // Endpoints the dashboard pages talk to.
    let page_endpoints = Router::new()
        .route("/sw/events", get(events_handler))
        .route("/sw/message", post(message_handler))
        .route("/sw/sync", post(sync_handler))
        .route("/sw/notification-click", post(notification_click_handler))
        .route("/sw/notifications/permission", post(permission_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), session_middleware));

    // Endpoints driven by the deployment, not by users.
    let operator_endpoints = Router::new()
        .route("/sw/register", post(register_handler))
        .route("/sw/push", post(push_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), operator_middleware));

    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(page_endpoints)
        .merge(operator_endpoints)
        .merge(proxy)
        .layer(tower_http::limit::RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state);

    if enable_compression {
        app = app.layer(CompressionLayer::new());
    }

    Ok(app)
}
