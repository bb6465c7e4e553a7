// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::error::{GateError, Result};
use crate::guard::Session;
use crate::metrics;
use crate::offline::{
    Clients, FetchRequest, FetchResponse, MessageOutcome, Notification, OfflineWorker, PushPayload, UpstreamClient,
    WindowAction, WorkerMessage,
};
use axum::{
    body::{to_bytes, Bytes},
    extract::{Query, Request, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Extension, Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HashMap<String, HealthCheck>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut checks = HashMap::new();
    let mut overall_status = HealthStatus::Healthy;
    let platform = state.host.platform();

    // Offline worker
    let worker_check = match state.host.controller() {
        Some(worker) => HealthCheck {
            status: "ok".to_string(),
            message: format!(
                "Generation {} is {} with {} entries",
                worker.cache_name(),
                worker.state().as_str(),
                platform.storage.len(worker.cache_name())
            ),
        },
        None => {
            // Requests still pass through to the origin. Without a worker
            // after a start-up install, that install failed.
            overall_status = if state.config.offline.precache_on_start {
                HealthStatus::Unhealthy
            } else {
                HealthStatus::Degraded
            };
            HealthCheck {
                status: "warning".to_string(),
                message: "No active worker, serving from network only".to_string(),
            }
        }
    };
    checks.insert("offline_worker".to_string(), worker_check);

    if let Some(waiting) = state.host.waiting() {
        checks.insert(
            "waiting_worker".to_string(),
            HealthCheck {
                status: "ok".to_string(),
                message: format!("Generation {} is waiting", waiting.cache_name()),
            },
        );
    }

    checks.insert(
        "clients".to_string(),
        HealthCheck {
            status: "ok".to_string(),
            message: format!("{} connected", platform.clients.len()),
        },
    );

    checks.insert(
        "configuration".to_string(),
        HealthCheck {
            status: "ok".to_string(),
            message: format!(
                "Upstream: {}, backend: {}",
                state.config.upstream.url, state.config.backend.url
            ),
        },
    );

    Json(HealthResponse {
        status: overall_status,
        checks,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

/// Every dashboard request that made it past the guard. Responses for a
/// signed-in user are cached in that user's partition.
pub async fn proxy_handler(
    State(state): State<AppState>,
    session: Option<Extension<Session>>,
    request: Request,
) -> Result<Response> {
    let started = Instant::now();
    let method = request.method().clone();
    let result = forward(&state, session, request).await;
    let status = match &result {
        Ok(response) => response.status.as_u16(),
        Err(e) => e.status_code().as_u16(),
    };
    metrics::record_request(method.as_str(), status, "proxy", started.elapsed().as_secs_f64());
    Ok(result?.into_response())
}

async fn forward(
    state: &AppState,
    session: Option<Extension<Session>>,
    request: Request,
) -> Result<FetchResponse> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, state.config.performance.max_body_bytes)
        .await
        .map_err(|e| GateError::InvalidRequest(format!("Failed to read request body: {}", e)))?;

    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let fetch = FetchRequest {
        method: parts.method,
        url,
        headers: parts.headers,
        body,
        partition: session.map(|Extension(session)| session.user_id),
    };

    state.host.fetch(fetch).await
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub url: Option<String>,
}

/// Removes the client from the registry when its stream is dropped.
struct Disconnect {
    clients: Clients,
    id: Uuid,
}

impl Drop for Disconnect {
    fn drop(&mut self) {
        self.clients.disconnect(&self.id);
    }
}

/// Server-sent event stream for one open dashboard instance.
pub async fn events_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let clients = state.host.platform().clients.clone();
    let url = query.url.unwrap_or_else(|| "/".to_string());
    let (id, mut receiver) = clients.connect(&url, &session.user_id);

    let stream = async_stream::stream! {
        let _disconnect = Disconnect { clients, id };
        yield Ok(Event::default().event("connected").data(id.to_string()));

        while let Some(message) = receiver.recv().await {
            match Event::default().event(message.kind()).json_data(&message) {
                Ok(event) => yield Ok(event),
                Err(e) => warn!("Failed to encode {}: {}", message.kind(), e),
            }
        }
        debug!("Event stream for client {} ended", id);
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn controller(state: &AppState) -> Result<Arc<OfflineWorker<UpstreamClient>>> {
    state.host.controller().ok_or(GateError::NoController)
}

/// Page → worker message.
pub async fn message_handler(
    State(state): State<AppState>,
    Json(message): Json<WorkerMessage>,
) -> Result<Json<MessageOutcome>> {
    debug!("Received {} from page", message.kind());
    Ok(Json(state.host.post_message(message)?))
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub tag: String,
}

/// Background sync trigger.
pub async fn sync_handler(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<serde_json::Value>> {
    let clients = controller(&state)?.on_sync(&request.tag);
    Ok(Json(json!({ "tag": request.tag, "clients": clients })))
}

#[derive(Debug, Deserialize)]
pub struct PushQuery {
    /// Deliver to this user's clients only.
    #[serde(default)]
    pub user: Option<String>,
}

/// Push delivery. The body is the raw push data.
pub async fn push_handler(
    State(state): State<AppState>,
    Query(query): Query<PushQuery>,
    body: Bytes,
) -> Result<Json<Notification>> {
    let payload = PushPayload::parse(&body);
    Ok(Json(controller(&state)?.on_push(payload, query.user.as_deref())))
}

#[derive(Debug, Deserialize)]
pub struct NotificationClick {
    pub url: String,
}

pub async fn notification_click_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(click): Json<NotificationClick>,
) -> Result<Json<WindowAction>> {
    Ok(Json(
        controller(&state)?.on_notification_click(&click.url, &session.user_id),
    ))
}

/// Explicit request for notification permission.
pub async fn permission_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let permission = state.host.platform().notifications.request();
    Json(json!({ "permission": permission }))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub cache_name: String,
}

/// Roll out a new cache generation.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response> {
    let cache_name = request.cache_name.trim();
    if cache_name.is_empty() {
        return Err(GateError::InvalidRequest("cache_name must not be empty".to_string()));
    }

    let worker = state.host.register(cache_name).await?;
    info!("Registered {} ({})", worker.cache_name(), worker.state().as_str());

    let body = json!({
        "cache_name": worker.cache_name(),
        "state": worker.state().as_str(),
        "generations": state.host.platform().storage.keys(),
    });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

