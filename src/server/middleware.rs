// HTTP middleware
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::error::GateError;
use crate::guard::GuardDecision;
use crate::metrics;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use sha2::{Digest, Sha256};
use std::time::Instant;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{debug, warn};

/// Create request ID layers for the application
pub fn request_id_layers() -> (SetRequestIdLayer<MakeRequestUuid>, PropagateRequestIdLayer) {
    (
        SetRequestIdLayer::x_request_id(MakeRequestUuid),
        PropagateRequestIdLayer::x_request_id(),
    )
}

/// Gate a request behind the session and two-factor checks.
///
/// Redirects are `307 Temporary Redirect`. Login redirects carry the
/// requested location in `next`. Non-canonical paths get `400`. The
/// resolved session travels on as a request extension.
pub async fn guard_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let started = Instant::now();
    let path = request.uri().path().to_string();
    let headers = request.headers().clone();

    let (decision, session) = state.guard.check(&headers, &path).await;
    let target = match decision {
        GuardDecision::Allow => {
            if let Some(session) = session {
                request.extensions_mut().insert(session);
            }
            return next.run(request).await;
        }
        GuardDecision::Reject => {
            metrics::record_request(request.method().as_str(), 400, "rejected", started.elapsed().as_secs_f64());
            return GateError::InvalidRequest("path must not contain dot segments".to_string()).into_response();
        }
        _ => decision.redirect_target(state.guard.policy()).unwrap_or("/"),
    };

    let location = if decision == GuardDecision::RedirectLogin {
        let original = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(path.as_str());
        format!("{}?next={}", target, urlencoding::encode(original))
    } else {
        target.to_string()
    };

    debug!("Redirecting {} to {}", path, location);
    metrics::record_request(
        request.method().as_str(),
        307,
        "redirect",
        started.elapsed().as_secs_f64(),
    );
    Redirect::temporary(&location).into_response()
}

/// Worker endpoints used by dashboard pages: a session is required and
/// handed to the handler as an extension.
pub async fn session_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let headers = request.headers().clone();
    match state.guard.session(&headers).await {
        Some(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        None => GateError::Unauthorized("a signed-in session is required".to_string()).into_response(),
    }
}

/// Operator endpoints: `Authorization: Bearer <server.operator_token>`.
pub async fn operator_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if operator_token_matches(&state.config.server.operator_token, request.headers()) {
        return next.run(request).await;
    }

    warn!("Rejected operator request to {}", request.uri().path());
    GateError::Unauthorized("operator token required".to_string()).into_response()
}

/// Compares digests so the check does not stop at the first differing byte.
fn operator_token_matches(expected: &str, headers: &HeaderMap) -> bool {
    if expected.is_empty() {
        return false;
    }
    let Some(given) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    else {
        return false;
    };
    Sha256::digest(given.trim().as_bytes()) == Sha256::digest(expected.as_bytes())
}
