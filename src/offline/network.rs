// Network access for the offline worker
// Author: kelexine (https://github.com/kelexine)

use super::storage::RequestKey;
use crate::config::UpstreamConfig;
use crate::error::{GateError, Result};
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use reqwest::{redirect, Client, Url};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Body of the synthetic response returned when nothing can be served.
pub const OFFLINE_BODY: &str = "Offline - content not available";

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

/// An outgoing request as seen by the worker.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    /// Path and query, or an absolute URL for other origins.
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Cache partition for responses tied to a session (the user id).
    /// `None` is the shared partition holding public content.
    pub partition: Option<String>,
}

impl FetchRequest {
    pub fn get(url: &str) -> Self {
        Self {
            method: Method::GET,
            url: url.to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            partition: None,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: &'static str) -> Self {
        self.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    pub fn for_partition(mut self, partition: Option<String>) -> Self {
        self.partition = partition;
        self
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url).in_partition(self.partition.clone())
    }

    /// Anything not starting with `/` is an absolute URL.
    pub fn is_absolute(&self) -> bool {
        !self.url.starts_with('/')
    }

    /// The path component, without query.
    pub fn path(&self) -> &str {
        let without_origin = match self.url.find("://") {
            Some(scheme_end) if self.is_absolute() => {
                let rest = &self.url[scheme_end + 3..];
                rest.find(['/', '?', '#']).map(|i| &rest[i..]).unwrap_or("/")
            }
            _ => self.url.as_str(),
        };
        match without_origin.split(['?', '#']).next() {
            Some(path) if !path.is_empty() => path,
            _ => "/",
        }
    }

    /// Host of an absolute URL, `None` for origin-relative requests.
    pub fn host(&self) -> Option<String> {
        if !self.is_absolute() {
            return None;
        }
        Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(|h| h.to_string()))
    }

    /// Whether the caller expects an HTML document.
    pub fn accepts_html(&self) -> bool {
        self.headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|value| value.contains("text/html"))
    }
}

/// A response produced by the network, the cache or the worker itself.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Same-origin ("basic") response.
    pub same_origin: bool,
}

impl FetchResponse {
    /// Only plain successful same-origin responses the origin lets us
    /// store are worth keeping.
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK
            && self.same_origin
            && !has_token(&self.headers, &header::CACHE_CONTROL, &["no-store"])
    }

    /// Responses that depend on the caller's credentials. They may only
    /// be cached in that caller's partition.
    pub fn is_private(&self) -> bool {
        has_token(&self.headers, &header::CACHE_CONTROL, &["private"])
            || has_token(&self.headers, &header::VARY, &["cookie", "authorization", "*"])
    }

    /// Synthetic 503 used when neither network nor cache can answer.
    pub fn offline() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            headers,
            body: Bytes::from_static(OFFLINE_BODY.as_bytes()),
            same_origin: true,
        }
    }
}

impl IntoResponse for FetchResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        for (name, value) in self.headers.iter() {
            if !is_hop_by_hop(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        response
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Whether a comma-separated header carries one of `wanted`
/// (case-insensitive, `token=value` forms included).
fn has_token(headers: &HeaderMap, name: &HeaderName, wanted: &[&str]) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .any(|token| {
            wanted.iter().any(|w| {
                token == *w || token.strip_prefix(w).is_some_and(|rest| rest.starts_with('='))
            })
        })
}

/// Something that can perform a fetch.
pub trait Network: Send + Sync {
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = std::result::Result<FetchResponse, NetworkError>> + Send;
}

/// `reqwest` client for the dashboard origin.
#[derive(Clone)]
pub struct UpstreamClient {
    http_client: Client,
    base_url: Url,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig, pool_size: usize) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| GateError::Config(format!("Invalid upstream.url {:?}: {}", config.url, e)))?;

        // Redirects go back to the browser untouched.
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(pool_size)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .redirect(redirect::Policy::none())
            .use_rustls_tls()
            .build()
            .map_err(|e| GateError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Target URL for a request. Origin-relative targets always stay on the
    /// configured origin; their path is set verbatim, never joined.
    fn resolve(&self, target: &str) -> std::result::Result<Url, NetworkError> {
        if !target.starts_with('/') {
            return Url::parse(target)
                .map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", target, e)));
        }
        let target = target.split('#').next().unwrap_or(target);
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };
        if path.starts_with("//") || path.contains('\\') {
            return Err(NetworkError::InvalidUrl(format!(
                "{}: not an origin-relative path",
                target
            )));
        }

        let mut url = self.base_url.clone();
        url.set_path(path);
        url.set_query(query);
        Ok(url)
    }
}

impl Network for UpstreamClient {
    async fn fetch(&self, request: &FetchRequest) -> std::result::Result<FetchResponse, NetworkError> {
        let url = self.resolve(&request.url)?;
        let same_origin = url.origin() == self.base_url.origin();

        // Session credentials never leave the dashboard origin.
        let mut headers = HeaderMap::new();
        for (name, value) in request.headers.iter() {
            let credential = *name == header::COOKIE || *name == header::AUTHORIZATION;
            if !is_hop_by_hop(name) && (same_origin || !credential) {
                headers.append(name.clone(), value.clone());
            }
        }

        debug!("Fetching {} {} from network", request.method, url);

        let response = self
            .http_client
            .request(request.method.clone(), url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| NetworkError::Unreachable(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError::Unreachable(e.to_string()))?;

        Ok(FetchResponse {
            status,
            headers,
            body,
            same_origin,
        })
    }
}
