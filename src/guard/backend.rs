// Hosted auth backend client
// Author: kelexine (https://github.com/kelexine)

use super::{Session, SessionOracle, TwoFactorDirectory, TwoFactorFlags};
use crate::config::BackendConfig;
use crate::error::{GateError, Result};
use axum::http::{header, HeaderMap};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// User record returned by `GET /auth/v1/user`.
#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

/// Pull the access token out of the session cookie, falling back to a
/// bearer `Authorization` header.
pub fn access_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    })
}

/// Client for the hosted backend's auth and REST endpoints.
///
/// Implements both [`SessionOracle`] and [`TwoFactorDirectory`].
#[derive(Clone)]
pub struct AuthBackendClient {
    http_client: Client,
    config: BackendConfig,
}

impl AuthBackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .use_rustls_tls()
            .build()
            .map_err(|e| GateError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            config: config.clone(),
        })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    async fn fetch_user(&self, token: &str) -> Result<Option<AuthUser>> {
        let url = format!("{}/auth/v1/user", self.base_url());
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .header("apikey", &self.config.api_key)
            .send()
            .await
            .map_err(|e| GateError::Backend(format!("Session lookup failed: {}", e)))?;

        match response.status() {
            StatusCode::OK => {
                let user = response
                    .json::<AuthUser>()
                    .await
                    .map_err(|e| GateError::Backend(format!("Invalid user payload: {}", e)))?;
                Ok(Some(user))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status => Err(GateError::Backend(format!(
                "Session lookup returned HTTP {}",
                status.as_u16()
            ))),
        }
    }
}

impl SessionOracle for AuthBackendClient {
    async fn lookup(&self, headers: &HeaderMap) -> Result<Option<Session>> {
        let Some(token) = access_token(headers, &self.config.session_cookie) else {
            debug!("No session token on request");
            return Ok(None);
        };

        Ok(self.fetch_user(&token).await?.map(|user| Session {
            access_token: token,
            user_id: user.id,
        }))
    }
}

impl TwoFactorDirectory for AuthBackendClient {
    async fn flags(&self, user_id: &str) -> Result<TwoFactorFlags> {
        let url = format!(
            "{}/rest/v1/{}?id=eq.{}&select=two_factor_enabled,two_factor_verified",
            self.base_url(),
            self.config.profiles_table,
            urlencoding::encode(user_id)
        );

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| GateError::Backend(format!("Two-factor lookup failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GateError::Backend(format!(
                "Two-factor lookup returned HTTP {}",
                status.as_u16()
            )));
        }

        let rows: Vec<TwoFactorFlags> = response
            .json()
            .await
            .map_err(|e| GateError::Backend(format!("Invalid profile payload: {}", e)))?;

        Ok(rows.into_iter().next().unwrap_or_default())
    }
}
