//! Route protection for the dashboard.
//!
//! Every navigation is checked against the hosted backend's session and,
//! for accounts that enrolled a second factor, against the per-user
//! two-factor flags. The outcome is a [`GuardDecision`] the server layer
//! turns into a pass-through or a redirect.
//!
//! # Components
//!
//! - `policy`: the pure decision table over configured paths.
//! - `backend`: `reqwest` client for the hosted auth and data APIs.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod backend;
mod policy;

pub use backend::{access_token, AuthBackendClient};
pub use policy::RoutePolicy;

use crate::error::Result;
use crate::metrics;
use crate::utils::logging::sanitize;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, warn};

/// Authenticated identity issued by the hosted auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub user_id: String,
}

/// Per-user second factor state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoFactorFlags {
    #[serde(default, rename = "two_factor_enabled")]
    pub enabled: bool,
    #[serde(default, rename = "two_factor_verified")]
    pub verified: bool,
}

impl TwoFactorFlags {
    pub fn requires_challenge(&self) -> bool {
        self.enabled && !self.verified
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// The path is not canonical and is refused outright.
    Reject,
    RedirectLogin,
    RedirectDashboard,
    RedirectTwoFactor,
}

impl GuardDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardDecision::Allow => "allow",
            GuardDecision::Reject => "reject",
            GuardDecision::RedirectLogin => "redirect_login",
            GuardDecision::RedirectDashboard => "redirect_dashboard",
            GuardDecision::RedirectTwoFactor => "redirect_two_factor",
        }
    }

    /// Where the visitor is sent, `None` unless this is a redirect.
    pub fn redirect_target<'a>(&self, policy: &'a RoutePolicy) -> Option<&'a str> {
        match self {
            GuardDecision::Allow | GuardDecision::Reject => None,
            GuardDecision::RedirectLogin => Some(&policy.login_path),
            GuardDecision::RedirectDashboard => Some(&policy.dashboard_path),
            GuardDecision::RedirectTwoFactor => Some(&policy.two_factor_challenge_path),
        }
    }
}

/// Resolves the session attached to a request.
pub trait SessionOracle: Send + Sync {
    fn lookup(&self, headers: &HeaderMap) -> impl Future<Output = Result<Option<Session>>> + Send;
}

/// Looks up two-factor flags by user id.
pub trait TwoFactorDirectory: Send + Sync {
    fn flags(&self, user_id: &str) -> impl Future<Output = Result<TwoFactorFlags>> + Send;
}

/// Session and two-factor gate in front of every dashboard route.
pub struct RouteGuard<S, D> {
    policy: RoutePolicy,
    sessions: S,
    directory: D,
}

impl<S: SessionOracle, D: TwoFactorDirectory> RouteGuard<S, D> {
    pub fn new(policy: RoutePolicy, sessions: S, directory: D) -> Self {
        Self {
            policy,
            sessions,
            directory,
        }
    }

    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    /// Resolve the session on `headers`. A failed lookup counts as no
    /// session.
    pub async fn session(&self, headers: &HeaderMap) -> Option<Session> {
        match self.sessions.lookup(headers).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Session lookup failed: {}", sanitize(&e.to_string()));
                metrics::record_guard_lookup_failure("session");
                None
            }
        }
    }

    /// Decide what happens to a request for `path`.
    ///
    /// Non-canonical paths are rejected before anything else. One session
    /// lookup per request. The flags lookup only happens for a session
    /// outside the auth prefix and outside the two-factor pages. Both
    /// lookups fail closed: a failed session lookup counts as "no session",
    /// a failed flags lookup sends the visitor to login.
    pub async fn evaluate(&self, headers: &HeaderMap, path: &str) -> GuardDecision {
        self.check(headers, path).await.0
    }

    /// Like [`RouteGuard::evaluate`], also returning the session that was
    /// resolved on the way.
    pub async fn check(&self, headers: &HeaderMap, path: &str) -> (GuardDecision, Option<Session>) {
        if !RoutePolicy::is_canonical(path) {
            warn!("Rejecting non-canonical path {:?}", path);
            metrics::record_guard_decision(GuardDecision::Reject.as_str());
            return (GuardDecision::Reject, None);
        }

        if self.policy.is_bypassed(path) {
            return (GuardDecision::Allow, None);
        }

        let session = self.session(headers).await;

        let decision = match &session {
            None => self.policy.decide(false, path, None),
            Some(_) if self.policy.is_auth_path(path) => self.policy.decide(true, path, None),
            Some(_) if self.policy.is_two_factor_exempt(path) => self.policy.decide(true, path, None),
            Some(session) => match self.directory.flags(&session.user_id).await {
                Ok(flags) => self.policy.decide(true, path, Some(flags)),
                Err(e) => {
                    warn!(
                        "Two-factor lookup failed for user {}: {}",
                        session.user_id,
                        sanitize(&e.to_string())
                    );
                    metrics::record_guard_lookup_failure("two_factor");
                    GuardDecision::RedirectLogin
                }
            },
        };

        debug!("Guard decision for {}: {}", path, decision.as_str());
        metrics::record_guard_decision(decision.as_str());
        (decision, session)
    }
}
