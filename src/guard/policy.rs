// Route decision table
// Author: kelexine (https://github.com/kelexine)

use super::{GuardDecision, TwoFactorFlags};
use crate::config::GuardConfig;

/// The path table the guard decides against.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    pub login_path: String,
    pub dashboard_path: String,
    pub auth_prefix: String,
    pub two_factor_prefix: String,
    pub two_factor_challenge_path: String,
    pub two_factor_verify_endpoint: String,
    pub bypass_prefixes: Vec<String>,
}

impl RoutePolicy {
    pub fn from_config(config: &GuardConfig) -> Self {
        Self {
            login_path: config.login_path.clone(),
            dashboard_path: config.dashboard_path.clone(),
            auth_prefix: config.auth_prefix.clone(),
            two_factor_prefix: config.two_factor_prefix.clone(),
            two_factor_challenge_path: config.two_factor_challenge_path.clone(),
            two_factor_verify_endpoint: config.two_factor_verify_endpoint.clone(),
            bypass_prefixes: config.bypass_prefixes.clone(),
        }
    }

    /// Segment-aware prefix test: `/auth` covers `/auth` and `/auth/login`
    /// but not `/authors`.
    pub fn is_under(path: &str, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Whether `path` is an origin-relative path the guard can reason about.
    ///
    /// Rejects anything the origin would resolve to a different path:
    /// `.` and `..` segments (also percent-encoded), encoded separators,
    /// backslashes and a leading `//`.
    pub fn is_canonical(path: &str) -> bool {
        if !path.starts_with('/') || path.starts_with("//") || path.contains('\\') {
            return false;
        }

        path.split('/').skip(1).all(|segment| {
            let decoded = urlencoding::decode_binary(segment.as_bytes());
            let decoded: &[u8] = decoded.as_ref();
            decoded != b"." && decoded != b".." && !decoded.contains(&b'/') && !decoded.contains(&b'\\')
        })
    }

    /// Paths the guard never inspects.
    pub fn is_bypassed(&self, path: &str) -> bool {
        self.bypass_prefixes
            .iter()
            .any(|prefix| Self::is_under(path, prefix))
    }

    pub fn is_auth_path(&self, path: &str) -> bool {
        Self::is_under(path, &self.auth_prefix)
    }

    /// True for paths a session owing a second factor may still visit.
    pub fn is_two_factor_exempt(&self, path: &str) -> bool {
        Self::is_under(path, &self.two_factor_prefix) || path == self.two_factor_verify_endpoint
    }

    /// Apply the decision table. `flags` is `None` when no lookup was made.
    pub fn decide(
        &self,
        session_present: bool,
        path: &str,
        flags: Option<TwoFactorFlags>,
    ) -> GuardDecision {
        if !session_present {
            return if self.is_auth_path(path) {
                GuardDecision::Allow
            } else {
                GuardDecision::RedirectLogin
            };
        }

        if self.is_auth_path(path) {
            return GuardDecision::RedirectDashboard;
        }

        match flags {
            Some(flags) if flags.requires_challenge() && !self.is_two_factor_exempt(path) => {
                GuardDecision::RedirectTwoFactor
            }
            _ => GuardDecision::Allow,
        }
    }
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::from_config(&GuardConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PENDING: TwoFactorFlags = TwoFactorFlags {
        enabled: true,
        verified: false,
    };

    #[test]
    fn test_is_under_respects_segments() {
        assert!(RoutePolicy::is_under("/auth", "/auth"));
        assert!(RoutePolicy::is_under("/auth/login", "/auth"));
        assert!(RoutePolicy::is_under("/auth/login", "/auth/"));
        assert!(!RoutePolicy::is_under("/authors", "/auth"));
        assert!(!RoutePolicy::is_under("/", "/auth"));
    }

    #[test]
    fn test_canonical_paths() {
        assert!(RoutePolicy::is_canonical("/"));
        assert!(RoutePolicy::is_canonical("/clients/42"));
        assert!(RoutePolicy::is_canonical("/_next/static/app.3f2a.js"));
        assert!(RoutePolicy::is_canonical("/files/report..pdf"));

        assert!(!RoutePolicy::is_canonical("/_next/static/../../clients"));
        assert!(!RoutePolicy::is_canonical("/auth/./../clients"));
        assert!(!RoutePolicy::is_canonical("/2fa/%2e%2e/leads"));
        assert!(!RoutePolicy::is_canonical("/2fa/%2E./leads"));
        assert!(!RoutePolicy::is_canonical("/icons/..%2fclients"));
        assert!(!RoutePolicy::is_canonical("/icons/%5c..%5cclients"));
        assert!(!RoutePolicy::is_canonical("//evil.example.com/steal"));
        assert!(!RoutePolicy::is_canonical("clients"));
    }

    #[test]
    fn test_anonymous_requests() {
        let policy = RoutePolicy::default();
        assert_eq!(policy.decide(false, "/dashboard", None), GuardDecision::RedirectLogin);
        assert_eq!(policy.decide(false, "/clients/42", None), GuardDecision::RedirectLogin);
        assert_eq!(policy.decide(false, "/auth/login", None), GuardDecision::Allow);
        assert_eq!(policy.decide(false, "/auth/signup", None), GuardDecision::Allow);
    }

    #[test]
    fn test_session_on_auth_pages_goes_to_dashboard() {
        let policy = RoutePolicy::default();
        assert_eq!(
            policy.decide(true, "/auth/login", Some(PENDING)),
            GuardDecision::RedirectDashboard
        );
        assert_eq!(policy.decide(true, "/auth", None), GuardDecision::RedirectDashboard);
    }

    #[test]
    fn test_pending_second_factor() {
        let policy = RoutePolicy::default();
        assert_eq!(
            policy.decide(true, "/leads", Some(PENDING)),
            GuardDecision::RedirectTwoFactor
        );
        assert_eq!(policy.decide(true, "/2fa", Some(PENDING)), GuardDecision::Allow);
        assert_eq!(policy.decide(true, "/2fa/verify", Some(PENDING)), GuardDecision::Allow);
        assert_eq!(
            policy.decide(true, "/api/auth/verify-2fa", Some(PENDING)),
            GuardDecision::Allow
        );
    }

    #[test]
    fn test_verified_or_disabled_allows() {
        let policy = RoutePolicy::default();
        let verified = TwoFactorFlags { enabled: true, verified: true };
        let disabled = TwoFactorFlags::default();
        assert_eq!(policy.decide(true, "/campaigns", Some(verified)), GuardDecision::Allow);
        assert_eq!(policy.decide(true, "/campaigns", Some(disabled)), GuardDecision::Allow);
        assert_eq!(policy.decide(true, "/campaigns", None), GuardDecision::Allow);
    }

    #[test]
    fn test_bypass_prefixes() {
        let policy = RoutePolicy::default();
        assert!(policy.is_bypassed("/_next/static/chunks/main.js"));
        assert!(policy.is_bypassed("/manifest.json"));
        assert!(policy.is_bypassed("/sw.js"));
        assert!(!policy.is_bypassed("/sw/events"));
        assert!(!policy.is_bypassed("/swagger"));
        assert!(!policy.is_bypassed("/dashboard"));
    }
}
