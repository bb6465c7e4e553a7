// Route guard tests: decision table properties and the hosted backend client
// Author: kelexine (https://github.com/kelexine)

use axum::http::{header, HeaderMap, HeaderValue};
use dashgate::config::BackendConfig;
use dashgate::guard::{
    AuthBackendClient, GuardDecision, RouteGuard, RoutePolicy, SessionOracle, TwoFactorDirectory,
    TwoFactorFlags,
};
use mockito::Matcher;
use proptest::prelude::*;

const PENDING: TwoFactorFlags = TwoFactorFlags {
    enabled: true,
    verified: false,
};

fn path_strategy() -> impl Strategy<Value = String> {
    let segments = prop::collection::vec("[a-z0-9-]{1,10}", 0..4);
    let root = prop_oneof![
        Just(String::new()),
        Just("/auth".to_string()),
        Just("/2fa".to_string()),
        Just("/api".to_string()),
        Just("/dashboard".to_string()),
    ];
    (root, segments).prop_map(|(root, segments)| {
        let path = format!("{}/{}", root, segments.join("/"));
        if path.len() > 1 {
            path.trim_end_matches('/').to_string()
        } else {
            path
        }
    })
}

proptest! {
    #[test]
    fn anonymous_outside_auth_prefix_goes_to_login(path in path_strategy()) {
        let policy = RoutePolicy::default();
        prop_assume!(!RoutePolicy::is_under(&path, "/auth"));
        prop_assert_eq!(policy.decide(false, &path, None), GuardDecision::RedirectLogin);
    }

    #[test]
    fn session_on_auth_prefix_goes_to_dashboard(
        suffix in "[a-z/]{0,12}",
        enabled in any::<bool>(),
        verified in any::<bool>(),
    ) {
        let policy = RoutePolicy::default();
        let path = format!("/auth/{}", suffix);
        let flags = TwoFactorFlags { enabled, verified };
        prop_assert_eq!(policy.decide(true, &path, Some(flags)), GuardDecision::RedirectDashboard);
    }

    #[test]
    fn pending_second_factor_only_reaches_challenge(path in path_strategy()) {
        let policy = RoutePolicy::default();
        prop_assume!(!RoutePolicy::is_under(&path, "/auth"));

        let decision = policy.decide(true, &path, Some(PENDING));
        let exempt = RoutePolicy::is_under(&path, "/2fa") || path == "/api/auth/verify-2fa";
        if exempt {
            prop_assert_eq!(decision, GuardDecision::Allow);
        } else {
            prop_assert_eq!(decision, GuardDecision::RedirectTwoFactor);
        }
    }
}

fn backend_config(url: &str) -> BackendConfig {
    BackendConfig {
        url: url.to_string(),
        api_key: "anon-key".to_string(),
        ..BackendConfig::default()
    }
}

fn cookie(token: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::COOKIE, HeaderValue::from_static(token));
    headers
}

#[tokio::test]
async fn test_session_lookup_against_backend() {
    let mut server = mockito::Server::new_async().await;
    let user = server
        .mock("GET", "/auth/v1/user")
        .match_header("authorization", "Bearer good-token")
        .match_header("apikey", "anon-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"user-42","email":"paralegal@example.com"}"#)
        .create_async()
        .await;

    let client = AuthBackendClient::new(&backend_config(&server.url())).unwrap();
    let session = client
        .lookup(&cookie("sb-access-token=good-token"))
        .await
        .unwrap()
        .expect("session");

    assert_eq!(session.user_id, "user-42");
    assert_eq!(session.access_token, "good-token");
    user.assert_async().await;
}

#[tokio::test]
async fn test_rejected_token_is_no_session() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/auth/v1/user")
        .with_status(401)
        .create_async()
        .await;

    let client = AuthBackendClient::new(&backend_config(&server.url())).unwrap();
    let session = client.lookup(&cookie("sb-access-token=expired")).await.unwrap();
    assert!(session.is_none());
}

#[tokio::test]
async fn test_backend_outage_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/auth/v1/user")
        .with_status(503)
        .create_async()
        .await;

    let client = AuthBackendClient::new(&backend_config(&server.url())).unwrap();
    assert!(client.lookup(&cookie("sb-access-token=t")).await.is_err());
}

#[tokio::test]
async fn test_missing_token_makes_no_call() {
    let mut server = mockito::Server::new_async().await;
    let user = server
        .mock("GET", "/auth/v1/user")
        .expect(0)
        .create_async()
        .await;

    let client = AuthBackendClient::new(&backend_config(&server.url())).unwrap();
    assert!(client.lookup(&HeaderMap::new()).await.unwrap().is_none());
    user.assert_async().await;
}

#[tokio::test]
async fn test_two_factor_flags_lookup() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/rest/v1/profiles")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("id".into(), "eq.user-42".into()),
            Matcher::UrlEncoded("select".into(), "two_factor_enabled,two_factor_verified".into()),
        ]))
        .with_status(200)
        .with_body(r#"[{"two_factor_enabled":true,"two_factor_verified":false}]"#)
        .create_async()
        .await;
    server
        .mock("GET", "/rest/v1/profiles")
        .match_query(Matcher::UrlEncoded("id".into(), "eq.nobody".into()))
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let client = AuthBackendClient::new(&backend_config(&server.url())).unwrap();
    assert_eq!(client.flags("user-42").await.unwrap(), PENDING);
    assert_eq!(client.flags("nobody").await.unwrap(), TwoFactorFlags::default());
}

#[tokio::test]
async fn test_guard_lookup_counts() {
    let mut server = mockito::Server::new_async().await;
    let user = server
        .mock("GET", "/auth/v1/user")
        .with_status(200)
        .with_body(r#"{"id":"user-42"}"#)
        .expect(2)
        .create_async()
        .await;
    let profiles = server
        .mock("GET", "/rest/v1/profiles")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"[{"two_factor_enabled":true,"two_factor_verified":false}]"#)
        .expect(1)
        .create_async()
        .await;

    let client = AuthBackendClient::new(&backend_config(&server.url())).unwrap();
    let guard = RouteGuard::new(RoutePolicy::default(), client.clone(), client);
    let headers = cookie("sb-access-token=good-token");

    // Auth pages short-circuit before the flags lookup.
    assert_eq!(
        guard.evaluate(&headers, "/auth/login").await,
        GuardDecision::RedirectDashboard
    );
    assert_eq!(
        guard.evaluate(&headers, "/clients").await,
        GuardDecision::RedirectTwoFactor
    );
    // Static assets are not looked at at all.
    assert_eq!(
        guard.evaluate(&headers, "/_next/static/chunk.js").await,
        GuardDecision::Allow
    );

    user.assert_async().await;
    profiles.assert_async().await;
}

#[tokio::test]
async fn test_flags_outage_redirects_to_login() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/auth/v1/user")
        .with_status(200)
        .with_body(r#"{"id":"user-42"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/rest/v1/profiles")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let client = AuthBackendClient::new(&backend_config(&server.url())).unwrap();
    let guard = RouteGuard::new(RoutePolicy::default(), client.clone(), client);

    assert_eq!(
        guard.evaluate(&cookie("sb-access-token=t"), "/leads").await,
        GuardDecision::RedirectLogin
    );
}
