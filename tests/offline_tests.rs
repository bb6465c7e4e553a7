// Offline worker tests against a mock dashboard origin
// Author: kelexine (https://github.com/kelexine)

use axum::http::{header, StatusCode};
use dashgate::config::{OfflineConfig, UpstreamConfig};
use dashgate::metrics::gather_metrics;
use dashgate::offline::{
    FetchRequest, OfflineWorker, Platform, RequestKey, UpstreamClient, WorkerHost, OFFLINE_BODY,
};

fn upstream(url: &str) -> UpstreamClient {
    let config = UpstreamConfig {
        url: url.to_string(),
        timeout_seconds: 5,
    };
    UpstreamClient::new(&config, 4).unwrap()
}

fn offline_config(cache_name: &str, assets: &[&str]) -> OfflineConfig {
    OfflineConfig {
        cache_name: cache_name.to_string(),
        static_assets: assets.iter().map(|s| s.to_string()).collect(),
        ..OfflineConfig::default()
    }
}

#[tokio::test]
async fn test_manifest_refetched_after_generation_change() {
    let mut server = mockito::Server::new_async().await;
    let manifest = server
        .mock("GET", "/manifest.json")
        .with_status(200)
        .with_header("content-type", "application/manifest+json")
        .with_body(r#"{"name":"Case Dashboard"}"#)
        .expect(2)
        .create_async()
        .await;
    server
        .mock("GET", "/offline.html")
        .with_status(200)
        .with_body("<h1>You are offline</h1>")
        .create_async()
        .await;

    let network = upstream(&server.url());
    let platform = Platform::new(&OfflineConfig::default());

    let v1 = OfflineWorker::new(
        &offline_config("dashboard-v1", &["/manifest.json", "/offline.html"]),
        network.clone(),
        platform.clone(),
    );
    v1.install().await.unwrap();
    v1.activate().unwrap();
    assert!(platform
        .storage
        .match_in("dashboard-v1", &RequestKey::get("/manifest.json"))
        .is_some());

    // Served from cache, no second network call yet.
    let cached = v1.handle_fetch(FetchRequest::get("/manifest.json")).await.unwrap();
    assert_eq!(cached.status, StatusCode::OK);

    let v2 = OfflineWorker::new(
        &offline_config("dashboard-v2", &["/offline.html"]),
        network,
        platform.clone(),
    );
    v2.install().await.unwrap();
    let purged = v2.activate().unwrap();

    assert_eq!(purged, vec!["dashboard-v1".to_string()]);
    assert!(!platform.storage.has("dashboard-v1"));
    assert!(platform
        .storage
        .match_in("dashboard-v1", &RequestKey::get("/manifest.json"))
        .is_none());

    let refetched = v2.handle_fetch(FetchRequest::get("/manifest.json")).await.unwrap();
    assert_eq!(refetched.body.as_ref(), br#"{"name":"Case Dashboard"}"#);
    manifest.assert_async().await;
}

#[tokio::test]
async fn test_cache_first_makes_one_network_call() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/offline.html")
        .with_status(200)
        .with_body("offline")
        .create_async()
        .await;
    let clients = server
        .mock("GET", "/clients?page=2")
        .with_status(200)
        .with_body("<table>clients</table>")
        .expect(1)
        .create_async()
        .await;

    let host = WorkerHost::new(&offline_config("v1", &["/offline.html"]), upstream(&server.url()));
    host.register("v1").await.unwrap();

    let first = host.fetch(FetchRequest::get("/clients?page=2")).await.unwrap();
    let second = host.fetch(FetchRequest::get("/clients?page=2")).await.unwrap();

    assert_eq!(first.body, second.body);
    assert_eq!(first.status, second.status);
    clients.assert_async().await;
}

#[tokio::test]
async fn test_api_and_writes_always_hit_network() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/offline.html")
        .with_status(200)
        .with_body("offline")
        .create_async()
        .await;
    let api = server
        .mock("GET", "/api/campaigns")
        .with_status(200)
        .with_body("[]")
        .expect(2)
        .create_async()
        .await;
    let write = server
        .mock("POST", "/leads")
        .with_status(201)
        .expect(1)
        .create_async()
        .await;

    let host = WorkerHost::new(&offline_config("v1", &["/offline.html"]), upstream(&server.url()));
    host.register("v1").await.unwrap();

    host.fetch(FetchRequest::get("/api/campaigns")).await.unwrap();
    host.fetch(FetchRequest::get("/api/campaigns")).await.unwrap();

    let mut post = FetchRequest::get("/leads");
    post.method = axum::http::Method::POST;
    post.body = bytes::Bytes::from_static(br#"{"name":"New lead"}"#);
    let created = host.fetch(post).await.unwrap();

    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(host.platform().storage.len("v1"), 1);
    api.assert_async().await;
    write.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_network_falls_back() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/offline.html")
        .with_status(200)
        .with_body("<h1>You are offline</h1>")
        .create_async()
        .await;

    let host = WorkerHost::new(&offline_config("v1", &["/offline.html"]), upstream(&server.url()));
    host.register("v1").await.unwrap();

    // Nothing listens on port 1.
    let page = host
        .fetch(
            FetchRequest::get("http://127.0.0.1:1/appointments")
                .with_header(header::ACCEPT, "text/html,application/xhtml+xml"),
        )
        .await
        .unwrap();
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.body.as_ref(), b"<h1>You are offline</h1>");

    let data = host
        .fetch(FetchRequest::get("http://127.0.0.1:1/report.json").with_header(header::ACCEPT, "application/json"))
        .await
        .unwrap();
    assert_eq!(data.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(data.body.as_ref(), OFFLINE_BODY.as_bytes());
}

#[tokio::test]
async fn test_failed_install_stores_nothing() {
    let mut server = mockito::Server::new_async().await;
    let offline_page = server
        .mock("GET", "/offline.html")
        .with_status(200)
        .with_body("offline")
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/missing.css")
        .with_status(404)
        .create_async()
        .await;

    let host = WorkerHost::new(
        &offline_config("v1", &["/offline.html", "/missing.css"]),
        upstream(&server.url()),
    );
    assert!(host.register("v1").await.is_err());

    assert!(host.controller().is_none());
    assert_eq!(host.platform().storage.len("v1"), 0);
    assert!(host
        .platform()
        .storage
        .match_in("v1", &RequestKey::get("/offline.html"))
        .is_none());
    offline_page.assert_async().await;
}

#[tokio::test]
async fn test_purged_generation_leaves_no_gauge() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/offline.html")
        .with_status(200)
        .with_body("offline")
        .create_async()
        .await;

    let host = WorkerHost::new(
        &offline_config("purge-gauge-a", &["/offline.html"]),
        upstream(&server.url()),
    );
    host.register("purge-gauge-a").await.unwrap();
    assert!(gather_metrics().contains(r#"generation="purge-gauge-a""#));

    host.register("purge-gauge-b").await.unwrap();

    let metrics = gather_metrics();
    assert!(metrics.contains(r#"generation="purge-gauge-b""#));
    assert!(!metrics.contains(r#"generation="purge-gauge-a""#));
}

#[tokio::test]
async fn test_signed_in_pages_are_kept_per_user() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/offline.html")
        .with_status(200)
        .with_body("offline")
        .create_async()
        .await;
    let profile = server
        .mock("GET", "/profile")
        .with_status(200)
        .with_body("someone's profile")
        .expect(2)
        .create_async()
        .await;

    let host = WorkerHost::new(&offline_config("v1", &["/offline.html"]), upstream(&server.url()));
    host.register("v1").await.unwrap();

    for user in ["alice", "bob", "alice", "bob"] {
        let request = FetchRequest::get("/profile").for_partition(Some(user.to_string()));
        host.fetch(request).await.unwrap();
    }

    let storage = &host.platform().storage;
    assert!(storage.match_in("v1", &RequestKey::get("/profile")).is_none());
    assert!(storage
        .match_in("v1", &RequestKey::get("/profile").in_partition(Some("alice".to_string())))
        .is_some());
    profile.assert_async().await;
}
