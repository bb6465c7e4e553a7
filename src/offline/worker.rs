// Offline cache worker: lifecycle, cache-first fetch, sync and push relay
// Author: kelexine (https://github.com/kelexine)

use super::clients::WorkerMessage;
use super::network::{FetchRequest, FetchResponse, Network};
use super::notifications::{Notification, PushPayload, WindowAction};
use super::storage::{CachedResponse, RequestKey};
use super::Platform;
use crate::config::OfflineConfig;
use crate::error::{GateError, Result};
use crate::guard::RoutePolicy;
use crate::metrics;
use axum::http::Method;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    /// Installed and waiting for the current controller to step aside.
    Installed,
    Activating,
    Active,
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Active => "active",
            WorkerState::Redundant => "redundant",
        }
    }
}

/// Result of delivering a message to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    SkipWaitingRequested,
    SyncBroadcast { clients: usize },
    Ignored,
}

/// One version of the offline worker, bound to one cache generation.
pub struct OfflineWorker<N> {
    cache_name: String,
    config: OfflineConfig,
    network: N,
    platform: Platform,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
}

impl<N: Network> OfflineWorker<N> {
    pub fn new(config: &OfflineConfig, network: N, platform: Platform) -> Self {
        Self {
            cache_name: config.cache_name.clone(),
            config: config.clone(),
            network,
            platform,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    fn transition(&self, next: WorkerState) {
        *self.state.write() = next;
        debug!("Worker {} is now {}", self.cache_name, next.as_str());
        metrics::record_worker_lifecycle(next.as_str());
    }

    pub(crate) fn mark_redundant(&self) {
        self.transition(WorkerState::Redundant);
    }

    /// Ask to be promoted without waiting for the current controller.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn wants_skip_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Pre-cache the static asset list into this worker's generation.
    ///
    /// Every asset must come back cacheable or nothing is stored and the
    /// worker becomes redundant.
    pub async fn install(&self) -> Result<()> {
        if self.state() != WorkerState::Parsed {
            return Err(GateError::Install(format!(
                "worker {} already {}",
                self.cache_name,
                self.state().as_str()
            )));
        }

        self.transition(WorkerState::Installing);
        self.platform.storage.open(&self.cache_name);

        match self.precache().await {
            Ok(count) => {
                info!("Installed {} with {} static assets", self.cache_name, count);
                metrics::update_cache_entries(&self.cache_name, self.platform.storage.len(&self.cache_name));
                if self.config.skip_waiting_on_install {
                    self.skip_waiting();
                }
                self.transition(WorkerState::Installed);
                Ok(())
            }
            Err(e) => {
                warn!("Install of {} failed: {}", self.cache_name, e);
                self.transition(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize> {
        let mut entries = Vec::with_capacity(self.config.static_assets.len());
        for asset in &self.config.static_assets {
            let request = FetchRequest::get(asset);
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| GateError::Install(format!("{}: {}", asset, e)))?;

            if !response.is_cacheable() {
                return Err(GateError::Install(format!(
                    "{} returned HTTP {}",
                    asset,
                    response.status.as_u16()
                )));
            }
            entries.push((request.key(), response));
        }

        let count = entries.len();
        self.platform.storage.put_all(&self.cache_name, entries)?;
        Ok(count)
    }

    /// Purge every other generation and take control of open clients.
    /// Returns the purged generation names.
    pub fn activate(&self) -> Result<Vec<String>> {
        if self.state() != WorkerState::Installed {
            return Err(GateError::Install(format!(
                "cannot activate {} while {}",
                self.cache_name,
                self.state().as_str()
            )));
        }

        self.transition(WorkerState::Activating);

        let storage = &self.platform.storage;
        let purged: Vec<String> = storage
            .keys()
            .into_iter()
            .filter(|name| name != &self.cache_name)
            .filter(|name| storage.delete(name))
            .collect();

        for name in &purged {
            info!("Purged cache generation {}", name);
            metrics::record_cache_operation("purge");
            metrics::remove_cache_entries(name);
        }

        self.claim();
        self.transition(WorkerState::Active);
        Ok(purged)
    }

    fn claim(&self) {
        let reached = self.platform.clients.broadcast(WorkerMessage::OfflineReady {
            cache_name: self.cache_name.clone(),
        });
        debug!("Worker {} claimed {} clients", self.cache_name, reached);
    }

    /// Requests the worker never answers from cache.
    fn is_network_only(&self, request: &FetchRequest) -> bool {
        if request.method != Method::GET {
            return true;
        }

        let path = request.path();
        if self
            .config
            .network_only_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()) || RoutePolicy::is_under(path, prefix))
        {
            return true;
        }

        request
            .host()
            .map(|host| self.config.network_only_hosts.iter().any(|h| *h == host))
            .unwrap_or(false)
    }

    /// Answer a fetch: network-only passthrough, else cache-first with
    /// offline fallback.
    ///
    /// Only network-only requests can fail; everything else degrades to
    /// cached content or the synthetic offline response.
    pub async fn handle_fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        if self.is_network_only(&request) {
            return self
                .network
                .fetch(&request)
                .await
                .map_err(|e| GateError::Upstream(e.to_string()));
        }

        let key = request.key();
        if let Some(cached) = self.lookup(&key) {
            debug!("Cache hit for {}", key.url);
            metrics::record_cache_operation("hit");
            return Ok(cached.to_response());
        }

        debug!("Cache miss for {}", key.url);
        metrics::record_cache_operation("miss");

        match self.network.fetch(&request).await {
            Ok(response) => {
                if self.may_store(&key, &response) {
                    self.store(key, &response);
                }
                Ok(response)
            }
            Err(e) => {
                warn!("Network failed for {}: {}", request.url, e);
                Ok(self.offline_fallback(&request))
            }
        }
    }

    /// The caller's own partition first, then the shared one.
    fn lookup(&self, key: &RequestKey) -> Option<CachedResponse> {
        let storage = &self.platform.storage;
        storage.match_in(&self.cache_name, key).or_else(|| {
            key.partition
                .as_ref()
                .and_then(|_| storage.match_in(&self.cache_name, &key.shared()))
        })
    }

    /// Credential-dependent responses only go into the caller's partition.
    fn may_store(&self, key: &RequestKey, response: &FetchResponse) -> bool {
        response.is_cacheable() && (key.partition.is_some() || !response.is_private())
    }

    fn store(&self, key: RequestKey, response: &FetchResponse) {
        let url = key.url.clone();
        match self.platform.storage.put(&self.cache_name, key, response) {
            Ok(()) => {
                metrics::record_cache_operation("store");
                metrics::update_cache_entries(&self.cache_name, self.platform.storage.len(&self.cache_name));
            }
            Err(e) => {
                warn!("Failed to cache {}: {}", url, e);
                metrics::record_cache_operation("store_failed");
            }
        }
    }

    fn offline_fallback(&self, request: &FetchRequest) -> FetchResponse {
        if request.accepts_html() {
            let key = RequestKey::get(&self.config.offline_page);
            if let Some(page) = self.platform.storage.match_in(&self.cache_name, &key) {
                metrics::record_fetch_fallback("offline_page");
                return page.to_response();
            }
            warn!("Offline page {} is not cached", self.config.offline_page);
        }

        metrics::record_fetch_fallback("unavailable");
        FetchResponse::offline()
    }

    /// Background sync trigger. Only the pending-data tag does anything.
    pub fn on_sync(&self, tag: &str) -> usize {
        if tag != self.config.sync_tag {
            debug!("Ignoring sync tag {}", tag);
            return 0;
        }
        let reached = self.platform.clients.broadcast(WorkerMessage::SyncPendingData);
        info!("Requested pending-data sync from {} clients", reached);
        reached
    }

    pub fn on_message(&self, message: WorkerMessage) -> MessageOutcome {
        match message {
            WorkerMessage::SkipWaiting => {
                self.skip_waiting();
                MessageOutcome::SkipWaitingRequested
            }
            WorkerMessage::SyncData => {
                let tag = self.config.sync_tag.clone();
                MessageOutcome::SyncBroadcast {
                    clients: self.on_sync(&tag),
                }
            }
            other => {
                debug!("Ignoring {} sent to worker", other.kind());
                MessageOutcome::Ignored
            }
        }
    }

    /// Build a notification from a push. Clients only see it when
    /// notification permission was granted; with a `recipient` only that
    /// user's clients do.
    pub fn on_push(&self, payload: PushPayload, recipient: Option<&str>) -> Notification {
        let notification = Notification::from_push(
            payload,
            &self.config.notification_icon,
            &self.config.notification_badge,
        );

        if self.platform.notifications.is_granted() {
            let message = WorkerMessage::Notification(notification.clone());
            match recipient {
                Some(user_id) => self.platform.clients.broadcast_to(user_id, message),
                None => self.platform.clients.broadcast(message),
            };
        } else {
            debug!("Notification permission not granted, dropping {:?}", notification.title);
        }
        notification
    }

    /// Focus a client of `user_id` already at `url`, else ask for a new
    /// window.
    pub fn on_notification_click(&self, url: &str, user_id: &str) -> WindowAction {
        let existing = self
            .platform
            .clients
            .match_all()
            .into_iter()
            .find(|client| client.url == url && client.user_id == user_id);

        if let Some(client) = existing {
            if self
                .platform
                .clients
                .post(&client.id, WorkerMessage::Focus { url: url.to_string() })
            {
                return WindowAction::Focus {
                    client_id: client.id,
                    url: url.to_string(),
                };
            }
        }

        WindowAction::Open {
            url: url.to_string(),
        }
    }
}
