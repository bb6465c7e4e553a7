//! Offline support for the dashboard.
//!
//! A worker owns one named cache generation. Installing it pre-caches the
//! static asset list, activating it purges every other generation and
//! claims the open dashboard instances. While active it answers fetches
//! cache-first, falls back to an offline page, and relays background sync
//! and push events to the instances as [`WorkerMessage`]s.
//!
//! # Components
//!
//! - `storage`: named generations of cached responses.
//! - `network`: the fetch seam and the `reqwest` client for the origin.
//! - `clients`: connected instances and the message wire format.
//! - `notifications`: push payloads, permission, click handling.
//! - `worker`: lifecycle and event handlers of one worker version.
//! - `host`: which worker controls the clients, and rollout of new ones.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod clients;
mod host;
mod network;
mod notifications;
mod storage;
mod worker;

pub use clients::{ClientInfo, Clients, WorkerMessage};
pub use host::WorkerHost;
pub use network::{FetchRequest, FetchResponse, Network, NetworkError, UpstreamClient, OFFLINE_BODY};
pub use notifications::{Notification, NotificationCapability, Permission, PushPayload, WindowAction};
pub use storage::{CacheError, CacheStorage, CachedResponse, RequestKey};
pub use worker::{MessageOutcome, OfflineWorker, WorkerState};

use crate::config::OfflineConfig;
use std::sync::Arc;

/// State shared by every worker version: cache storage, connected
/// clients and notification permission.
#[derive(Clone)]
pub struct Platform {
    pub storage: CacheStorage,
    pub clients: Clients,
    pub notifications: Arc<NotificationCapability>,
}

impl Platform {
    pub fn new(config: &OfflineConfig) -> Self {
        Self {
            storage: CacheStorage::new(config.max_entry_bytes),
            clients: Clients::new(),
            notifications: Arc::new(NotificationCapability::new(config.allow_notifications)),
        }
    }
}
