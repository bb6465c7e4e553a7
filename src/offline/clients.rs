// Open dashboard instances and the messages exchanged with them
// Author: kelexine (https://github.com/kelexine)

use super::notifications::Notification;
use crate::metrics;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// postMessage-style signals between the worker and page scripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Worker → page: replay locally queued writes.
    SyncPendingData,
    /// Page → worker: promote the waiting worker now.
    SkipWaiting,
    /// Worker → page: a cache generation is active.
    OfflineReady {
        #[serde(default)]
        cache_name: String,
    },
    /// Page → worker: connectivity is back, ask every page to sync.
    SyncData,
    /// Worker → page: show a notification.
    Notification(Notification),
    /// Worker → page: bring this window to the front and open `url`.
    Focus { url: String },
}

impl WorkerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerMessage::SyncPendingData => "SYNC_PENDING_DATA",
            WorkerMessage::SkipWaiting => "SKIP_WAITING",
            WorkerMessage::OfflineReady { .. } => "OFFLINE_READY",
            WorkerMessage::SyncData => "SYNC_DATA",
            WorkerMessage::Notification(_) => "NOTIFICATION",
            WorkerMessage::Focus { .. } => "FOCUS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub id: Uuid,
    pub url: String,
    pub user_id: String,
}

struct ClientHandle {
    url: String,
    user_id: String,
    sender: mpsc::UnboundedSender<WorkerMessage>,
}

/// Registry of connected dashboard instances.
#[derive(Clone, Default)]
pub struct Clients {
    inner: Arc<RwLock<HashMap<Uuid, ClientHandle>>>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client of `user_id`; messages for it arrive on the
    /// returned receiver.
    pub fn connect(&self, url: &str, user_id: &str) -> (Uuid, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.inner.write().insert(
            id,
            ClientHandle {
                url: url.to_string(),
                user_id: user_id.to_string(),
                sender,
            },
        );
        debug!("Client {} connected at {}", id, url);
        (id, receiver)
    }

    pub fn disconnect(&self, id: &Uuid) {
        if self.inner.write().remove(id).is_some() {
            debug!("Client {} disconnected", id);
        }
    }

    /// Send to one client. Returns false if it is gone.
    pub fn post(&self, id: &Uuid, message: WorkerMessage) -> bool {
        let kind = message.kind();
        let delivered = self
            .inner
            .read()
            .get(id)
            .map(|client| client.sender.send(message).is_ok())
            .unwrap_or(false);
        if delivered {
            metrics::record_worker_message(kind);
        }
        delivered
    }

    /// Send to every client, dropping the ones whose stream closed.
    /// Returns the number reached.
    pub fn broadcast(&self, message: WorkerMessage) -> usize {
        self.send_where(message, |_| true)
    }

    /// Send to every client of one user.
    pub fn broadcast_to(&self, user_id: &str, message: WorkerMessage) -> usize {
        self.send_where(message, |client| client.user_id == user_id)
    }

    fn send_where(&self, message: WorkerMessage, wanted: impl Fn(&ClientHandle) -> bool) -> usize {
        let kind = message.kind();
        let mut closed = Vec::new();
        let mut reached = 0;

        for (id, client) in self.inner.read().iter().filter(|(_, client)| wanted(client)) {
            if client.sender.send(message.clone()).is_ok() {
                reached += 1;
            } else {
                closed.push(*id);
            }
        }

        if !closed.is_empty() {
            let mut inner = self.inner.write();
            for id in &closed {
                inner.remove(id);
            }
        }

        debug!("Broadcast {} to {} clients", kind, reached);
        if reached > 0 {
            metrics::record_worker_message(kind);
        }
        reached
    }

    pub fn match_all(&self) -> Vec<ClientInfo> {
        let mut clients: Vec<ClientInfo> = self
            .inner
            .read()
            .iter()
            .map(|(id, client)| ClientInfo {
                id: *id,
                url: client.url.clone(),
                user_id: client.user_id.clone(),
            })
            .collect();
        clients.sort_by(|a, b| a.url.cmp(&b.url));
        clients
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let json = serde_json::to_string(&WorkerMessage::SyncPendingData).unwrap();
        assert_eq!(json, r#"{"type":"SYNC_PENDING_DATA"}"#);

        let parsed: WorkerMessage = serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(parsed, WorkerMessage::SkipWaiting);

        let parsed: WorkerMessage = serde_json::from_str(r#"{"type":"OFFLINE_READY"}"#).unwrap();
        assert_eq!(parsed.kind(), "OFFLINE_READY");
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        let clients = Clients::new();
        let (_, mut first) = clients.connect("/dashboard", "alice");
        let (_, mut second) = clients.connect("/clients", "bob");

        assert_eq!(clients.broadcast(WorkerMessage::SyncPendingData), 2);
        assert_eq!(first.recv().await, Some(WorkerMessage::SyncPendingData));
        assert_eq!(second.recv().await, Some(WorkerMessage::SyncPendingData));
    }

    #[test]
    fn test_closed_clients_are_pruned() {
        let clients = Clients::new();
        let (_, receiver) = clients.connect("/dashboard", "alice");
        drop(receiver);

        assert_eq!(clients.broadcast(WorkerMessage::SyncPendingData), 0);
        assert!(clients.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_to_one_user() {
        let clients = Clients::new();
        let (_, mut alice) = clients.connect("/dashboard", "alice");
        let (_, mut bob) = clients.connect("/dashboard", "bob");

        assert_eq!(clients.broadcast_to("alice", WorkerMessage::SyncPendingData), 1);
        assert_eq!(alice.recv().await, Some(WorkerMessage::SyncPendingData));
        assert!(bob.try_recv().is_err());
    }

    #[test]
    fn test_post_to_unknown_client() {
        let clients = Clients::new();
        assert!(!clients.post(&Uuid::new_v4(), WorkerMessage::SyncPendingData));
    }
}
