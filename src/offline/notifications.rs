//! Push notifications relayed by the offline worker.
//!
//! A push payload becomes a [`Notification`] shown to open dashboard
//! instances; clicking it either focuses the instance already showing the
//! target URL or asks the caller to open a new window. Showing anything at
//! all depends on [`NotificationCapability`], which is requested explicitly
//! and never as a side effect of some other event.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

const DEFAULT_TITLE: &str = "Case Dashboard";
const DEFAULT_URL: &str = "/";

/// Data carried by a push message. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl PushPayload {
    /// Parse raw push data: JSON when possible, otherwise the text is the body.
    pub fn parse(data: &[u8]) -> Self {
        if data.is_empty() {
            return Self::default();
        }
        serde_json::from_slice(data).unwrap_or_else(|_| Self {
            body: Some(String::from_utf8_lossy(data).into_owned()),
            ..Self::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub url: String,
}

impl Notification {
    pub fn from_push(payload: PushPayload, icon: &str, badge: &str) -> Self {
        Self {
            title: payload.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: payload.body.unwrap_or_default(),
            icon: icon.to_string(),
            badge: badge.to_string(),
            url: payload.url.unwrap_or_else(|| DEFAULT_URL.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Default,
    Granted,
    Denied,
}

/// Permission to show notifications.
pub struct NotificationCapability {
    state: Mutex<Permission>,
    allow: bool,
}

impl NotificationCapability {
    /// `allow` is the answer given the first time permission is requested.
    pub fn new(allow: bool) -> Self {
        Self {
            state: Mutex::new(Permission::Default),
            allow,
        }
    }

    pub fn state(&self) -> Permission {
        *self.state.lock()
    }

    pub fn is_granted(&self) -> bool {
        self.state() == Permission::Granted
    }

    /// Ask for permission. Only the first request changes anything.
    pub fn request(&self) -> Permission {
        let mut state = self.state.lock();
        if *state == Permission::Default {
            *state = if self.allow {
                Permission::Granted
            } else {
                Permission::Denied
            };
            info!("Notification permission {:?}", *state);
        }
        *state
    }
}

/// What a notification click results in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WindowAction {
    Focus { client_id: Uuid, url: String },
    Open { url: String },
}
