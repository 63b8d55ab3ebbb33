//! In-process fan-out of cross-platform events.

use chrono::{DateTime, Utc};
use neothink_core::Platform;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Channel capacity. Slow subscribers that fall further behind skip events.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeEventKind {
    Notification,
    PreferencesUpdated,
    StateUpdated,
}

impl BridgeEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeEventKind::Notification => "notification",
            BridgeEventKind::PreferencesUpdated => "preferences_updated",
            BridgeEventKind::StateUpdated => "state_updated",
        }
    }
}

/// One event addressed to a user.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeEvent {
    pub kind: BridgeEventKind,
    pub user_id: String,
    pub platform: Platform,
    pub payload: Value,
    pub at: DateTime<Utc>,
}

impl BridgeEvent {
    pub fn new(kind: BridgeEventKind, user_id: &str, platform: Platform, payload: Value) -> Self {
        Self {
            kind,
            user_id: user_id.to_string(),
            platform,
            payload,
            at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct BridgeHub {
    tx: broadcast::Sender<BridgeEvent>,
}

impl Default for BridgeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: BridgeEvent) -> usize {
        // No subscribers is not an error.
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }
}
