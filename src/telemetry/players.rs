//! Player activity events for `PLAYER_EVENT` pushes.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::{TelemetrySource, MAX_BATCH};
use crate::protocol::PushKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerEventKind {
    Join,
    Leave,
    Death,
    Chat,
    Command,
    Advancement,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEvent {
    pub player_uuid: String,
    pub player_name: String,
    pub event_type: PlayerEventKind,
    pub world_name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_data: Option<String>,
}

impl PlayerEvent {
    pub fn new(
        player_uuid: impl Into<String>,
        player_name: impl Into<String>,
        event_type: PlayerEventKind,
        world_name: impl Into<String>,
        (x, y, z): (f64, f64, f64),
    ) -> Self {
        Self {
            player_uuid: player_uuid.into(),
            player_name: player_name.into(),
            event_type,
            world_name: world_name.into(),
            x,
            y,
            z,
            ip_hash: None,
            event_data: None,
        }
    }

    /// Attach the player's address. Only the hash leaves the agent.
    pub fn with_ip(mut self, ip: &str) -> Self {
        self.ip_hash = Some(hash_ip(ip));
        self
    }

    /// Death message, chat line, command or advancement key
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.event_data = Some(data.into());
        self
    }
}

/// First 16 hex chars of the SHA-256 of `ip`.
pub fn hash_ip(ip: &str) -> String {
    let digest = Sha256::digest(ip.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Shared event queue; the host side records, the producer drains.
#[derive(Clone, Default)]
pub struct PlayerEvents {
    queue: Arc<Mutex<VecDeque<PlayerEvent>>>,
}

impl PlayerEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: PlayerEvent) {
        self.queue.lock().push_back(event);
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl TelemetrySource for PlayerEvents {
    fn kind(&self) -> PushKind {
        PushKind::PlayerEvent
    }

    fn sample(&mut self) -> Option<Value> {
        let events: Vec<PlayerEvent> = {
            let mut queue = self.queue.lock();
            let n = queue.len().min(MAX_BATCH);
            queue.drain(..n).collect()
        };
        if events.is_empty() {
            return None;
        }
        Some(json!({ "events": events }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_ip() {
        // sha256("127.0.0.1") = 12ca17b49af22894...
        assert_eq!(hash_ip("127.0.0.1"), "12ca17b49af22894");
        assert_eq!(hash_ip("").len(), 16);
    }

    #[test]
    fn test_event_shape() {
        let event = PlayerEvent::new("uuid-1", "Steve", PlayerEventKind::Join, "world", (1.0, 64.0, -3.5))
            .with_ip("127.0.0.1");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["eventType"], "JOIN");
        assert_eq!(value["playerName"], "Steve");
        assert_eq!(value["ipHash"], "12ca17b49af22894");
        assert!(value.get("eventData").is_none());
    }

    #[test]
    fn test_drain_in_batches() {
        let mut events = PlayerEvents::new();
        for i in 0..250 {
            events.record(
                PlayerEvent::new("u", "Alex", PlayerEventKind::Chat, "world", (0.0, 0.0, 0.0))
                    .with_data(format!("msg {}", i)),
            );
        }

        let first = events.sample().unwrap();
        assert_eq!(first["events"].as_array().unwrap().len(), MAX_BATCH);
        assert_eq!(first["events"][0]["eventData"], "msg 0");

        let second = events.sample().unwrap();
        assert_eq!(second["events"].as_array().unwrap().len(), 50);
        assert!(events.sample().is_none());
    }
}
