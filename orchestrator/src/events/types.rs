//! The shape carried on every channel: a dotted-namespace `kind`
//! (`task.created`, `session.iteration`, `quest.content_delta`, ...), an
//! opaque JSON payload, and the channel it was delivered on.

use serde::{Deserialize, Serialize};

/// Kind reserved for the marker synthesized when a subscriber's queue
/// overflows and the oldest pending event is dropped.
pub const LAG_KIND: &str = "lag";

/// The channel every subscriber may additionally opt into, in addition
/// to any named channels.
pub const BROADCAST_CHANNEL: &str = "broadcast";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub channel: String,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(channel: impl Into<String>, kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { channel: channel.into(), kind: kind.into(), payload }
    }

    pub fn lag(channel: impl Into<String>, skipped: u64) -> Self {
        Self::new(channel, LAG_KIND, serde_json::json!({ "skipped": skipped }))
    }

    pub fn is_lag(&self) -> bool {
        self.kind == LAG_KIND
    }
}

pub fn quest_channel(quest_id: &str) -> String {
    format!("quest:{quest_id}")
}

pub fn task_channel(objective_id: &str) -> String {
    format!("task:{objective_id}")
}

pub fn user_channel(user_id: &str) -> String {
    format!("user:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lag_event_carries_the_skipped_count() {
        let event = Event::lag("quest:abc", 7);
        assert!(event.is_lag());
        assert_eq!(event.payload["skipped"], 7);
    }

    #[test]
    fn channel_naming_matches_the_entity_kind() {
        assert_eq!(quest_channel("q1"), "quest:q1");
        assert_eq!(task_channel("t1"), "task:t1");
        assert_eq!(user_channel("u1"), "user:u1");
    }
}
