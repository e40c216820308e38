//! The event bus: named channels, each subscriber owning a bounded
//! FIFO that drops the oldest entry on overflow rather than blocking
//! the publisher.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;
use tracing::debug;

use super::types::{BROADCAST_CHANNEL, Event};

/// Default per-subscriber queue depth.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

struct Inner {
    queue: Mutex<VecDeque<Event>>,
    dropped: AtomicU64,
    notify: Notify,
    capacity: usize,
}

impl Inner {
    fn new(capacity: usize) -> Self {
        Self { queue: Mutex::new(VecDeque::with_capacity(capacity)), dropped: AtomicU64::new(0), notify: Notify::new(), capacity }
    }

    fn push(&self, event: Event) {
        let mut queue = self.queue.lock().expect("event queue poisoned");
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::AcqRel);
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }
}

/// Central registry of named channels. Channels are created implicitly
/// on first publish or subscribe and reclaimed once their subscriber
/// list is empty.
pub struct EventBus {
    channels: Mutex<HashMap<String, Vec<Weak<Inner>>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        Self { channels: Mutex::new(HashMap::new()), capacity }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Publish `event` to its own channel plus every subscriber that
    /// opted into "broadcast". Never blocks: a full subscriber queue
    /// drops its oldest entry instead.
    pub fn publish(&self, event: Event) {
        debug!(kind = %event.kind, channel = %event.channel, "EventBus::publish");
        self.dispatch(&event.channel.clone(), &event);
        if event.channel != BROADCAST_CHANNEL {
            self.dispatch(BROADCAST_CHANNEL, &event);
        }
    }

    fn dispatch(&self, key: &str, event: &Event) {
        let mut channels = self.channels.lock().expect("channel map poisoned");
        let is_empty = {
            let Some(subscribers) = channels.get_mut(key) else { return };
            subscribers.retain(|weak| weak.strong_count() > 0);
            for weak in subscribers.iter() {
                if let Some(inner) = weak.upgrade() {
                    inner.push(event.clone());
                }
            }
            subscribers.is_empty()
        };
        if is_empty {
            channels.remove(key);
        }
    }

    /// Bind a handle to `channels` plus, if `broadcast` is set, every
    /// event published on any channel.
    pub fn subscribe(&self, channels: &[String], broadcast: bool) -> Subscription {
        let inner = Arc::new(Inner::new(self.capacity));
        let mut registered = Vec::with_capacity(channels.len() + 1);
        let mut map = self.channels.lock().expect("channel map poisoned");
        for channel in channels {
            map.entry(channel.clone()).or_default().push(Arc::downgrade(&inner));
            registered.push(channel.clone());
        }
        if broadcast {
            map.entry(BROADCAST_CHANNEL.to_string()).or_default().push(Arc::downgrade(&inner));
            registered.push(BROADCAST_CHANNEL.to_string());
        }
        debug!(?registered, "EventBus::subscribe: new subscriber");
        Subscription { inner, channels: registered }
    }

    /// Convenience handle bound to a single channel, for a quest turn or
    /// session iteration to publish through without repeating the
    /// channel name on every call.
    pub fn channel(self: &Arc<Self>, channel: impl Into<String>) -> ChannelPublisher {
        ChannelPublisher { bus: Arc::clone(self), channel: channel.into() }
    }

    #[cfg(test)]
    fn channel_count(&self) -> usize {
        self.channels.lock().expect("channel map poisoned").len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// A subscriber's handle. Drop releases this subscriber's slot on every
/// channel it was registered against; a channel with no subscribers
/// left is reclaimed on its next publish.
pub struct Subscription {
    inner: Arc<Inner>,
    channels: Vec<String>,
}

impl Subscription {
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Waits for the next event. A dropped burst surfaces first as a
    /// single `lag` marker carrying the skipped count, ahead of any
    /// event that arrived after the drop.
    pub async fn recv(&mut self) -> Event {
        loop {
            let dropped = self.inner.dropped.swap(0, Ordering::AcqRel);
            if dropped > 0 {
                return Event::lag(self.channels.first().cloned().unwrap_or_default(), dropped);
            }
            if let Some(event) = self.inner.queue.lock().expect("event queue poisoned").pop_front() {
                return event;
            }
            self.inner.notify.notified().await;
        }
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        let dropped = self.inner.dropped.swap(0, Ordering::AcqRel);
        if dropped > 0 {
            return Some(Event::lag(self.channels.first().cloned().unwrap_or_default(), dropped));
        }
        self.inner.queue.lock().expect("event queue poisoned").pop_front()
    }
}

/// Cheaply cloneable handle bound to one channel.
#[derive(Clone)]
pub struct ChannelPublisher {
    bus: Arc<EventBus>,
    channel: String,
}

impl ChannelPublisher {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn publish(&self, kind: impl Into<String>, payload: serde_json::Value) {
        self.bus.publish(Event::new(self.channel.clone(), kind, payload));
    }
}

pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_events_on_its_channel() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe(&["quest:1".to_string()], false);
        bus.publish(Event::new("quest:1", "quest.message", serde_json::json!({"text": "hi"})));

        let event = sub.recv().await;
        assert_eq!(event.kind, "quest.message");
        assert_eq!(event.payload["text"], "hi");
    }

    #[tokio::test]
    async fn events_on_other_channels_are_not_delivered() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe(&["quest:1".to_string()], false);
        bus.publish(Event::new("quest:2", "quest.message", serde_json::json!({})));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn broadcast_subscribers_see_every_channel() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe(&[], true);
        bus.publish(Event::new("task:1", "task.created", serde_json::json!({})));
        bus.publish(Event::new("quest:1", "quest.message", serde_json::json!({})));

        assert_eq!(sub.recv().await.kind, "task.created");
        assert_eq!(sub.recv().await.kind, "quest.message");
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_synthesizes_a_lag_marker() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe(&["quest:1".to_string()], false);

        for i in 0..10 {
            bus.publish(Event::new("quest:1", "quest.content_delta", serde_json::json!({ "i": i })));
        }

        let first = sub.recv().await;
        assert!(first.is_lag());
        assert_eq!(first.payload["skipped"], 8);

        // The two surviving events remain in publish order.
        let second = sub.recv().await;
        assert_eq!(second.payload["i"], 8);
        let third = sub.recv().await;
        assert_eq!(third.payload["i"], 9);
    }

    #[tokio::test]
    async fn channel_is_reclaimed_once_its_subscriber_is_dropped() {
        let bus = EventBus::new(8);
        {
            let _sub = bus.subscribe(&["quest:1".to_string()], false);
            assert_eq!(bus.channel_count(), 1);
        }
        // The weak ref is now dead; the next publish to that channel reclaims it.
        bus.publish(Event::new("quest:1", "quest.message", serde_json::json!({})));
        assert_eq!(bus.channel_count(), 0);
    }

    #[tokio::test]
    async fn channel_publisher_stamps_its_bound_channel() {
        let bus = create_event_bus();
        let mut sub = bus.subscribe(&["task:t1".to_string()], false);
        let publisher = bus.channel(super::super::types::task_channel("t1"));

        publisher.publish("task.created", serde_json::json!({"title": "x"}));
        let event = sub.recv().await;
        assert_eq!(event.channel, "task:t1");
        assert_eq!(event.kind, "task.created");
    }
}
