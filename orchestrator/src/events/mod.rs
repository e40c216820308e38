//! Event bus for live observability: quest turns, session iterations and
//! objective lifecycle transitions are all published here so a transport
//! layer can stream them to a connected client. The bus is in-process
//! and volatile — nothing here is replayed after a restart.

mod bus;
mod types;

pub use bus::{ChannelPublisher, DEFAULT_SUBSCRIBER_CAPACITY, EventBus, Subscription, create_event_bus};
pub use types::{BROADCAST_CHANNEL, Event, LAG_KIND, quest_channel, task_channel, user_channel};
