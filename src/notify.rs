use std::fmt;

use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::{Event, Trimester};

const CHANNEL_CAPACITY: usize = 256;

/// Notification channel: every open view of a room or a trimester group
/// subscribes to the matching channel so concurrent views converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Room(Ulid),
    Group(Trimester),
}

impl Channel {
    /// Parse the wire form: `room_<ulid>` or `group_<n>`.
    pub fn parse(s: &str) -> Option<Channel> {
        if let Some(rest) = s.strip_prefix("room_") {
            return Ulid::from_string(rest).ok().map(Channel::Room);
        }
        if let Some(rest) = s.strip_prefix("group_") {
            return rest.parse().ok().map(Channel::Group);
        }
        None
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Room(id) => write!(f, "room_{id}"),
            Channel::Group(t) => write!(f, "group_{t}"),
        }
    }
}

/// Broadcast hub for LISTEN/NOTIFY per room and per trimester group.
pub struct NotifyHub {
    channels: DashMap<Channel, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for a channel. Creates it if needed.
    pub fn subscribe(&self, channel: Channel) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(channel)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, channel: Channel, event: &Event) {
        if let Some(sender) = self.channels.get(&channel) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel (e.g. when a room is deleted).
    pub fn remove(&self, channel: &Channel) {
        self.channels.remove(channel);
    }
}
