//! Presence channels.
//!
//! Membership is delegated to a [`PresenceTracker`]. The tracker reports raw
//! join and leave actions; `here`, `joining` and `leaving` turn them into
//! member-list and per-member callbacks.

use echo_protocol::{Options, PresenceAction, PresenceActionKind};
use echo_transport::{PresenceTracker, Socket};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::channel::{Channel, ChannelError, ChannelKind};
use crate::event_bus::{EventCallback, UnsubscribeToken};
use crate::handlers::HandlerRegistry;
use crate::private_channel::PrivateChannel;

/// A private channel that also tracks its members.
pub struct PresenceChannel {
    channel: PrivateChannel,
    tracker: Arc<dyn PresenceTracker>,
}

impl PresenceChannel {
    /// Create and subscribe a presence channel.
    ///
    /// # Errors
    ///
    /// See [`crate::SocketChannel::new`].
    pub fn new(
        socket: Arc<dyn Socket>,
        handlers: &HandlerRegistry,
        name: impl Into<String>,
        options: Options,
        tracker: Arc<dyn PresenceTracker>,
    ) -> Result<Self, ChannelError> {
        let channel =
            PrivateChannel::with_kind(socket, handlers, name, ChannelKind::Presence, options)?;
        Ok(Self { channel, tracker })
    }

    /// Call `callback` with the full member list on every membership change.
    pub fn here<F>(&self, callback: F) -> &Self
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        let tracker = Arc::downgrade(&self.tracker);
        let name = self.name().to_owned();
        self.tracker.track_presence(
            self.name(),
            Arc::new(move |_: &PresenceAction| {
                if let Some(tracker) = tracker.upgrade() {
                    callback(&tracker.presence_list(&name));
                }
            }),
        );
        self
    }

    /// Call `callback` with the username of every member that joins.
    pub fn joining<F>(&self, callback: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_action(PresenceActionKind::Join, callback)
    }

    /// Call `callback` with the username of every member that leaves.
    pub fn leaving<F>(&self, callback: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_action(PresenceActionKind::Leave, callback)
    }

    fn on_action<F>(&self, kind: PresenceActionKind, callback: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.tracker.track_presence(
            self.name(),
            Arc::new(move |action: &PresenceAction| {
                if action.action == kind {
                    callback(&action.username);
                }
            }),
        );
        self
    }

    /// Current members.
    #[must_use]
    pub fn members(&self) -> Vec<String> {
        self.tracker.presence_list(self.name())
    }
}

impl Deref for PresenceChannel {
    type Target = PrivateChannel;

    fn deref(&self) -> &Self::Target {
        &self.channel
    }
}

impl Channel for PresenceChannel {
    fn name(&self) -> &str {
        self.channel.name()
    }

    fn options(&self) -> Options {
        self.channel.options()
    }

    fn listen_callback(
        &self,
        event: &str,
        callback: EventCallback,
    ) -> Result<UnsubscribeToken, ChannelError> {
        self.channel.listen_callback(event, callback)
    }
}

impl fmt::Debug for PresenceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceChannel")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_transport::{MemoryPresence, MemorySocket};
    use parking_lot::Mutex;

    fn presence() -> (Arc<MemoryPresence>, PresenceChannel) {
        let socket = Arc::new(MemorySocket::new());
        let tracker = Arc::new(MemoryPresence::new());
        let handlers = HandlerRegistry::new();
        let channel = PresenceChannel::new(
            socket,
            &handlers,
            "presence-room",
            Options::new().with_defaults(),
            tracker.clone(),
        )
        .unwrap();
        (tracker, channel)
    }

    #[test]
    fn test_here_reports_member_list() {
        let (tracker, channel) = presence();
        let lists = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lists);
        channel.here(move |members: &[String]| sink.lock().push(members.to_vec()));

        assert_eq!(tracker.handler_count("presence-room"), 1);
        tracker.apply("presence-room", &PresenceAction::join("alice"));
        tracker.apply("presence-room", &PresenceAction::join("bob"));

        let lists = lists.lock();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[1], vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn test_joining_and_leaving() {
        let (tracker, channel) = presence();
        let joined = Arc::new(Mutex::new(Vec::new()));
        let left = Arc::new(Mutex::new(Vec::new()));

        let join_sink = Arc::clone(&joined);
        let leave_sink = Arc::clone(&left);
        channel
            .joining(move |user: &str| join_sink.lock().push(user.to_owned()))
            .leaving(move |user: &str| leave_sink.lock().push(user.to_owned()));

        tracker.apply("presence-room", &PresenceAction::join("alice"));
        tracker.apply("presence-room", &PresenceAction::join("bob"));
        tracker.apply("presence-room", &PresenceAction::leave("alice"));

        assert_eq!(tracker.handler_count("presence-room"), 2);
        assert_eq!(*joined.lock(), vec!["alice", "bob"]);
        assert_eq!(*left.lock(), vec!["alice"]);
        assert_eq!(channel.members(), vec!["bob".to_string()]);
    }

    #[test]
    fn test_other_channels_are_ignored() {
        let (tracker, channel) = presence();
        let joined = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&joined);
        channel.joining(move |user: &str| sink.lock().push(user.to_owned()));

        tracker.apply("presence-lobby", &PresenceAction::join("carol"));
        assert!(joined.lock().is_empty());
        assert_eq!(tracker.handler_count("presence-room"), 1);
        assert_eq!(tracker.handler_count("presence-lobby"), 0);
    }

    #[test]
    fn test_presence_supports_whisper() {
        let (_tracker, channel) = presence();
        channel.whisper("typing", serde_json::json!({})).unwrap();
        assert_eq!(channel.kind(), ChannelKind::Presence);
    }
}
