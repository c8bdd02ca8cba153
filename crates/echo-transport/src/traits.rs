//! Transport abstraction traits for Echo Cluster.
//!
//! These traits describe the client-side socket and presence tracker the
//! channel layer drives. Delivery is callback based: handlers are invoked by
//! the transport when events arrive, and nothing here blocks.

use echo_protocol::{Envelope, Options, PresenceAction, ProtocolError};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Callback for connection-level socket events.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Callback receiving every envelope published on a watched channel.
pub type WatchHandler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Acknowledgement callback of an emitted event.
pub type AckHandler = Box<dyn FnOnce(Result<(), TransportError>) + Send>;

/// Callback receiving presence tracker actions.
pub type PresenceHandler = Arc<dyn Fn(&PresenceAction) + Send + Sync>;

static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_handle() -> u64 {
    HANDLE_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Identifier the transport assigns to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocketId(pub String);

impl SocketId {
    /// Create a new socket ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random socket ID.
    #[must_use]
    pub fn generate() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Self(format!("sock_{:x}{:x}", timestamp, next_handle()))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SocketId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SocketId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Handle of a connection-level listener, used to unbind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocate a fresh listener handle.
    #[must_use]
    pub fn next() -> Self {
        Self(next_handle())
    }
}

/// Handle of a channel watcher, used to unbind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Allocate a fresh watcher handle.
    #[must_use]
    pub fn next() -> Self {
        Self(next_handle())
    }
}

/// Authentication state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// No valid token.
    #[default]
    Unauthenticated,
    /// The server accepted a token for this connection.
    Authenticated,
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed or destroyed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Subscribing to a channel failed.
    #[error("Subscribe to {channel} failed: {reason}")]
    SubscribeFailed {
        /// Channel name.
        channel: String,
        /// Reason reported by the transport.
        reason: String,
    },

    /// Publishing failed.
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// The server rejected an emitted event.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Payload encoding error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// A client connection to the realtime cluster.
///
/// Implementations deliver connection events to handlers bound with `on` and
/// channel envelopes to watchers bound with `watch`. Handlers must never be
/// invoked while the implementation holds an internal lock, because channel
/// code re-enters the socket from inside them.
pub trait Socket: Send + Sync {
    /// Connection identifier, once the handshake assigned one.
    fn id(&self) -> Option<SocketId>;

    /// Current authentication state.
    fn auth_state(&self) -> AuthState;

    /// Whether the connection is authenticated.
    fn is_authenticated(&self) -> bool {
        self.auth_state() == AuthState::Authenticated
    }

    /// Bind a handler to a connection-level event.
    fn on(&self, event: &str, handler: EventHandler) -> ListenerId;

    /// Unbind one handler, or every handler of `event` when `listener` is `None`.
    fn off(&self, event: &str, listener: Option<ListenerId>);

    /// Subscribe to a channel.
    fn subscribe(&self, channel: &str, options: &Options) -> Result<(), TransportError>;

    /// Unsubscribe from a channel.
    fn unsubscribe(&self, channel: &str) -> Result<(), TransportError>;

    /// Publish an envelope on a channel.
    fn publish(&self, channel: &str, envelope: Envelope) -> Result<(), TransportError>;

    /// Watch the envelopes published on a channel.
    fn watch(&self, channel: &str, handler: WatchHandler) -> WatcherId;

    /// Stop watching a channel: one watcher, or all of them when `watcher` is `None`.
    fn unwatch(&self, channel: &str, watcher: Option<WatcherId>);

    /// Emit an event to the server; `ack` runs when the server answers.
    fn emit(&self, event: &str, payload: Value, ack: AckHandler) -> Result<(), TransportError>;

    /// Drop the connection's authentication token.
    fn deauthenticate(&self) -> Result<(), TransportError>;

    /// Tear the connection down.
    fn destroy(&self) -> Result<(), TransportError>;
}

/// Creates socket connections (`create(options)`).
pub trait SocketFactory: Send + Sync {
    /// Open a connection configured by `options`.
    fn create(&self, options: &Options) -> Result<Arc<dyn Socket>, TransportError>;
}

/// Tracks channel membership on top of a socket.
pub trait PresenceTracker: Send + Sync {
    /// Register a handler for membership actions on a channel.
    fn track_presence(&self, channel: &str, handler: PresenceHandler);

    /// Current members of a channel.
    fn presence_list(&self, channel: &str) -> Vec<String>;
}

/// Creates a presence tracker bound to a socket.
pub trait PresenceFactory: Send + Sync {
    /// Bind a tracker to `socket`.
    fn create(&self, socket: Arc<dyn Socket>) -> Arc<dyn PresenceTracker>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_id_generation() {
        let id1 = SocketId::generate();
        let id2 = SocketId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("sock_"));
    }

    #[test]
    fn test_socket_id_from_string() {
        let id: SocketId = "test-id".into();
        assert_eq!(id.as_str(), "test-id");
        assert_eq!(id.to_string(), "test-id");
    }

    #[test]
    fn test_handles_are_unique() {
        assert_ne!(ListenerId::next(), ListenerId::next());
        assert_ne!(WatcherId::next(), WatcherId::next());
    }
}
