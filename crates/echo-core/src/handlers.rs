//! Connection-level handler registry.
//!
//! Events such as `subscribeFail` or `disconnect` belong to the socket, not
//! to a channel. Every channel asks for them to be observed, so the connector
//! keeps a set of the event kinds already bound and each kind is bound once.

use dashmap::DashSet;
use echo_transport::{EventHandler, Socket};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{error, trace, warn};

use crate::metrics;

/// Connection-scoped socket events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    /// Handshake completed.
    Connect,
    /// The server confirmed a channel subscription.
    Subscribe,
    /// The server refused a channel subscription.
    SubscribeFail,
    /// Socket error.
    Error,
    /// The connection attempt was aborted.
    ConnectAbort,
    /// The connection dropped.
    Disconnect,
}

impl ConnectionEvent {
    /// Events bound only when debug mode is enabled.
    pub const DEBUG_ONLY: [ConnectionEvent; 3] =
        [Self::Error, Self::ConnectAbort, Self::Disconnect];

    /// Socket event name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Subscribe => "subscribe",
            Self::SubscribeFail => "subscribeFail",
            Self::Error => "error",
            Self::ConnectAbort => "connectAbort",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of connection events that already have a handler.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    bound: DashSet<ConnectionEvent>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `event` unless a handler is already bound.
    ///
    /// Returns `true` if the handler was bound by this call.
    pub fn bind_once(&self, socket: &dyn Socket, event: ConnectionEvent, handler: EventHandler) -> bool {
        if !self.bound.insert(event) {
            return false;
        }

        socket.on(event.as_str(), handler);
        trace!(event = %event, "Connection handler bound");
        true
    }

    /// Check whether `event` has a handler.
    #[must_use]
    pub fn is_bound(&self, event: ConnectionEvent) -> bool {
        self.bound.contains(&event)
    }

    /// Number of bound events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bound.len()
    }

    /// Check whether nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}

/// Handler that logs a connection failure event.
#[must_use]
pub fn failure_logger(event: ConnectionEvent) -> EventHandler {
    let kind = event.as_str();
    Arc::new(move |payload: &Value| {
        metrics::record_connection_failure(kind);
        match event {
            ConnectionEvent::SubscribeFail => warn!(error = %payload, "Subscribe fail"),
            _ => error!(event = kind, error = %payload, "Connection failure"),
        }
    })
}
