//! Channel contract shared by public, private and presence channels.
//!
//! Channels are named subscription streams multiplexed over one socket. The
//! channel kind is encoded in the name prefix: bare names are public,
//! `private-<name>` channels require authentication and `presence-<name>`
//! channels additionally track membership.

use echo_protocol::events::{NOTIFICATION_EVENT, PRESENCE_PREFIX, PRIVATE_PREFIX, WHISPER_PREFIX};
use echo_protocol::{Options, OptionsError};
use echo_transport::TransportError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::event_bus::{EventBusError, EventCallback, UnsubscribeToken};

/// Channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Event bus rejected the arguments.
    #[error(transparent)]
    EventBus(#[from] EventBusError),

    /// Malformed channel options.
    #[error(transparent)]
    Configuration(#[from] OptionsError),

    /// The transport call failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Kind of a channel, derived from its name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// No authentication.
    Public,
    /// Authenticated, supports whispers.
    Private,
    /// Authenticated, supports whispers and membership tracking.
    Presence,
}

impl ChannelKind {
    /// Every kind, in the order `leave` visits them.
    pub const ALL: [ChannelKind; 3] = [Self::Public, Self::Private, Self::Presence];

    /// Name prefix of this kind.
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Public => "",
            Self::Private => PRIVATE_PREFIX,
            Self::Presence => PRESENCE_PREFIX,
        }
    }

    /// Fully qualified channel name.
    #[must_use]
    pub fn qualify(&self, name: &str) -> String {
        format!("{}{}", self.prefix(), name)
    }

    /// Kind encoded in a fully qualified name.
    #[must_use]
    pub fn of(name: &str) -> Self {
        if name.starts_with(PRESENCE_PREFIX) {
            Self::Presence
        } else if name.starts_with(PRIVATE_PREFIX) {
            Self::Private
        } else {
            Self::Public
        }
    }

    /// Whether channels of this kind request authentication.
    #[must_use]
    pub fn requires_auth(&self) -> bool {
        !matches!(self, Self::Public)
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Presence => "presence",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Constructed, nothing sent yet.
    #[default]
    Idle,
    /// Authentication requested, answer not yet received.
    AuthPending,
    /// Subscribe issued, waiting for the server.
    Subscribing,
    /// The server confirmed the subscription.
    Subscribed,
    /// Unsubscribed by the application.
    Unsubscribed,
}

/// Operations every channel supports.
pub trait Channel {
    /// Fully qualified channel name.
    fn name(&self) -> &str;

    /// Snapshot of the channel options.
    fn options(&self) -> Options;

    /// Register a shared callback for an application event name.
    ///
    /// # Errors
    ///
    /// Returns an error if the formatted event name is rejected by the bus.
    fn listen_callback(
        &self,
        event: &str,
        callback: EventCallback,
    ) -> Result<UnsubscribeToken, ChannelError>;

    /// Listen for an event on the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the formatted event name is rejected by the bus.
    fn listen<F>(&self, event: &str, callback: F) -> Result<&Self, ChannelError>
    where
        F: Fn(&Value) + Send + Sync + 'static,
        Self: Sized,
    {
        self.listen_callback(event, Arc::new(callback))?;
        Ok(self)
    }

    /// Listen for broadcast notifications.
    ///
    /// # Errors
    ///
    /// See [`Channel::listen`].
    fn notification<F>(&self, callback: F) -> Result<&Self, ChannelError>
    where
        F: Fn(&Value) + Send + Sync + 'static,
        Self: Sized,
    {
        self.listen(NOTIFICATION_EVENT, callback)
    }

    /// Listen for a client whisper.
    ///
    /// # Errors
    ///
    /// See [`Channel::listen`].
    fn listen_for_whisper<F>(&self, event: &str, callback: F) -> Result<&Self, ChannelError>
    where
        F: Fn(&Value) + Send + Sync + 'static,
        Self: Sized,
    {
        self.listen(&format!(".{WHISPER_PREFIX}{event}"), callback)
    }

    /// Whether the `debug` option is enabled.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `debug` is set to a non-boolean value.
    fn is_debug(&self) -> Result<bool, ChannelError> {
        Ok(self.options().is_debug()?)
    }
}
