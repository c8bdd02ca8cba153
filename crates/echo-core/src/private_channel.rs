//! Private channels.

use echo_protocol::{Envelope, Options};
use echo_transport::Socket;
use serde_json::Value;
use std::ops::Deref;
use std::sync::Arc;
use tracing::trace;

use crate::channel::{Channel, ChannelError, ChannelKind};
use crate::event_bus::{EventCallback, UnsubscribeToken};
use crate::handlers::HandlerRegistry;
use crate::metrics;
use crate::socket_channel::SocketChannel;

/// An authenticated channel that can carry client whispers.
#[derive(Debug)]
pub struct PrivateChannel {
    channel: SocketChannel,
}

impl PrivateChannel {
    /// Create and subscribe a private channel.
    ///
    /// # Errors
    ///
    /// See [`SocketChannel::new`].
    pub fn new(
        socket: Arc<dyn Socket>,
        handlers: &HandlerRegistry,
        name: impl Into<String>,
        options: Options,
    ) -> Result<Self, ChannelError> {
        Self::with_kind(socket, handlers, name, ChannelKind::Private, options)
    }

    pub(crate) fn with_kind(
        socket: Arc<dyn Socket>,
        handlers: &HandlerRegistry,
        name: impl Into<String>,
        kind: ChannelKind,
        options: Options,
    ) -> Result<Self, ChannelError> {
        let channel = SocketChannel::new(socket, handlers, name, kind, options)?;
        Ok(Self { channel })
    }

    /// Publish a client event to the other members of the channel.
    ///
    /// The envelope goes out as `client-<event>`.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the socket refuses the publish.
    pub fn whisper(&self, event: &str, data: Value) -> Result<&Self, ChannelError> {
        self.channel
            .socket()
            .publish(self.channel.name(), Envelope::whisper(event, data))?;
        metrics::record_whisper();
        trace!(channel = %self.channel.name(), event = %event, "Whisper published");
        Ok(self)
    }
}

impl Deref for PrivateChannel {
    type Target = SocketChannel;

    fn deref(&self) -> &Self::Target {
        &self.channel
    }
}

impl Channel for PrivateChannel {
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
