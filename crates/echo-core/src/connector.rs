//! Socket connector and channel registry.
//!
//! The connector owns the cluster socket and hands out one channel instance
//! per fully qualified name. Channel handles are shared: asking twice for the
//! same name returns the same `Arc`.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use echo_protocol::Options;
use echo_transport::{
    EventHandler, ListenerId, PresenceFactory, PresenceTracker, Socket, SocketFactory, SocketId,
    TransportError,
};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, info};

use crate::channel::{Channel, ChannelError, ChannelKind};
use crate::handlers::{ConnectionEvent, HandlerRegistry};
use crate::metrics;
use crate::presence_channel::PresenceChannel;
use crate::private_channel::PrivateChannel;
use crate::socket_channel::SocketChannel;

/// Connector errors.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// No socket factory was supplied.
    #[error("Socket cluster client not found. Should be passed via the connector backend")]
    TransportUnavailable,

    /// A presence channel was requested without a presence factory.
    #[error("Presence tracker not found. Should be passed via the connector backend")]
    PresenceUnavailable,

    /// The name is already registered as another channel kind.
    #[error("Channel {name} is already registered as a {existing} channel")]
    KindMismatch {
        /// Fully qualified channel name.
        name: String,
        /// Kind of the registered channel.
        existing: ChannelKind,
    },

    /// Channel construction failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Transport error.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Transport implementations a connector is built from.
#[derive(Clone, Default)]
pub struct Backend {
    /// Creates the cluster socket.
    pub client: Option<Arc<dyn SocketFactory>>,
    /// Creates the presence tracker used by presence channels.
    pub presence: Option<Arc<dyn PresenceFactory>>,
}

impl Backend {
    /// Backend with a socket factory and no presence support.
    #[must_use]
    pub fn new(client: Arc<dyn SocketFactory>) -> Self {
        Self {
            client: Some(client),
            presence: None,
        }
    }

    /// Add a presence factory.
    #[must_use]
    pub fn with_presence(mut self, presence: Arc<dyn PresenceFactory>) -> Self {
        self.presence = Some(presence);
        self
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("client", &self.client.is_some())
            .field("presence", &self.presence.is_some())
            .finish()
    }
}

/// A registered channel of any kind.
#[derive(Debug, Clone)]
pub enum RegisteredChannel {
    /// Public channel.
    Public(Arc<SocketChannel>),
    /// Private channel.
    Private(Arc<PrivateChannel>),
    /// Presence channel.
    Presence(Arc<PresenceChannel>),
}

impl RegisteredChannel {
    /// The underlying socket channel.
    #[must_use]
    pub fn base(&self) -> &SocketChannel {
        match self {
            Self::Public(channel) => channel,
            Self::Private(channel) => channel,
            Self::Presence(channel) => channel,
        }
    }

    /// Kind of the registered channel.
    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        self.base().kind()
    }
}

/// Owner of the cluster socket and the channel registry.
pub struct Connector {
    options: Options,
    socket: Arc<dyn Socket>,
    channels: Arc<DashMap<String, RegisteredChannel>>,
    handlers: HandlerRegistry,
    presence_factory: Option<Arc<dyn PresenceFactory>>,
    presence: OnceLock<Arc<dyn PresenceTracker>>,
}

impl Connector {
    /// Apply defaults to `options` and connect.
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` if `backend` has no socket factory and
    /// `Transport` if the factory fails to open a socket.
    pub fn new(options: Options, backend: Backend) -> Result<Self, ConnectorError> {
        let client = backend.client.ok_or(ConnectorError::TransportUnavailable)?;
        let options = options.with_defaults();

        metrics::describe_metrics();
        let socket = client.create(&options)?;
        info!(socket_id = ?socket.id(), "Socket cluster client created");

        let connector = Self {
            options,
            socket,
            channels: Arc::new(DashMap::new()),
            handlers: HandlerRegistry::new(),
            presence_factory: backend.presence,
            presence: OnceLock::new(),
        };
        connector.bind_connection_handlers();
        Ok(connector)
    }

    fn bind_connection_handlers(&self) {
        self.handlers.bind_once(
            self.socket.as_ref(),
            ConnectionEvent::Connect,
            Arc::new(|status: &Value| info!(status = %status, "Socket connected")),
        );

        let channels = Arc::downgrade(&self.channels);
        let on_subscribe: EventHandler = Arc::new(move |payload: &Value| {
            let Some(name) = payload.as_str() else {
                debug!(payload = %payload, "Subscribe event without a channel name");
                return;
            };
            info!(channel = %name, "Connected to channel successfully");

            let Some(channels) = channels.upgrade() else {
                return;
            };
            let channel = channels.get(name).map(|entry| entry.value().clone());
            if let Some(channel) = channel {
                channel.base().mark_subscribed();
            }
        });
        self.handlers
            .bind_once(self.socket.as_ref(), ConnectionEvent::Subscribe, on_subscribe);
    }

    /// Get or create the public channel `name`.
    ///
    /// # Errors
    ///
    /// Returns `KindMismatch` if `name` is registered as another kind and
    /// `Channel` if the subscription fails.
    pub fn channel(&self, name: &str) -> Result<Arc<SocketChannel>, ConnectorError> {
        let name = ChannelKind::Public.qualify(name);
        self.resolve(
            name,
            ChannelKind::Public,
            |entry| match entry {
                RegisteredChannel::Public(channel) => Some(Arc::clone(channel)),
                _ => None,
            },
            |name| {
                let channel = SocketChannel::new(
                    Arc::clone(&self.socket),
                    &self.handlers,
                    name,
                    ChannelKind::Public,
                    self.options.clone(),
                )?;
                Ok(RegisteredChannel::Public(Arc::new(channel)))
            },
        )
    }

    /// Get or create the private channel `private-<name>`.
    ///
    /// # Errors
    ///
    /// See [`Connector::channel`].
    pub fn private_channel(&self, name: &str) -> Result<Arc<PrivateChannel>, ConnectorError> {
        let name = ChannelKind::Private.qualify(name);
        self.resolve(
            name,
            ChannelKind::Private,
            |entry| match entry {
                RegisteredChannel::Private(channel) => Some(Arc::clone(channel)),
                _ => None,
            },
            |name| {
                let channel = PrivateChannel::new(
                    Arc::clone(&self.socket),
                    &self.handlers,
                    name,
                    self.options.clone(),
                )?;
                Ok(RegisteredChannel::Private(Arc::new(channel)))
            },
        )
    }

    /// Get or create the presence channel `presence-<name>`.
    ///
    /// # Errors
    ///
    /// Returns `PresenceUnavailable` if the backend has no presence factory,
    /// otherwise see [`Connector::channel`].
    pub fn presence_channel(&self, name: &str) -> Result<Arc<PresenceChannel>, ConnectorError> {
        let name = ChannelKind::Presence.qualify(name);
        self.resolve(
            name,
            ChannelKind::Presence,
            |entry| match entry {
                RegisteredChannel::Presence(channel) => Some(Arc::clone(channel)),
                _ => None,
            },
            |name| {
                let tracker = self.presence_tracker()?;
                let channel = PresenceChannel::new(
                    Arc::clone(&self.socket),
                    &self.handlers,
                    name,
                    self.options.clone(),
                    tracker,
                )?;
                Ok(RegisteredChannel::Presence(Arc::new(channel)))
            },
        )
    }

    fn resolve<T>(
        &self,
        name: String,
        kind: ChannelKind,
        pick: impl Fn(&RegisteredChannel) -> Option<Arc<T>>,
        build: impl FnOnce(&str) -> Result<RegisteredChannel, ConnectorError>,
    ) -> Result<Arc<T>, ConnectorError> {
        let existing = self.channels.get(&name).map(|entry| entry.value().clone());
        if let Some(existing) = existing {
            return pick(&existing).ok_or(ConnectorError::KindMismatch {
                existing: existing.kind(),
                name,
            });
        }

        // Built outside the map lock: the socket may call back into the
        // registry while the channel subscribes.
        let created = build(&name)?;

        let registered = match self.channels.entry(name.clone()) {
            Entry::Occupied(entry) => {
                created.base().detach_relay();
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                metrics::record_channel_created(kind.as_str());
                debug!(channel = %name, kind = %kind, "Channel registered");
                entry.insert(created).value().clone()
            }
        };
        metrics::set_active_channels(self.channels.len());

        pick(&registered).ok_or(ConnectorError::KindMismatch {
            existing: registered.kind(),
            name,
        })
    }

    fn presence_tracker(&self) -> Result<Arc<dyn PresenceTracker>, ConnectorError> {
        if let Some(tracker) = self.presence.get() {
            return Ok(Arc::clone(tracker));
        }

        let factory = self
            .presence_factory
            .as_ref()
            .ok_or(ConnectorError::PresenceUnavailable)?;
        let tracker = self
            .presence
            .get_or_init(|| factory.create(Arc::clone(&self.socket)));
        Ok(Arc::clone(tracker))
    }

    /// Leave `name` in all three variants.
    ///
    /// Every registered channel among `name`, `private-<name>` and
    /// `presence-<name>` has its watchers detached and is removed from the
    /// registry. The transport subscription itself is kept.
    pub fn leave(&self, name: &str) {
        for kind in ChannelKind::ALL {
            let full = kind.qualify(name);
            if let Some((_, channel)) = self.channels.remove(&full) {
                channel.base().unwatch(None);
                debug!(channel = %full, "Left channel");
            }
        }
        metrics::set_active_channels(self.channels.len());
    }

    /// Listen for `event` on the public channel `name`.
    ///
    /// # Errors
    ///
    /// See [`Connector::channel`].
    pub fn listen<F>(&self, name: &str, event: &str, callback: F) -> Result<Arc<SocketChannel>, ConnectorError>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let channel = self.channel(name)?;
        channel.listen(event, callback).map_err(ConnectorError::Channel)?;
        Ok(channel)
    }

    /// Connection identifier, if the socket has one.
    #[must_use]
    pub fn socket_id(&self) -> Option<SocketId> {
        self.socket.id()
    }

    /// Register a callback for the socket's `close` event.
    pub fn on_close<F>(&self, callback: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.socket.on("close", Arc::new(move |_: &Value| callback()))
    }

    /// Destroy the socket.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the socket fails to tear down.
    pub fn disconnect(&self) -> Result<(), ConnectorError> {
        info!(socket_id = ?self.socket.id(), "Destroying socket cluster client");
        self.socket.destroy()?;
        Ok(())
    }

    /// Whether a channel with the fully qualified `name` is registered.
    #[must_use]
    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Number of registered channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Fully qualified names of the registered channels.
    #[must_use]
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Options after defaults were applied.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The cluster socket.
    #[must_use]
    pub fn socket(&self) -> &Arc<dyn Socket> {
        &self.socket
    }

    /// Connection handlers bound so far.
    #[must_use]
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("socket_id", &self.socket.id())
            .field("channels", &self.channel_names())
            .finish_non_exhaustive()
    }
}
