//! The `Echo` facade.

use echo_core::{
    Backend, Channel, Connector, ConnectorError, PresenceChannel, PrivateChannel, SocketChannel,
};
use echo_protocol::Options;
use echo_transport::SocketId;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::interceptor::{InterceptorRegistry, SocketIdInterceptor};

/// The only supported broadcaster.
pub const BROADCASTER: &str = "socketcluster";

/// Facade errors.
#[derive(Debug, Error)]
pub enum EchoError {
    /// `broadcaster` names something other than `socketcluster`.
    #[error("Broadcaster \"{0}\" is not supported. Other providers are unsupportable")]
    UnsupportedProvider(String),

    /// Connector error.
    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

/// Application entry point for channel subscriptions.
#[derive(Debug)]
pub struct Echo {
    connector: Connector,
}

impl Echo {
    /// Validate the broadcaster and connect.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedProvider` if `broadcaster` is missing or not
    /// `socketcluster`; no connection is attempted in that case.
    pub fn new(options: Options, backend: Backend) -> Result<Self, EchoError> {
        match options.broadcaster() {
            Some(BROADCASTER) => {}
            other => {
                return Err(EchoError::UnsupportedProvider(
                    other.unwrap_or("none").to_owned(),
                ))
            }
        }

        let connector = Connector::new(options, backend)?;
        info!(broadcaster = BROADCASTER, "Echo connected");
        Ok(Self { connector })
    }

    /// Register the `X-Socket-Id` interceptor with an HTTP client.
    pub fn register_interceptors(&self, registry: &dyn InterceptorRegistry) {
        let socket = Arc::clone(self.connector.socket());
        registry.register(Arc::new(SocketIdInterceptor::new(socket)));
        debug!("Socket id interceptor registered");
    }

    /// Get or create a public channel.
    ///
    /// # Errors
    ///
    /// See [`Connector::channel`].
    pub fn channel(&self, name: &str) -> Result<Arc<SocketChannel>, EchoError> {
        Ok(self.connector.channel(name)?)
    }

    /// Get or create the private channel `private-<name>`.
    ///
    /// # Errors
    ///
    /// See [`Connector::private_channel`].
    pub fn private(&self, name: &str) -> Result<Arc<PrivateChannel>, EchoError> {
        Ok(self.connector.private_channel(name)?)
    }

    /// Get or create the presence channel `presence-<name>`.
    ///
    /// # Errors
    ///
    /// See [`Connector::presence_channel`].
    pub fn join(&self, name: &str) -> Result<Arc<PresenceChannel>, EchoError> {
        Ok(self.connector.presence_channel(name)?)
    }

    /// Leave `name` in its public, private and presence variants.
    pub fn leave(&self, name: &str) {
        self.connector.leave(name);
    }

    /// Listen for `event` on the public channel `name`.
    ///
    /// # Errors
    ///
    /// See [`Connector::listen`].
    pub fn listen<F>(&self, name: &str, event: &str, callback: F) -> Result<Arc<SocketChannel>, EchoError>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Ok(self.connector.listen(name, event, callback)?)
    }

    /// Connection identifier.
    #[must_use]
    pub fn socket_id(&self) -> Option<SocketId> {
        self.connector.socket_id()
    }

    /// Destroy the connection.
    ///
    /// # Errors
    ///
    /// Returns the transport error if teardown fails.
    pub fn disconnect(&self) -> Result<(), EchoError> {
        Ok(self.connector.disconnect()?)
    }

    /// The underlying connector.
    #[must_use]
    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    /// Options after defaults were applied.
    #[must_use]
    pub fn options(&self) -> &Options {
        self.connector.options()
    }

    /// Whether debug mode is on; a malformed `debug` option counts as off.
    #[must_use]
    pub fn is_debug(&self) -> bool {
        self.options().is_debug().unwrap_or(false)
    }
}

/// Listen on a channel of any kind by its fully qualified name.
///
/// # Errors
///
/// Returns the error of the matching factory or of `listen`.
pub fn listen_qualified<F>(echo: &Echo, name: &str, event: &str, callback: F) -> Result<(), EchoError>
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    use echo_core::ChannelKind;
    use echo_protocol::events::{PRESENCE_PREFIX, PRIVATE_PREFIX};

    let result = match ChannelKind::of(name) {
        ChannelKind::Public => echo.channel(name)?.listen(event, callback).map(|_| ()),
        ChannelKind::Private => {
            let bare = name.strip_prefix(PRIVATE_PREFIX).unwrap_or(name);
            echo.private(bare)?.listen(event, callback).map(|_| ())
        }
        ChannelKind::Presence => {
            let bare = name.strip_prefix(PRESENCE_PREFIX).unwrap_or(name);
            echo.join(bare)?.listen(event, callback).map(|_| ())
        }
    };
    result.map_err(|e| EchoError::Connector(ConnectorError::Channel(e)))
}
