//! Channel bound to a cluster socket.
//!
//! Construction performs the whole subscribe sequence: optional
//! authentication request, connection handler binding, the transport
//! subscribe, and installation of the watcher that relays every envelope
//! into the channel's event bus.

use echo_protocol::events::LOGIN_EVENT;
use echo_protocol::{AuthRequest, Envelope, EventFormatter, Options};
use echo_transport::{EventHandler, ListenerId, Socket, TransportError, WatchHandler, WatcherId};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelError, ChannelKind, ChannelState};
use crate::event_bus::{EventBus, EventCallback, UnsubscribeToken};
use crate::handlers::{failure_logger, ConnectionEvent, HandlerRegistry};
use crate::metrics;

/// A channel subscribed over a [`Socket`].
pub struct SocketChannel {
    name: String,
    kind: ChannelKind,
    socket: Arc<dyn Socket>,
    options: RwLock<Options>,
    formatter: RwLock<EventFormatter>,
    bus: Arc<EventBus>,
    state: Mutex<ChannelState>,
    relay: Mutex<Option<WatcherId>>,
}

impl SocketChannel {
    /// Create a channel and subscribe it.
    ///
    /// `name` is the fully qualified channel name. Channels of a kind that
    /// requires authentication emit a `login` request first unless the
    /// socket is already authenticated.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the `debug` option is not a boolean and
    /// `Transport` if the subscribe call fails.
    pub fn new(
        socket: Arc<dyn Socket>,
        handlers: &HandlerRegistry,
        name: impl Into<String>,
        kind: ChannelKind,
        options: Options,
    ) -> Result<Self, ChannelError> {
        let formatter = EventFormatter::new(options.namespace());
        let channel = Self {
            name: name.into(),
            kind,
            socket,
            options: RwLock::new(options),
            formatter: RwLock::new(formatter),
            bus: Arc::new(EventBus::new()),
            state: Mutex::new(ChannelState::Idle),
            relay: Mutex::new(None),
        };

        channel.subscribe(handlers)?;
        Ok(channel)
    }

    fn subscribe(&self, handlers: &HandlerRegistry) -> Result<(), ChannelError> {
        let debug = self.is_debug()?;

        if self.kind.requires_auth() {
            if self.socket.is_authenticated() {
                debug!(channel = %self.name, "Socket already authenticated");
            } else {
                self.set_state(ChannelState::AuthPending);
                self.authenticate();
                self.options
                    .write()
                    .merge(Options::new().with("waitForAuth", true));
            }
        }

        handlers.bind_once(
            self.socket.as_ref(),
            ConnectionEvent::SubscribeFail,
            failure_logger(ConnectionEvent::SubscribeFail),
        );
        if debug {
            for event in ConnectionEvent::DEBUG_ONLY {
                handlers.bind_once(self.socket.as_ref(), event, failure_logger(event));
            }
        }

        self.socket.subscribe(&self.name, &self.options.read())?;
        self.set_state(ChannelState::Subscribing);

        self.bus.clear();
        let relay = self.socket.watch(&self.name, self.relay_handler(debug));
        *self.relay.lock() = Some(relay);

        debug!(channel = %self.name, kind = %self.kind, "Channel subscribed");
        Ok(())
    }

    fn authenticate(&self) {
        let request = {
            let options = self.options.read();
            AuthRequest::new(options.auth_url(), self.name.as_str())
                .with_headers(options.auth_headers())
                .with_cookie(options.cookie())
        };

        let payload = match serde_json::to_value(&request) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(channel = %self.name, error = %e, "Can not encode authentication request");
                metrics::record_auth("failed");
                return;
            }
        };

        let channel = self.name.clone();
        let ack = Box::new(move |result: Result<(), TransportError>| match result {
            Ok(()) => {
                info!(channel = %channel, "Got permissions for channel");
                metrics::record_auth("granted");
            }
            Err(e) => {
                warn!(channel = %channel, reason = %e, "Can not authenticate, invalid permissions for channel");
                metrics::record_auth("denied");
            }
        });

        match self.socket.emit(LOGIN_EVENT, payload, ack) {
            Ok(()) => metrics::record_auth("sent"),
            Err(e) => {
                warn!(channel = %self.name, error = %e, "Authentication request failed");
                metrics::record_auth("failed");
            }
        }
    }

    fn relay_handler(&self, debug: bool) -> WatchHandler {
        let bus = Arc::clone(&self.bus);
        let channel = self.name.clone();
        let seen = Mutex::new(HashSet::new());

        Arc::new(move |envelope: &Envelope| {
            if debug {
                if seen.lock().insert(envelope.event.clone()) {
                    debug!(channel = %channel, event = %envelope.event, "Listening to event");
                } else {
                    debug!(channel = %channel, event = %envelope.event, data = %envelope.data, "Got a new message");
                }
            }

            metrics::record_event_delivered();
            if let Err(e) = bus.publish(&envelope.event, &envelope.data) {
                warn!(channel = %channel, event = %envelope.event, error = %e, "Dropped envelope");
            }
        })
    }

    /// Stop the callback registered under `token`.
    pub fn stop_listening(&self, token: UnsubscribeToken) -> bool {
        self.bus.unsubscribe(token)
    }

    /// Unsubscribe from the channel.
    ///
    /// Drops the connection's authentication first if it has one, then clears
    /// every event callback.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the socket rejects the unsubscribe.
    pub fn unsubscribe(&self) -> Result<(), ChannelError> {
        if self.socket.is_authenticated() {
            self.socket.deauthenticate()?;
        }
        self.socket.unsubscribe(&self.name)?;
        self.bus.clear();
        self.set_state(ChannelState::Unsubscribed);
        debug!(channel = %self.name, "Channel unsubscribed");
        Ok(())
    }

    /// Bind a connection-level handler.
    pub fn on<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        self.socket.on(event, handler)
    }

    /// Unbind a connection-level handler, or all handlers of `event`.
    pub fn off(&self, event: &str, listener: Option<ListenerId>) {
        self.socket.off(event, listener);
    }

    /// Watch the raw envelopes of this channel.
    pub fn watch<F>(&self, handler: F) -> WatcherId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.socket.watch(&self.name, Arc::new(handler))
    }

    /// Stop one watcher, or every watcher of the channel.
    pub fn unwatch(&self, watcher: Option<WatcherId>) {
        {
            let mut relay = self.relay.lock();
            if watcher.is_none() || watcher == *relay {
                *relay = None;
            }
        }
        self.socket.unwatch(&self.name, watcher);
    }

    /// Remove only the relay watcher this channel installed.
    pub(crate) fn detach_relay(&self) {
        let relay = self.relay.lock().take();
        if let Some(relay) = relay {
            self.socket.unwatch(&self.name, Some(relay));
        }
    }

    /// Record the server's subscription confirmation.
    pub(crate) fn mark_subscribed(&self) {
        let mut state = self.state.lock();
        if matches!(*state, ChannelState::AuthPending | ChannelState::Subscribing) {
            *state = ChannelState::Subscribed;
        }
    }

    fn set_state(&self, state: ChannelState) {
        *self.state.lock() = state;
    }

    /// Current subscription state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    /// Channel kind.
    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// The event bus fed by this channel's watcher.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The socket this channel is subscribed on.
    #[must_use]
    pub fn socket(&self) -> &Arc<dyn Socket> {
        &self.socket
    }

    /// Event name formatter of this channel.
    #[must_use]
    pub fn formatter(&self) -> EventFormatter {
        self.formatter.read().clone()
    }

    /// Change the namespace used to qualify event names in later `listen` calls.
    ///
    /// `None` or an empty namespace disables qualification.
    pub fn set_namespace(&self, namespace: Option<&str>) {
        self.formatter.write().set_namespace(namespace);
    }
}

impl Channel for SocketChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> Options {
        self.options.read().clone()
    }

    fn listen_callback(
        &self,
        event: &str,
        callback: EventCallback,
    ) -> Result<UnsubscribeToken, ChannelError> {
        let event = self.formatter.read().format(event);
        Ok(self.bus.subscribe_callback(&event, callback)?)
    }
}

impl fmt::Debug for SocketChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketChannel")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_protocol::events::NOTIFICATION_EVENT;
    use echo_transport::{AuthState, MemorySocket};
    use serde_json::json;

    fn options() -> Options {
        Options::new().with("location", "https://app.test").with_defaults()
    }

    fn recorder() -> (Arc<Mutex<Vec<Value>>>, impl Fn(&Value) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |data: &Value| sink.lock().push(data.clone()))
    }

    fn public(socket: &Arc<MemorySocket>, name: &str, options: Options) -> SocketChannel {
        let handlers = HandlerRegistry::new();
        SocketChannel::new(socket.clone(), &handlers, name, ChannelKind::Public, options).unwrap()
    }

    #[test]
    fn test_public_channel_subscribes_without_auth() {
        let socket = Arc::new(MemorySocket::new());
        let channel = public(&socket, "orders", options());

        assert!(socket.is_subscribed("orders"));
        assert!(socket.emitted().is_empty());
        assert_eq!(socket.watcher_count("orders"), 1);
        assert_eq!(channel.state(), ChannelState::Subscribing);
        assert!(!channel.options().contains("waitForAuth"));
    }

    #[test]
    fn test_listen_formats_with_namespace() {
        let socket = Arc::new(MemorySocket::new());
        let channel = public(&socket, "orders", options());
        let (seen, cb) = recorder();

        channel.listen("OrderShipped", cb).unwrap();
        socket.deliver(
            "orders",
            &Envelope::new("App\\Events\\OrderShipped", json!({"id": 7})),
        );

        assert_eq!(*seen.lock(), vec![json!({"id": 7})]);
    }

    #[test]
    fn test_listen_chains() {
        let socket = Arc::new(MemorySocket::new());
        let channel = public(&socket, "orders", options());

        channel
            .listen("OrderShipped", |_: &Value| {})
            .unwrap()
            .listen(".raw-event", |_: &Value| {})
            .unwrap();

        assert!(channel.bus().has_subscriber("App\\Events\\OrderShipped"));
        assert!(channel.bus().has_subscriber("raw-event"));
    }

    #[test]
    fn test_notification_and_whisper_names() {
        let socket = Arc::new(MemorySocket::new());
        let channel = public(&socket, "orders", options());

        channel.notification(|_: &Value| {}).unwrap();
        channel.listen_for_whisper("typing", |_: &Value| {}).unwrap();

        assert!(channel.bus().has_subscriber(
            &EventFormatter::new(None).format(NOTIFICATION_EVENT)
        ));
        assert!(channel.bus().has_subscriber("client-typing"));
    }

    #[test]
    fn test_private_kind_requests_auth() {
        let socket = Arc::new(MemorySocket::new());
        let options = options().with("auth", json!({"headers": {"Authorization": "Bearer t"}}));
        let handlers = HandlerRegistry::new();
        let channel = SocketChannel::new(
            socket.clone(),
            &handlers,
            "private-orders",
            ChannelKind::Private,
            options.with("cookie", "session=abc"),
        )
        .unwrap();

        let emitted = socket.emitted();
        assert_eq!(emitted.len(), 1);
        let (event, payload) = &emitted[0];
        assert_eq!(event, "login");
        assert_eq!(payload["url"], json!("https://app.test/broadcasting/auth"));
        assert_eq!(payload["form"]["channel_name"], json!("private-orders"));
        assert_eq!(payload["headers"]["Authorization"], json!("Bearer t"));
        assert_eq!(payload["rejectUnauthorized"], json!(false));
        assert_eq!(payload["cookie"], json!("session=abc"));

        assert_eq!(channel.state(), ChannelState::Subscribing);
        assert_eq!(
            socket.subscription_options("private-orders").unwrap().get("waitForAuth"),
            Some(&json!(true))
        );

        assert!(socket.acknowledge_next(Ok(())));
        assert_eq!(channel.state(), ChannelState::Subscribing);
        channel.mark_subscribed();
        assert_eq!(channel.state(), ChannelState::Subscribed);
    }

    #[test]
    fn test_auth_answer_does_not_block_subscribing() {
        let socket = Arc::new(MemorySocket::new());
        let handlers = HandlerRegistry::new();
        let channel = SocketChannel::new(
            socket.clone(),
            &handlers,
            "private-orders",
            ChannelKind::Private,
            options(),
        )
        .unwrap();

        // Subscribe goes out before the login answer arrives.
        assert_eq!(socket.pending_acks(), 1);
        assert!(socket.is_subscribed("private-orders"));
        assert_eq!(channel.state(), ChannelState::Subscribing);

        assert!(socket.acknowledge_next(Err(TransportError::Rejected("forbidden".into()))));
        assert_eq!(channel.state(), ChannelState::Subscribing);
    }

    #[test]
    fn test_set_namespace_applies_to_later_listens() {
        let socket = Arc::new(MemorySocket::new());
        let channel = public(&socket, "orders", options());

        channel.listen("OrderShipped", |_: &Value| {}).unwrap();
        channel.set_namespace(Some("Shop.Events"));
        channel.listen("OrderPaid", |_: &Value| {}).unwrap();
        channel.set_namespace(None);
        channel.listen("OrderRefunded", |_: &Value| {}).unwrap();

        assert!(channel.bus().has_subscriber("App\\Events\\OrderShipped"));
        assert!(channel.bus().has_subscriber("Shop\\Events\\OrderPaid"));
        assert!(channel.bus().has_subscriber("OrderRefunded"));
        assert_eq!(channel.formatter().namespace(), None);
    }

    #[test]
    fn test_authenticated_socket_skips_login() {
        let socket = Arc::new(MemorySocket::new());
        socket.set_auth_state(AuthState::Authenticated);
        let handlers = HandlerRegistry::new();
        let channel = SocketChannel::new(
            socket.clone(),
            &handlers,
            "private-orders",
            ChannelKind::Private,
            options(),
        )
        .unwrap();

        assert!(socket.emitted().is_empty());
        assert!(!channel.options().contains("waitForAuth"));
        assert_eq!(channel.state(), ChannelState::Subscribing);
    }

    #[test]
    fn test_denied_auth_keeps_channel() {
        let socket = Arc::new(MemorySocket::new());
        let handlers = HandlerRegistry::new();
        let channel = SocketChannel::new(
            socket.clone(),
            &handlers,
            "private-orders",
            ChannelKind::Private,
            options(),
        )
        .unwrap();

        assert!(socket.acknowledge_next(Err(TransportError::Rejected("forbidden".into()))));
        assert!(socket.is_subscribed(channel.name()));
    }

    #[test]
    fn test_debug_must_be_boolean() {
        let socket = Arc::new(MemorySocket::new());
        let handlers = HandlerRegistry::new();
        let result = SocketChannel::new(
            socket.clone(),
            &handlers,
            "orders",
            ChannelKind::Public,
            options().with("debug", "yes"),
        );

        let err = result.unwrap_err();
        assert!(matches!(err, ChannelError::Configuration(_)));
        assert_eq!(
            err.to_string(),
            r#"Option "debug" should be "boolean"! string given..."#
        );
        assert!(!socket.is_subscribed("orders"));
    }

    #[test]
    fn test_debug_handlers_bound_once() {
        let socket = Arc::new(MemorySocket::new());
        let handlers = HandlerRegistry::new();
        for name in ["a", "b", "c"] {
            SocketChannel::new(
                socket.clone(),
                &handlers,
                name,
                ChannelKind::Public,
                options().with("debug", true),
            )
            .unwrap();
        }

        for event in ["subscribeFail", "error", "connectAbort", "disconnect"] {
            assert_eq!(socket.listener_count(event), 1, "{event}");
        }
    }

    #[test]
    fn test_debug_handlers_skipped_without_debug() {
        let socket = Arc::new(MemorySocket::new());
        public(&socket, "orders", options());
        assert_eq!(socket.listener_count("subscribeFail"), 1);
        assert_eq!(socket.listener_count("disconnect"), 0);
    }

    #[test]
    fn test_null_data_is_dropped() {
        let socket = Arc::new(MemorySocket::new());
        let channel = public(&socket, "orders", options().with("debug", true));
        let (seen, cb) = recorder();
        channel.listen(".Ping", cb).unwrap();

        socket.deliver("orders", &Envelope::new("Ping", Value::Null));
        socket.deliver("orders", &Envelope::new("Ping", json!(1)));
        socket.deliver("orders", &Envelope::new("Ping", json!(2)));

        assert_eq!(*seen.lock(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_unsubscribe() {
        let socket = Arc::new(MemorySocket::new());
        socket.set_auth_state(AuthState::Authenticated);
        let channel = public(&socket, "orders", options());
        let (seen, cb) = recorder();
        channel.listen(".Ping", cb).unwrap();

        channel.unsubscribe().unwrap();

        assert_eq!(socket.deauthentications(), 1);
        assert!(!socket.is_subscribed("orders"));
        assert_eq!(channel.state(), ChannelState::Unsubscribed);
        socket.deliver("orders", &Envelope::new("Ping", json!(1)));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_unsubscribe_unauthenticated_skips_deauth() {
        let socket = Arc::new(MemorySocket::new());
        let channel = public(&socket, "orders", options());
        channel.unsubscribe().unwrap();
        assert_eq!(socket.deauthentications(), 0);
    }

    #[test]
    fn test_stop_listening() {
        let socket = Arc::new(MemorySocket::new());
        let channel = public(&socket, "orders", options());
        let (seen, cb) = recorder();
        let token = channel.listen_callback(".Ping", Arc::new(cb)).unwrap();

        assert!(channel.stop_listening(token));
        socket.deliver("orders", &Envelope::new("Ping", json!(1)));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_watch_and_unwatch() {
        let socket = Arc::new(MemorySocket::new());
        let channel = public(&socket, "orders", options());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let watcher = channel.watch(move |envelope: &Envelope| sink.lock().push(envelope.event.clone()));
        assert_eq!(socket.watcher_count("orders"), 2);

        socket.deliver("orders", &Envelope::new("Ping", json!(1)));
        channel.unwatch(Some(watcher));
        socket.deliver("orders", &Envelope::new("Ping", json!(2)));

        assert_eq!(*events.lock(), vec!["Ping".to_string()]);
        assert_eq!(socket.watcher_count("orders"), 1);

        channel.unwatch(None);
        assert_eq!(socket.watcher_count("orders"), 0);
    }

    #[test]
    fn test_on_and_off() {
        let socket = Arc::new(MemorySocket::new());
        let channel = public(&socket, "orders", options());
        let (seen, cb) = recorder();

        let listener = channel.on("custom", cb);
        socket.fire("custom", &json!("x"));
        channel.off("custom", Some(listener));
        socket.fire("custom", &json!("y"));

        assert_eq!(*seen.lock(), vec![json!("x")]);
    }

    #[test]
    fn test_mark_subscribed() {
        let socket = Arc::new(MemorySocket::new());
        let channel = public(&socket, "orders", options());
        channel.mark_subscribed();
        assert_eq!(channel.state(), ChannelState::Subscribed);

        channel.unsubscribe().unwrap();
        channel.mark_subscribed();
        assert_eq!(channel.state(), ChannelState::Unsubscribed);
    }
}
