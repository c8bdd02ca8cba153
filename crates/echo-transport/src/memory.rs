//! In-memory loopback transport.
//!
//! `MemorySocket` keeps every subscription, publish and emit in process and
//! loops published envelopes back to the channel's watchers through the JSON
//! codec, the way a cluster echoes publishes to subscribed clients. Test code
//! and the replay tool drive it with `deliver`, `fire`, `confirm_subscription`
//! and `acknowledge_next`.

use echo_protocol::{codec, Envelope, Options, PresenceAction, PresenceActionKind};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::traits::{
    AckHandler, AuthState, EventHandler, ListenerId, PresenceFactory, PresenceHandler,
    PresenceTracker, Socket, SocketFactory, SocketId, TransportError, WatchHandler, WatcherId,
};

#[derive(Default)]
struct SocketState {
    auth_state: AuthState,
    destroyed: bool,
    listeners: HashMap<String, Vec<(ListenerId, EventHandler)>>,
    watchers: HashMap<String, Vec<(WatcherId, WatchHandler)>>,
    subscriptions: HashMap<String, Options>,
    subscribe_log: Vec<String>,
    published: Vec<(String, Envelope)>,
    emitted: Vec<(String, Value)>,
    pending_acks: VecDeque<AckHandler>,
    deauthentications: usize,
}

/// An in-process socket.
pub struct MemorySocket {
    id: SocketId,
    state: Mutex<SocketState>,
}

impl MemorySocket {
    /// Create a socket with a generated ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(SocketId::generate())
    }

    /// Create a socket with a fixed ID.
    #[must_use]
    pub fn with_id(id: impl Into<SocketId>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(SocketState::default()),
        }
    }

    /// Deliver an envelope to the watchers of `channel`.
    ///
    /// Returns the number of watchers invoked.
    pub fn deliver(&self, channel: &str, envelope: &Envelope) -> usize {
        let watchers: Vec<WatchHandler> = {
            let state = self.state.lock();
            state
                .watchers
                .get(channel)
                .map(|w| w.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        trace!(channel = %channel, event = %envelope.event, watchers = watchers.len(), "Delivering envelope");
        for watcher in &watchers {
            watcher(envelope);
        }
        watchers.len()
    }

    /// Fire a connection-level event.
    ///
    /// Returns the number of handlers invoked.
    pub fn fire(&self, event: &str, payload: &Value) -> usize {
        let handlers = self.handlers_for(event);
        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }

    /// Acknowledge a subscription the way the server does (`subscribe` event).
    pub fn confirm_subscription(&self, channel: &str) -> usize {
        self.fire("subscribe", &Value::from(channel))
    }

    /// Report a failed subscription (`subscribeFail` event).
    pub fn fail_subscription(&self, channel: &str, reason: &str) -> usize {
        self.fire(
            "subscribeFail",
            &serde_json::json!({"channel": channel, "reason": reason}),
        )
    }

    /// Answer the oldest pending emit.
    ///
    /// Returns `false` if nothing was waiting for an answer.
    pub fn acknowledge_next(&self, result: Result<(), TransportError>) -> bool {
        let ack = self.state.lock().pending_acks.pop_front();
        match ack {
            Some(ack) => {
                ack(result);
                true
            }
            None => false,
        }
    }

    /// Set the authentication state.
    pub fn set_auth_state(&self, auth_state: AuthState) {
        self.state.lock().auth_state = auth_state;
    }

    /// Whether `channel` is currently subscribed.
    #[must_use]
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.state.lock().subscriptions.contains_key(channel)
    }

    /// Options a channel was subscribed with.
    #[must_use]
    pub fn subscription_options(&self, channel: &str) -> Option<Options> {
        self.state.lock().subscriptions.get(channel).cloned()
    }

    /// Every `subscribe` call, in order.
    #[must_use]
    pub fn subscribe_log(&self) -> Vec<String> {
        self.state.lock().subscribe_log.clone()
    }

    /// Every envelope published through this socket.
    #[must_use]
    pub fn published(&self) -> Vec<(String, Envelope)> {
        self.state.lock().published.clone()
    }

    /// Every emitted event with its payload.
    #[must_use]
    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.state.lock().emitted.clone()
    }

    /// Number of emits waiting for an answer.
    #[must_use]
    pub fn pending_acks(&self) -> usize {
        self.state.lock().pending_acks.len()
    }

    /// Number of handlers bound to a connection-level event.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.state.lock().listeners.get(event).map_or(0, Vec::len)
    }

    /// Number of watchers of a channel.
    #[must_use]
    pub fn watcher_count(&self, channel: &str) -> usize {
        self.state.lock().watchers.get(channel).map_or(0, Vec::len)
    }

    /// Number of `deauthenticate` calls.
    #[must_use]
    pub fn deauthentications(&self) -> usize {
        self.state.lock().deauthentications
    }

    /// Whether `destroy` was called.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    fn handlers_for(&self, event: &str) -> Vec<EventHandler> {
        let state = self.state.lock();
        state
            .listeners
            .get(event)
            .map(|l| l.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    fn ensure_open(state: &SocketState) -> Result<(), TransportError> {
        if state.destroyed {
            Err(TransportError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

impl Default for MemorySocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Socket for MemorySocket {
    fn id(&self) -> Option<SocketId> {
        if self.state.lock().destroyed {
            None
        } else {
            Some(self.id.clone())
        }
    }

    fn auth_state(&self) -> AuthState {
        self.state.lock().auth_state
    }

    fn on(&self, event: &str, handler: EventHandler) -> ListenerId {
        let id = ListenerId::next();
        self.state
            .lock()
            .listeners
            .entry(event.to_owned())
            .or_default()
            .push((id, handler));
        id
    }

    fn off(&self, event: &str, listener: Option<ListenerId>) {
        let mut state = self.state.lock();
        match listener {
            Some(listener) => {
                if let Some(handlers) = state.listeners.get_mut(event) {
                    handlers.retain(|(id, _)| *id != listener);
                }
            }
            None => {
                state.listeners.remove(event);
            }
        }
    }

    fn subscribe(&self, channel: &str, options: &Options) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state
            .subscriptions
            .insert(channel.to_owned(), options.clone());
        state.subscribe_log.push(channel.to_owned());
        debug!(socket = %self.id, channel = %channel, "Subscribed");
        Ok(())
    }

    fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.subscriptions.remove(channel);
        debug!(socket = %self.id, channel = %channel, "Unsubscribed");
        Ok(())
    }

    fn publish(&self, channel: &str, envelope: Envelope) -> Result<(), TransportError> {
        let looped = {
            let mut state = self.state.lock();
            Self::ensure_open(&state)?;
            let looped = codec::decode(&codec::encode(&envelope)?)?;
            state.published.push((channel.to_owned(), envelope));
            looped
        };

        self.deliver(channel, &looped);
        Ok(())
    }

    fn watch(&self, channel: &str, handler: WatchHandler) -> WatcherId {
        let id = WatcherId::next();
        self.state
            .lock()
            .watchers
            .entry(channel.to_owned())
            .or_default()
            .push((id, handler));
        id
    }

    fn unwatch(&self, channel: &str, watcher: Option<WatcherId>) {
        let mut state = self.state.lock();
        match watcher {
            Some(watcher) => {
                if let Some(watchers) = state.watchers.get_mut(channel) {
                    watchers.retain(|(id, _)| *id != watcher);
                }
            }
            None => {
                state.watchers.remove(channel);
            }
        }
    }

    fn emit(&self, event: &str, payload: Value, ack: AckHandler) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.emitted.push((event.to_owned(), payload));
        state.pending_acks.push_back(ack);
        Ok(())
    }

    fn deauthenticate(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.auth_state = AuthState::Unauthenticated;
        state.deauthentications += 1;
        Ok(())
    }

    fn destroy(&self) -> Result<(), TransportError> {
        let close_handlers = {
            let mut state = self.state.lock();
            if state.destroyed {
                return Ok(());
            }
            state.destroyed = true;
            state.subscriptions.clear();
            state.watchers.clear();
            state.pending_acks.clear();
            state.listeners.remove("close").unwrap_or_default()
        };

        debug!(socket = %self.id, "Socket destroyed");
        for (_, handler) in close_handlers {
            handler(&Value::Null);
        }
        Ok(())
    }
}

/// Socket factory producing `MemorySocket`s.
#[derive(Default)]
pub struct MemoryClient {
    sockets: Mutex<Vec<(Arc<MemorySocket>, Options)>>,
}

impl MemoryClient {
    /// Create a new factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently created socket.
    #[must_use]
    pub fn socket(&self) -> Option<Arc<MemorySocket>> {
        self.sockets.lock().last().map(|(s, _)| Arc::clone(s))
    }

    /// Options the most recent socket was created with.
    #[must_use]
    pub fn last_options(&self) -> Option<Options> {
        self.sockets.lock().last().map(|(_, o)| o.clone())
    }

    /// Number of sockets created.
    #[must_use]
    pub fn created(&self) -> usize {
        self.sockets.lock().len()
    }
}

impl SocketFactory for MemoryClient {
    fn create(&self, options: &Options) -> Result<Arc<dyn Socket>, TransportError> {
        let socket = Arc::new(MemorySocket::new());
        self.sockets
            .lock()
            .push((Arc::clone(&socket), options.clone()));
        Ok(socket)
    }
}

#[derive(Default)]
struct PresenceState {
    handlers: HashMap<String, Vec<PresenceHandler>>,
    members: HashMap<String, Vec<String>>,
}

/// In-process presence tracker.
#[derive(Default)]
pub struct MemoryPresence {
    state: Mutex<PresenceState>,
}

impl MemoryPresence {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a membership action and notify the channel's handlers.
    ///
    /// Returns the number of handlers invoked.
    pub fn apply(&self, channel: &str, action: &PresenceAction) -> usize {
        let handlers: Vec<PresenceHandler> = {
            let mut state = self.state.lock();
            let members = state.members.entry(channel.to_owned()).or_default();
            match action.action {
                PresenceActionKind::Join => {
                    if !members.contains(&action.username) {
                        members.push(action.username.clone());
                    }
                }
                PresenceActionKind::Leave => members.retain(|m| *m != action.username),
                PresenceActionKind::Other => {}
            }
            state.handlers.get(channel).cloned().unwrap_or_default()
        };

        for handler in &handlers {
            handler(action);
        }
        handlers.len()
    }

    /// Number of handlers tracking a channel.
    #[must_use]
    pub fn handler_count(&self, channel: &str) -> usize {
        self.state.lock().handlers.get(channel).map_or(0, Vec::len)
    }
}

impl PresenceTracker for MemoryPresence {
    fn track_presence(&self, channel: &str, handler: PresenceHandler) {
        self.state
            .lock()
            .handlers
            .entry(channel.to_owned())
            .or_default()
            .push(handler);
    }

    fn presence_list(&self, channel: &str) -> Vec<String> {
        self.state
            .lock()
            .members
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }
}

/// Presence factory handing out one shared `MemoryPresence`.
#[derive(Default)]
pub struct MemoryPresenceFactory {
    tracker: Arc<MemoryPresence>,
    created: AtomicUsize,
}

impl MemoryPresenceFactory {
    /// Create a new factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The tracker handed out by `create`.
    #[must_use]
    pub fn tracker(&self) -> Arc<MemoryPresence> {
        Arc::clone(&self.tracker)
    }

    /// Number of `create` calls.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl PresenceFactory for MemoryPresenceFactory {
    fn create(&self, _socket: Arc<dyn Socket>) -> Arc<dyn PresenceTracker> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.tracker()
    }
}
