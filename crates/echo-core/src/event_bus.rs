//! Per-channel event bus.
//!
//! Maps wire event names to a single callback. A later `subscribe` for the
//! same name replaces the earlier one. Every registration hands back an
//! `UnsubscribeToken`; tokens are resolved to their event name through the
//! ordered list of issued tokens.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Callback receiving event data.
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Event bus errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventBusError {
    /// Bad parameters.
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Opaque handle of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnsubscribeToken(u64);

struct Registration {
    token: UnsubscribeToken,
    callback: EventCallback,
}

#[derive(Default)]
struct BusState {
    subscriptions: HashMap<String, Option<Registration>>,
    tokens: Vec<UnsubscribeToken>,
    pointers: Vec<String>,
    next_token: u64,
}

/// Named-event registry scoped to one channel.
#[derive(Default)]
pub struct EventBus {
    state: Mutex<BusState>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` as the handler of `event`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `event` is empty.
    pub fn subscribe<F>(&self, event: &str, callback: F) -> Result<UnsubscribeToken, EventBusError>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe_callback(event, Arc::new(callback))
    }

    /// Register an already shared callback as the handler of `event`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `event` is empty.
    pub fn subscribe_callback(
        &self,
        event: &str,
        callback: EventCallback,
    ) -> Result<UnsubscribeToken, EventBusError> {
        if event.is_empty() {
            return Err(EventBusError::InvalidArgument(
                "eventBus.subscribe requires a non-empty event name",
            ));
        }

        let mut state = self.state.lock();
        state.next_token += 1;
        let token = UnsubscribeToken(state.next_token);

        state
            .subscriptions
            .insert(event.to_owned(), Some(Registration { token, callback }));
        state.tokens.push(token);
        state.pointers.push(event.to_owned());

        trace!(event = %event, "Bus subscription registered");
        Ok(token)
    }

    /// Invoke the handler of `event` with `data`.
    ///
    /// Returns `true` if a handler ran. The handler is called after the bus
    /// lock is released, so it may subscribe or publish itself.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `event` is empty or `data` is `null`.
    pub fn publish(&self, event: &str, data: &Value) -> Result<bool, EventBusError> {
        if event.is_empty() {
            return Err(EventBusError::InvalidArgument(
                "eventBus.publish requires a non-empty event name",
            ));
        }
        if data.is_null() {
            return Err(EventBusError::InvalidArgument(
                "eventBus.publish requires event data",
            ));
        }

        let callback = {
            let state = self.state.lock();
            state
                .subscriptions
                .get(event)
                .and_then(Option::as_ref)
                .map(|registration| Arc::clone(&registration.callback))
        };

        match callback {
            Some(callback) => {
                callback(data);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove the registration `token` was issued for.
    ///
    /// The event's slot is emptied but kept, so the name can be subscribed
    /// again. Returns `false` if the token is unknown or its registration was
    /// already replaced or removed.
    pub fn unsubscribe(&self, token: UnsubscribeToken) -> bool {
        let mut state = self.state.lock();

        let Some(index) = state.tokens.iter().position(|t| *t == token) else {
            return false;
        };
        let event = state.pointers[index].clone();

        match state.subscriptions.get_mut(&event) {
            Some(slot) if slot.as_ref().is_some_and(|r| r.token == token) => {
                *slot = None;
                trace!(event = %event, "Bus subscription removed");
                true
            }
            _ => false,
        }
    }

    /// Remove every registration and forget all issued tokens.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.subscriptions.clear();
        state.tokens.clear();
        state.pointers.clear();
    }

    /// Check whether `event` has a handler.
    #[must_use]
    pub fn has_subscriber(&self, event: &str) -> bool {
        self.state
            .lock()
            .subscriptions
            .get(event)
            .is_some_and(Option::is_some)
    }

    /// Number of events with a handler.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .subscriptions
            .values()
            .filter(|slot| slot.is_some())
            .count()
    }

    /// Check whether no event has a handler.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        let events: Vec<&str> = state
            .subscriptions
            .iter()
            .filter(|(_, slot)| slot.is_some())
            .map(|(event, _)| event.as_str())
            .collect();
        f.debug_struct("EventBus")
            .field("events", &events)
            .field("issued_tokens", &state.tokens.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<Value>>>, impl Fn(&Value) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |data: &Value| sink.lock().push(data.clone()))
    }

    #[test]
    fn test_last_subscription_wins() {
        let bus = EventBus::new();
        let (first, first_cb) = recorder();
        let (second, second_cb) = recorder();

        bus.subscribe("OrderShipped", first_cb).unwrap();
        bus.subscribe("OrderShipped", second_cb).unwrap();

        assert!(bus.publish("OrderShipped", &json!({"id": 1})).unwrap());
        assert!(first.lock().is_empty());
        assert_eq!(*second.lock(), vec![json!({"id": 1})]);
    }

    #[test]
    fn test_publish_without_subscriber() {
        let bus = EventBus::new();
        assert_eq!(bus.publish("Nothing", &json!({})), Ok(false));
    }

    #[test]
    fn test_invalid_arguments() {
        let bus = EventBus::new();
        assert!(matches!(
            bus.subscribe("", |_: &Value| {}),
            Err(EventBusError::InvalidArgument(_))
        ));
        assert!(matches!(
            bus.publish("", &json!({})),
            Err(EventBusError::InvalidArgument(_))
        ));
        assert!(matches!(
            bus.publish("OrderShipped", &Value::Null),
            Err(EventBusError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unsubscribe_token() {
        let bus = EventBus::new();
        let (shipped, shipped_cb) = recorder();
        let (paid, paid_cb) = recorder();

        let token = bus.subscribe("OrderShipped", shipped_cb).unwrap();
        bus.subscribe("OrderPaid", paid_cb).unwrap();

        assert!(bus.unsubscribe(token));
        assert!(!bus.has_subscriber("OrderShipped"));
        assert_eq!(bus.publish("OrderShipped", &json!({})), Ok(false));
        assert!(shipped.lock().is_empty());

        assert_eq!(bus.publish("OrderPaid", &json!({"id": 2})), Ok(true));
        assert_eq!(paid.lock().len(), 1);

        // A second removal through the same token is a no-op.
        assert!(!bus.unsubscribe(token));
    }

    #[test]
    fn test_resubscribe_after_unsubscribe() {
        let bus = EventBus::new();
        let token = bus.subscribe("OrderShipped", |_: &Value| {}).unwrap();
        bus.unsubscribe(token);

        let (seen, cb) = recorder();
        bus.subscribe("OrderShipped", cb).unwrap();
        bus.publish("OrderShipped", &json!(1)).unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_stale_token_keeps_replacement() {
        let bus = EventBus::new();
        let stale = bus.subscribe("OrderShipped", |_: &Value| {}).unwrap();

        let (seen, cb) = recorder();
        bus.subscribe("OrderShipped", cb).unwrap();

        assert!(!bus.unsubscribe(stale));
        bus.publish("OrderShipped", &json!(1)).unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_clear_removes_everything() {
        let bus = EventBus::new();
        let mut tokens = Vec::new();
        for event in ["A", "B", "C"] {
            tokens.push(bus.subscribe(event, |_: &Value| {}).unwrap());
        }
        assert_eq!(bus.len(), 3);

        bus.clear();
        assert!(bus.is_empty());
        for event in ["A", "B", "C"] {
            assert_eq!(bus.publish(event, &json!({})), Ok(false));
        }
        assert!(tokens.into_iter().all(|t| !bus.unsubscribe(t)));
    }

    #[test]
    fn test_handler_may_reenter_bus() {
        let bus = Arc::new(EventBus::new());
        let (seen, cb) = recorder();
        bus.subscribe("Second", cb).unwrap();

        let inner = Arc::clone(&bus);
        bus.subscribe("First", move |data: &Value| {
            inner.publish("Second", data).unwrap();
        })
        .unwrap();

        bus.publish("First", &json!("hop")).unwrap();
        assert_eq!(*seen.lock(), vec![json!("hop")]);
    }
}
