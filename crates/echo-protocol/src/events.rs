//! Event naming conventions.
//!
//! Application code listens with short names (`OrderShipped`) that are
//! qualified with the configured namespace before they are matched against
//! wire event names (`App\Events\OrderShipped`). A leading `.` or `\` opts
//! out of qualification.

/// Default namespace for application events.
pub const DEFAULT_NAMESPACE: &str = "App.Events";

/// Prefix reserved for client-to-client events.
pub const WHISPER_PREFIX: &str = "client-";

/// Listened name of broadcast notifications.
pub const NOTIFICATION_EVENT: &str = ".Illuminate\\Notifications\\Events\\BroadcastNotificationCreated";

/// Transport event used to request channel permissions.
pub const LOGIN_EVENT: &str = "login";

/// Channel name prefix of private channels.
pub const PRIVATE_PREFIX: &str = "private-";

/// Channel name prefix of presence channels.
pub const PRESENCE_PREFIX: &str = "presence-";

/// Maps application event names to wire event names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFormatter {
    namespace: Option<String>,
}

impl EventFormatter {
    /// Create a formatter for the given namespace.
    #[must_use]
    pub fn new(namespace: Option<&str>) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_owned),
        }
    }

    /// Format an event name.
    #[must_use]
    pub fn format(&self, event: &str) -> String {
        if let Some(escaped) = event.strip_prefix('.').or_else(|| event.strip_prefix('\\')) {
            return escaped.to_owned();
        }

        let qualified = match &self.namespace {
            Some(ns) => format!("{ns}.{event}"),
            None => event.to_owned(),
        };

        qualified.replace('.', "\\")
    }

    /// Replace the namespace.
    pub fn set_namespace(&mut self, namespace: Option<&str>) {
        *self = Self::new(namespace);
    }

    /// Current namespace.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}
