//! Payload types exchanged with the transport and the presence tracker.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::WHISPER_PREFIX;

/// A message delivered on a watched channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Wire event name.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Create a new envelope.
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Create a client whisper envelope (`client-<event>`).
    #[must_use]
    pub fn whisper(event: &str, data: Value) -> Self {
        Self::new(format!("{WHISPER_PREFIX}{event}"), data)
    }

    /// Check whether this envelope carries a client whisper.
    #[must_use]
    pub fn is_whisper(&self) -> bool {
        self.event.starts_with(WHISPER_PREFIX)
    }
}

/// An envelope addressed to a channel.
///
/// This is the line format of captured traffic: `{"channel": .., "event": .., "data": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    /// Target channel.
    pub channel: String,
    /// The envelope published on it.
    #[serde(flatten)]
    pub envelope: Envelope,
}

/// Kind of a presence tracker action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceActionKind {
    /// A member joined the channel.
    Join,
    /// A member left the channel.
    Leave,
    /// Anything else the tracker reports (updates, syncs).
    #[serde(other)]
    Other,
}

/// A presence tracker notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceAction {
    /// What happened.
    pub action: PresenceActionKind,
    /// Who it happened to.
    #[serde(default)]
    pub username: String,
}

impl PresenceAction {
    /// A member joined.
    #[must_use]
    pub fn join(username: impl Into<String>) -> Self {
        Self {
            action: PresenceActionKind::Join,
            username: username.into(),
        }
    }

    /// A member left.
    #[must_use]
    pub fn leave(username: impl Into<String>) -> Self {
        Self {
            action: PresenceActionKind::Leave,
            username: username.into(),
        }
    }
}

/// Form fields of an authentication request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthForm {
    /// The channel permissions are requested for.
    pub channel_name: String,
}

/// Authentication request emitted as the `login` event for restricted channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    /// Authorization endpoint (`location` + `authEndpoint`).
    pub url: String,
    /// Form payload.
    pub form: AuthForm,
    /// Caller supplied headers (`auth.headers`).
    #[serde(default)]
    pub headers: Map<String, Value>,
    /// Always `false`; certificate checks are left to the server side.
    pub reject_unauthorized: bool,
    /// Ambient credentials forwarded with the request.
    #[serde(default)]
    pub cookie: String,
}

impl AuthRequest {
    /// Create an authentication request for a channel.
    #[must_use]
    pub fn new(url: impl Into<String>, channel_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            form: AuthForm {
                channel_name: channel_name.into(),
            },
            headers: Map::new(),
            reject_unauthorized: false,
            cookie: String::new(),
        }
    }

    /// Attach request headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Map<String, Value>) -> Self {
        self.headers = headers;
        self
    }

    /// Attach ambient credentials.
    #[must_use]
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = cookie.into();
        self
    }

    /// The channel this request is for.
    #[must_use]
    pub fn channel_name(&self) -> &str {
        &self.form.channel_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_whisper_envelope() {
        let envelope = Envelope::whisper("typing", json!({"user": "alice"}));
        assert_eq!(envelope.event, "client-typing");
        assert!(envelope.is_whisper());
        assert!(!Envelope::new("App\\Events\\Typing", json!({})).is_whisper());
    }

    #[test]
    fn test_presence_action_parsing() {
        let join: PresenceAction =
            serde_json::from_value(json!({"action": "join", "username": "alice"})).unwrap();
        assert_eq!(join, PresenceAction::join("alice"));

        let other: PresenceAction =
            serde_json::from_value(json!({"action": "update", "username": "bob"})).unwrap();
        assert_eq!(other.action, PresenceActionKind::Other);
    }

    #[test]
    fn test_auth_request_shape() {
        let mut headers = Map::new();
        headers.insert("X-CSRF-TOKEN".into(), json!("abc"));

        let request = AuthRequest::new("https://app.test/broadcasting/auth", "private-orders")
            .with_headers(headers)
            .with_cookie("session=1");

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "url": "https://app.test/broadcasting/auth",
                "form": {"channel_name": "private-orders"},
                "headers": {"X-CSRF-TOKEN": "abc"},
                "rejectUnauthorized": false,
                "cookie": "session=1"
            })
        );
    }

    #[test]
    fn test_publication_flattens_envelope() {
        let publication: Publication = serde_json::from_str(
            r#"{"channel":"orders","event":"App\\Events\\OrderShipped","data":{"id":1}}"#,
        )
        .unwrap();
        assert_eq!(publication.channel, "orders");
        assert_eq!(publication.envelope.event, "App\\Events\\OrderShipped");
        assert_eq!(publication.envelope.data, json!({"id": 1}));
    }
}
