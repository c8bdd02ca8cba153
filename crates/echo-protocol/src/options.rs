//! Dynamic option bag.
//!
//! Options are kept as a JSON object because they are forwarded verbatim to
//! the transport (`subscribe(name, options)`), while a handful of keys are
//! read by the channels themselves. Typed accessors cover those keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::events::DEFAULT_NAMESPACE;

/// Default authorization endpoint.
pub const DEFAULT_AUTH_ENDPOINT: &str = "/broadcasting/auth";

/// Header carrying the CSRF token on authentication requests.
pub const CSRF_HEADER: &str = "X-CSRF-TOKEN";

/// Option errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    /// An option holds a value of the wrong type.
    #[error("Option \"{key}\" should be \"{expected}\"! {given} given...")]
    TypeConfiguration {
        /// Option key.
        key: &'static str,
        /// Expected JSON type.
        expected: &'static str,
        /// JSON type found.
        given: &'static str,
    },
}

/// Name of a JSON value's type, as reported in configuration errors.
#[must_use]
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Client options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(Map<String, Value>);

impl Options {
    /// Create an empty option bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Set an option.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Get a raw option value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Check whether an option is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Shallow-merge another bag over this one.
    pub fn merge(&mut self, other: Options) {
        self.0.extend(other.0);
    }

    /// Fill in the broadcasting defaults for keys that are missing.
    ///
    /// A `csrfToken` option is copied into the `auth.headers` map.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.0
            .entry("authEndpoint")
            .or_insert_with(|| Value::from(DEFAULT_AUTH_ENDPOINT));
        self.0
            .entry("namespace")
            .or_insert_with(|| Value::from(DEFAULT_NAMESPACE));

        let auth = self
            .0
            .entry("auth")
            .or_insert_with(|| Value::Object(Map::new()));
        if !auth.is_object() {
            *auth = Value::Object(Map::new());
        }

        let token = self.csrf_token().map(str::to_owned);
        if let Some(Value::Object(auth)) = self.0.get_mut("auth") {
            let headers = auth
                .entry("headers")
                .or_insert_with(|| Value::Object(Map::new()));
            if let (Some(token), Value::Object(headers)) = (token, headers) {
                headers.insert(CSRF_HEADER.to_owned(), Value::from(token));
            }
        }

        self
    }

    /// Whether debug logging is enabled.
    ///
    /// # Errors
    ///
    /// Returns `TypeConfiguration` if `debug` is present but not a boolean.
    pub fn is_debug(&self) -> Result<bool, OptionsError> {
        match self.0.get("debug") {
            None => Ok(false),
            Some(Value::Bool(debug)) => Ok(*debug),
            Some(other) => Err(OptionsError::TypeConfiguration {
                key: "debug",
                expected: "boolean",
                given: type_name(other),
            }),
        }
    }

    /// Selected broadcaster backend.
    #[must_use]
    pub fn broadcaster(&self) -> Option<&str> {
        self.str("broadcaster")
    }

    /// Event namespace; `false`, `null` or absent disables qualification.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.str("namespace")
    }

    /// Base location prepended to the auth endpoint.
    #[must_use]
    pub fn location(&self) -> &str {
        self.str("location").unwrap_or_default()
    }

    /// Authorization endpoint path.
    #[must_use]
    pub fn auth_endpoint(&self) -> &str {
        self.str("authEndpoint").unwrap_or(DEFAULT_AUTH_ENDPOINT)
    }

    /// Full authorization URL.
    #[must_use]
    pub fn auth_url(&self) -> String {
        format!("{}{}", self.location(), self.auth_endpoint())
    }

    /// Headers to send with authentication requests (`auth.headers`).
    #[must_use]
    pub fn auth_headers(&self) -> Map<String, Value> {
        self.0
            .get("auth")
            .and_then(|auth| auth.get("headers"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    /// Ambient credentials forwarded with authentication requests.
    #[must_use]
    pub fn cookie(&self) -> &str {
        self.str("cookie").unwrap_or_default()
    }

    /// CSRF token.
    #[must_use]
    pub fn csrf_token(&self) -> Option<&str> {
        self.str("csrfToken")
    }

    /// Borrow the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for Options {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_debug() {
        assert_eq!(Options::new().is_debug(), Ok(false));
        assert_eq!(Options::new().with("debug", true).is_debug(), Ok(true));
        assert_eq!(Options::new().with("debug", false).is_debug(), Ok(false));

        let err = Options::new().with("debug", "yes").is_debug().unwrap_err();
        assert_eq!(
            err,
            OptionsError::TypeConfiguration {
                key: "debug",
                expected: "boolean",
                given: "string",
            }
        );
        assert_eq!(
            err.to_string(),
            "Option \"debug\" should be \"boolean\"! string given..."
        );
    }

    #[test]
    fn test_defaults() {
        let options = Options::new().with_defaults();
        assert_eq!(options.auth_endpoint(), DEFAULT_AUTH_ENDPOINT);
        assert_eq!(options.namespace(), Some(DEFAULT_NAMESPACE));
        assert!(options.auth_headers().is_empty());
    }

    #[test]
    fn test_defaults_keep_explicit_values() {
        let options = Options::new()
            .with("namespace", false)
            .with("authEndpoint", "/auth")
            .with("location", "https://app.test")
            .with("csrfToken", "token-1")
            .with("auth", json!({"headers": {"Authorization": "Bearer x"}}))
            .with_defaults();

        assert_eq!(options.namespace(), None);
        assert_eq!(options.auth_url(), "https://app.test/auth");

        let headers = options.auth_headers();
        assert_eq!(headers.get("Authorization"), Some(&json!("Bearer x")));
        assert_eq!(headers.get(CSRF_HEADER), Some(&json!("token-1")));
    }

    #[test]
    fn test_merge() {
        let mut options = Options::new().with("hostname", "localhost");
        options.merge(Options::new().with("waitForAuth", true));
        assert_eq!(options.get("waitForAuth"), Some(&json!(true)));
        assert!(options.contains("hostname"));
    }
}
