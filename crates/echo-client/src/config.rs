//! Client configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (ECHO_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use echo_protocol::Options;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::echo::BROADCASTER;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoConfig {
    /// Broadcaster backend.
    #[serde(default = "default_broadcaster")]
    pub broadcaster: String,

    /// Base URL the auth endpoint is resolved against.
    #[serde(default = "default_location")]
    pub location: String,

    /// Authorization endpoint path.
    #[serde(default = "default_auth_endpoint")]
    pub auth_endpoint: String,

    /// Event namespace; empty disables qualification.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// CSRF token forwarded as `X-CSRF-TOKEN`.
    #[serde(default = "default_csrf_token")]
    pub csrf_token: Option<String>,

    /// Cookie header forwarded with authentication requests.
    #[serde(default)]
    pub cookie: Option<String>,

    /// Enable debug logging.
    #[serde(default = "default_debug")]
    pub debug: bool,

    /// Authentication request configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Extra options passed through to the transport.
    #[serde(default)]
    pub transport: BTreeMap<String, Value>,
}

/// Authentication request configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Headers sent with every authentication request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

// Default value functions
fn default_broadcaster() -> String {
    std::env::var("ECHO_BROADCASTER").unwrap_or_else(|_| BROADCASTER.to_string())
}

fn default_location() -> String {
    std::env::var("ECHO_LOCATION").unwrap_or_else(|_| "http://localhost".to_string())
}

fn default_auth_endpoint() -> String {
    std::env::var("ECHO_AUTH_ENDPOINT")
        .unwrap_or_else(|_| echo_protocol::options::DEFAULT_AUTH_ENDPOINT.to_string())
}

fn default_namespace() -> String {
    std::env::var("ECHO_NAMESPACE")
        .unwrap_or_else(|_| echo_protocol::events::DEFAULT_NAMESPACE.to_string())
}

fn default_csrf_token() -> Option<String> {
    std::env::var("ECHO_CSRF_TOKEN").ok()
}

fn default_debug() -> bool {
    std::env::var("ECHO_DEBUG")
        .ok()
        .and_then(|d| d.parse().ok())
        .unwrap_or(false)
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            broadcaster: default_broadcaster(),
            location: default_location(),
            auth_endpoint: default_auth_endpoint(),
            namespace: default_namespace(),
            csrf_token: default_csrf_token(),
            cookie: None,
            debug: default_debug(),
            auth: AuthConfig::default(),
            transport: BTreeMap::new(),
        }
    }
}

impl EchoConfig {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "echo.toml",
            "/etc/echo/echo.toml",
            "~/.config/echo/echo.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: EchoConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Convert into the options bag handed to the connector.
    #[must_use]
    pub fn into_options(self) -> Options {
        let headers: Map<String, Value> = self
            .auth
            .headers
            .into_iter()
            .map(|(name, value)| (name, Value::from(value)))
            .collect();
        let mut auth = Map::new();
        auth.insert("headers".to_owned(), Value::Object(headers));

        let mut options = Options::new()
            .with("broadcaster", self.broadcaster)
            .with("location", self.location)
            .with("authEndpoint", self.auth_endpoint)
            .with("namespace", self.namespace)
            .with("debug", self.debug)
            .with("auth", Value::Object(auth));

        if let Some(token) = self.csrf_token {
            options.set("csrfToken", token);
        }
        if let Some(cookie) = self.cookie {
            options.set("cookie", cookie);
        }
        for (key, value) in self.transport {
            options.set(key, value);
        }

        options.with_defaults()
    }
}
