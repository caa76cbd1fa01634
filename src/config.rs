//! Client configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::bus::ConnectOptions;
use crate::codec::Codec;

pub const DEFAULT_URL: &str = "nats://127.0.0.1:4222";
pub const DEFAULT_NAME: &str = "busrpc";
pub const DEFAULT_MAX_RECONNECTS: u32 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Settings for a [`Client`](crate::Client).
///
/// Deserializable so it can sit inside a service's own config file; every
/// field has a default.
///
/// ```
/// use busrpc::ClientConfig;
///
/// let config: ClientConfig = serde_json::from_str(r#"{ "name": "billing" }"#).unwrap();
/// assert_eq!(config.name, "billing");
/// assert_eq!(config.url, "nats://127.0.0.1:4222");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bus address.
    pub url: String,
    /// Client name announced on connect.
    pub name: String,
    pub max_reconnects: u32,
    /// Upper bound for a request whose call context has no deadline.
    pub request_timeout_ms: u64,
    /// Envelope encoding. Every participant on a subject must agree.
    pub codec: Codec,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            name: DEFAULT_NAME.to_string(),
            max_reconnects: DEFAULT_MAX_RECONNECTS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            codec: Codec::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_reconnects(mut self, max_reconnects: u32) -> Self {
        self.max_reconnects = max_reconnects;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            url: self.url.clone(),
            name: self.name.clone(),
            max_reconnects: self.max_reconnects,
        }
    }
}
