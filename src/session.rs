//! Session metadata carried alongside every call and notification.

use serde::{Deserialize, Serialize};

/// Caller identity forwarded across a call boundary.
///
/// All three fields are optional: `None` means the caller did not provide
/// the value. On the wire the fields are named `Session`, `Service` and
/// `Method`:
///
/// ```json
/// { "Session": "111111", "Service": "billing", "Method": "charge" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "Session")]
    pub session_id: Option<String>,
    #[serde(rename = "Service")]
    pub service: Option<String>,
    #[serde(rename = "Method")]
    pub method: Option<String>,
}

impl Session {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session id.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the calling service name.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Set the calling method name.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Get the session id.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Get the calling service name.
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    /// Get the calling method name.
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.service.is_none() && self.method.is_none()
    }
}
