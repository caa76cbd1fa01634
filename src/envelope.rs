//! Request and response envelopes.
//!
//! Every payload crosses the bus wrapped in an envelope. Requests carry the
//! caller's session, responses carry an error slot:
//!
//! ```text
//! request:  { "Session": { "Session", "Service", "Method" }, "Request": <P> }
//! response: { "Response": <R> | null, "Error": { "Type", "Message" } }
//! ```
//!
//! Both response fields are always present. An error occurred if and only
//! if `Error.Type` is set; in that case `Response` is null and must be
//! ignored.

use serde::{Deserialize, Serialize};

use crate::session::Session;

/// The error slot of a response envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Type tag of the handler's error. `None` means no error.
    #[serde(rename = "Type")]
    pub kind: Option<String>,
    #[serde(rename = "Message")]
    pub message: Option<String>,
}

impl ErrorInfo {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            message: Some(message.into()),
        }
    }

    /// Whether this slot reports an error.
    pub fn is_set(&self) -> bool {
        self.kind.is_some()
    }
}

/// Envelope for calls and notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope<P> {
    #[serde(rename = "Session")]
    pub session: Session,
    #[serde(rename = "Request")]
    pub payload: P,
}

impl<P> RequestEnvelope<P> {
    pub fn wrap(session: Session, payload: P) -> Self {
        Self { session, payload }
    }

    pub fn into_parts(self) -> (Session, P) {
        (self.session, self.payload)
    }
}

/// Envelope for call replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope<R> {
    #[serde(rename = "Response")]
    pub payload: Option<R>,
    #[serde(rename = "Error")]
    pub error: ErrorInfo,
}

impl<R> ResponseEnvelope<R> {
    /// Both slots are set independently; a missing error becomes the empty
    /// slot.
    pub fn wrap(payload: Option<R>, error: Option<ErrorInfo>) -> Self {
        Self {
            payload,
            error: error.unwrap_or_default(),
        }
    }

    /// A successful reply.
    pub fn ok(payload: R) -> Self {
        Self::wrap(Some(payload), None)
    }

    /// A failed reply. The payload is left empty.
    pub fn failed(error: ErrorInfo) -> Self {
        Self::wrap(None, Some(error))
    }

    /// Split into payload and error. The error is reported only when its
    /// kind is set.
    pub fn into_parts(self) -> (Option<R>, Option<ErrorInfo>) {
        let error = if self.error.is_set() {
            Some(self.error)
        } else {
            None
        };
        (self.payload, error)
    }
}
