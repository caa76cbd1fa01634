//! Error types for calls, notifications and subscriptions.

use std::error::Error as StdError;
use std::fmt;

use crate::bus::BusError;
use crate::envelope::ErrorInfo;
use crate::transport_error::{self, TransportError};

/// Error kind reported for a handler that panicked.
pub const PANIC_KIND: &str = "panic";

/// Error type for every client operation.
#[derive(Debug)]
pub enum Error {
    /// A request, response, value or handler has the wrong shape.
    /// Raised before anything touches the bus.
    Validation(ValidationError),
    /// A known transport failure.
    Transport(TransportError),
    /// A transport failure not in the sentinel table, passed through as is.
    Bus(BusError),
    /// The remote handler returned an error.
    Application(ApplicationError),
    /// An envelope could not be encoded or decoded.
    Codec(CodecError),
    /// The call context was cancelled before a reply arrived.
    Cancelled,
    /// The reply carried neither a payload nor an error.
    EmptyResponse,
    /// The subscription was already released (or never registered here).
    SubscriptionNotFound { subject: String },
    /// The subscription handle was issued by a different client.
    ForeignSubscription { subject: String },
    /// An internal lock was poisoned by a panicking thread.
    LockPoisoned(&'static str),
}

/// Which part of the system a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Transport,
    Application,
    Codec,
    Client,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation(_) => ErrorCategory::Validation,
            Error::Transport(_) | Error::Bus(_) | Error::Cancelled => ErrorCategory::Transport,
            Error::Application(_) => ErrorCategory::Application,
            Error::Codec(_) => ErrorCategory::Codec,
            Error::EmptyResponse
            | Error::SubscriptionNotFound { .. }
            | Error::ForeignSubscription { .. }
            | Error::LockPoisoned(_) => ErrorCategory::Client,
        }
    }

    /// Re-run transport classification. Idempotent: known kinds keep their
    /// kind and unknown raw errors stay unchanged.
    pub fn translate(self) -> Error {
        match self {
            Error::Bus(raw) => transport_error::translate(raw),
            other => other,
        }
    }

    /// The application error, if the remote handler failed.
    pub fn as_application(&self) -> Option<&ApplicationError> {
        match self {
            Error::Application(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Timeout))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(e) => write!(f, "{}", e),
            Error::Transport(e) => write!(f, "{}", e),
            Error::Bus(e) => write!(f, "{}", e),
            Error::Application(e) => write!(f, "{}", e),
            Error::Codec(e) => write!(f, "{}", e),
            Error::Cancelled => write!(f, "call cancelled"),
            Error::EmptyResponse => write!(f, "reply carried neither a response nor an error"),
            Error::SubscriptionNotFound { subject } => {
                write!(f, "subscription not found: {}", subject)
            }
            Error::ForeignSubscription { subject } => {
                write!(f, "subscription {} belongs to another client", subject)
            }
            Error::LockPoisoned(operation) => write!(f, "lock poisoned during {}", operation),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Validation(e) => Some(e),
            Error::Transport(e) => Some(e),
            Error::Bus(e) => Some(e),
            Error::Application(e) => Some(e),
            Error::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<ApplicationError> for Error {
    fn from(err: ApplicationError) -> Self {
        Error::Application(err)
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        Error::Codec(err)
    }
}

/// A value or handler does not have one of the accepted shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    target: &'static str,
    reason: String,
}

impl ValidationError {
    /// `target` names what was checked: `"request"`, `"response"`,
    /// `"value"` or `"handler"`.
    pub fn new(target: &'static str, reason: impl Into<String>) -> Self {
        Self {
            target,
            reason: reason.into(),
        }
    }

    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.target, self.reason)
    }
}

impl StdError for ValidationError {}

/// An error returned by a remote handler and carried back in the reply.
///
/// `kind` is a stable type tag (the Rust type name of the handler's error
/// type); `message` is the error's display text. `Display` prints only the
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationError {
    kind: String,
    message: String,
}

impl ApplicationError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Capture a handler's error value.
    pub fn from_handler_error<E: fmt::Display + ?Sized>(err: &E) -> Self {
        Self::new(std::any::type_name::<E>(), err.to_string())
    }

    /// Rebuild from the reply's error slot. Returns `None` when no kind is
    /// set, meaning no error occurred.
    ///
    /// A kind without a message breaks the reply contract. The reply was
    /// built by another process, so this side cannot assert on it: the
    /// violation is logged at error level and the kind is kept with an empty
    /// message.
    pub fn from_info(info: ErrorInfo) -> Option<Self> {
        let kind = info.kind?;
        if info.message.is_none() {
            tracing::error!(kind = %kind, "application error has no message");
        }
        Some(Self {
            kind,
            message: info.message.unwrap_or_default(),
        })
    }

    pub fn to_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.kind.clone(), self.message.clone())
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for ApplicationError {}

/// Whether a codec failure happened while encoding or decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecOperation {
    Encode,
    Decode,
}

/// An envelope could not be encoded or decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecError {
    operation: CodecOperation,
    format: &'static str,
    message: String,
}

impl CodecError {
    pub fn encode(format: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation: CodecOperation::Encode,
            format,
            message: message.into(),
        }
    }

    pub fn decode(format: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation: CodecOperation::Decode,
            format,
            message: message.into(),
        }
    }

    pub fn operation(&self) -> CodecOperation {
        self.operation
    }

    pub fn format(&self) -> &'static str {
        self.format
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.operation {
            CodecOperation::Encode => "encode",
            CodecOperation::Decode => "decode",
        };
        write!(f, "failed to {} {} envelope: {}", op, self.format, self.message)
    }
}

impl StdError for CodecError {}
