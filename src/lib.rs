//! Request/reply and fire-and-forget messaging over a pub/sub bus.
//!
//! A [`Client`] wraps typed payloads in envelopes that carry the caller's
//! [`Session`], sends them over a [`bus::Connection`], and turns typed
//! handler functions into bus subscriptions:
//!
//! ```text
//! call:   Fn(&CallContext, &Req) -> Result<Resp, E>
//! notify: Fn(&CallContext, &Req) -> Result<(), E>
//! ```
//!
//! Handler errors travel back to the caller as [`ApplicationError`]s;
//! transport failures are classified into [`TransportError`]s.

pub mod bus;
mod client;
mod codec;
pub mod config;
mod connection;
mod context;
mod envelope;
mod error;
mod handler;
mod session;
pub mod shape;
mod transport_error;

pub use client::{Client, Subscription};
pub use codec::Codec;
pub use config::ClientConfig;
pub use connection::ConnectionManager;
pub use context::{CallContext, CancelToken};
pub use envelope::{ErrorInfo, RequestEnvelope, ResponseEnvelope};
pub use error::{
    ApplicationError, CodecError, CodecOperation, Error, ErrorCategory, ValidationError,
    PANIC_KIND,
};
pub use handler::{HandlerBinding, ShapeKind, CALL_SHAPE, NOTIFY_SHAPE};
pub use session::Session;
pub use transport_error::{translate, TransportError};
