//! Handler binding and inbound dispatch.
//!
//! Application handlers come in two shapes:
//!
//! ```text
//! call:   Fn(&CallContext, &Req) -> Result<Resp, E>   request/reply
//! notify: Fn(&CallContext, &Req) -> Result<(), E>     fire-and-forget
//! ```
//!
//! Binding checks the payload types once, up front, and produces a
//! [`HandlerBinding`] whose dispatch function turns a raw bus message into a
//! typed handler invocation:
//!
//! - **call**: decode the request envelope, rebuild the caller's context,
//!   run the handler, wrap its result or error in a response envelope and
//!   publish it to the message's reply subject
//! - **notify**: decode, rebuild the context, run the handler; a returned
//!   error is logged and dropped
//!
//! Handler errors and panics never escape the dispatch function.

use std::any::{type_name, Any};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bus::{Connection, Message};
use crate::codec::Codec;
use crate::context::CallContext;
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::{ApplicationError, ValidationError, PANIC_KIND};
use crate::shape::{self, Shape};

/// Accepted signature of a call handler.
pub const CALL_SHAPE: &str = "Fn(&CallContext, &Req) -> Result<Resp, E>";
/// Accepted signature of a notify handler.
pub const NOTIFY_SHAPE: &str = "Fn(&CallContext, &Req) -> Result<(), E>";

/// Whether a handler answers (call) or only consumes (notify).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Call,
    Notify,
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeKind::Call => f.write_str("call"),
            ShapeKind::Notify => f.write_str("notify"),
        }
    }
}

type Dispatch = Box<dyn Fn(Message, Codec, &dyn Connection) + Send + Sync>;

/// A validated handler bound to a subject.
pub struct HandlerBinding {
    subject: String,
    kind: ShapeKind,
    request_type: &'static str,
    response_type: Option<&'static str>,
    dispatch: Dispatch,
}

impl HandlerBinding {
    /// Bind a handler, classifying it from its output type: `()` makes a
    /// notify handler, a struct makes a call handler, anything else is
    /// rejected.
    pub fn bind<Req, Out, E, F>(
        subject: impl Into<String>,
        handler: F,
    ) -> Result<Self, ValidationError>
    where
        Req: DeserializeOwned + 'static,
        Out: Serialize + DeserializeOwned + 'static,
        E: fmt::Display + 'static,
        F: Fn(&CallContext, &Req) -> Result<Out, E> + Send + Sync + 'static,
    {
        match shape::describe::<Out>() {
            Shape::Unit => Self::notify(subject, move |ctx: &CallContext, req: &Req| {
                handler(ctx, req).map(|_| ())
            }),
            found if found.is_structured() => Self::call(subject, handler),
            found => Err(ValidationError::new(
                "handler",
                format!(
                    "unable to determine handler kind from output {} (found {}), use {} or {}",
                    type_name::<Out>(),
                    found,
                    CALL_SHAPE,
                    NOTIFY_SHAPE
                ),
            )),
        }
    }

    /// Bind a request/reply handler.
    pub fn call<Req, Resp, E, F>(
        subject: impl Into<String>,
        handler: F,
    ) -> Result<Self, ValidationError>
    where
        Req: DeserializeOwned + 'static,
        Resp: Serialize + DeserializeOwned + 'static,
        E: fmt::Display + 'static,
        F: Fn(&CallContext, &Req) -> Result<Resp, E> + Send + Sync + 'static,
    {
        shape::check_type::<Req>("handler", "request parameter")
            .map_err(|e| expecting(e, CALL_SHAPE))?;
        shape::check_type::<Resp>("handler", "response")
            .map_err(|e| expecting(e, CALL_SHAPE))?;

        let subject = subject.into();
        let log_subject = subject.clone();
        let dispatch: Dispatch = Box::new(move |message: Message, codec: Codec, replier: &dyn Connection| {
            dispatch_call(&log_subject, &handler, message, codec, replier)
        });

        Ok(Self {
            subject,
            kind: ShapeKind::Call,
            request_type: type_name::<Req>(),
            response_type: Some(type_name::<Resp>()),
            dispatch,
        })
    }

    /// Bind a fire-and-forget handler.
    pub fn notify<Req, E, F>(subject: impl Into<String>, handler: F) -> Result<Self, ValidationError>
    where
        Req: DeserializeOwned + 'static,
        E: fmt::Display + 'static,
        F: Fn(&CallContext, &Req) -> Result<(), E> + Send + Sync + 'static,
    {
        shape::check_type::<Req>("handler", "request parameter")
            .map_err(|e| expecting(e, NOTIFY_SHAPE))?;

        let subject = subject.into();
        let log_subject = subject.clone();
        let dispatch: Dispatch = Box::new(move |message: Message, codec: Codec, _: &dyn Connection| {
            dispatch_notify(&log_subject, &handler, message, codec)
        });

        Ok(Self {
            subject,
            kind: ShapeKind::Notify,
            request_type: type_name::<Req>(),
            response_type: None,
            dispatch,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn request_type(&self) -> &'static str {
        self.request_type
    }

    /// Response type name; `None` for notify handlers.
    pub fn response_type(&self) -> Option<&'static str> {
        self.response_type
    }

    /// Handle one inbound message. Replies (call only) go out through
    /// `replier`.
    pub fn dispatch(&self, message: Message, codec: Codec, replier: &dyn Connection) {
        (self.dispatch)(message, codec, replier)
    }
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("subject", &self.subject)
            .field("kind", &self.kind)
            .field("request_type", &self.request_type)
            .field("response_type", &self.response_type)
            .finish_non_exhaustive()
    }
}

fn expecting(err: ValidationError, shape: &str) -> ValidationError {
    ValidationError::new(err.target(), format!("{}, use {}", err.reason(), shape))
}

fn dispatch_call<Req, Resp, E, F>(
    subject: &str,
    handler: &F,
    message: Message,
    codec: Codec,
    replier: &dyn Connection,
) where
    Req: DeserializeOwned,
    Resp: Serialize,
    E: fmt::Display,
    F: Fn(&CallContext, &Req) -> Result<Resp, E>,
{
    let start = Instant::now();

    let Some(reply) = message.reply.as_deref() else {
        tracing::warn!(subject, "call received without a reply subject, dropped");
        return;
    };

    let envelope = match codec.decode::<RequestEnvelope<Req>>(&message.payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(
                subject,
                expected = type_name::<Req>(),
                error = %e,
                "call request does not match the bound handler"
            );
            let failed = ResponseEnvelope::<Resp>::failed(ApplicationError::from_handler_error(&e).to_info());
            respond(subject, reply, &failed, codec, replier);
            return;
        }
    };

    let (session, request) = envelope.into_parts();
    let ctx = CallContext::from_session(session);

    let response = match invoke(|| handler(&ctx, &request)) {
        Ok(resp) => ResponseEnvelope::ok(resp),
        Err(err) => ResponseEnvelope::failed(err.to_info()),
    };
    let failed = response.error.is_set();

    respond(subject, reply, &response, codec, replier);

    tracing::debug!(
        subject,
        session = ?ctx.session_id(),
        failed,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "call handled"
    );
}

fn dispatch_notify<Req, E, F>(subject: &str, handler: &F, message: Message, codec: Codec)
where
    Req: DeserializeOwned,
    E: fmt::Display,
    F: Fn(&CallContext, &Req) -> Result<(), E>,
{
    let start = Instant::now();

    let envelope = match codec.decode::<RequestEnvelope<Req>>(&message.payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(
                subject,
                expected = type_name::<Req>(),
                error = %e,
                "notification does not match the bound handler"
            );
            return;
        }
    };

    let (session, request) = envelope.into_parts();
    let ctx = CallContext::from_session(session);

    match invoke(|| handler(&ctx, &request)) {
        Ok(()) => tracing::debug!(
            subject,
            session = ?ctx.session_id(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "notification handled"
        ),
        Err(err) => tracing::warn!(
            subject,
            session = ?ctx.session_id(),
            kind = err.kind(),
            error = %err,
            "notify handler failed"
        ),
    }
}

/// Run a handler, turning its error or panic into an `ApplicationError`.
fn invoke<T, E: fmt::Display>(f: impl FnOnce() -> Result<T, E>) -> Result<T, ApplicationError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ApplicationError::from_handler_error(&err)),
        Err(payload) => Err(ApplicationError::new(PANIC_KIND, panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Publish a reply. Failures are logged, never retried: the caller will see
/// its deadline expire instead.
fn respond<Resp: Serialize>(
    subject: &str,
    reply: &str,
    response: &ResponseEnvelope<Resp>,
    codec: Codec,
    replier: &dyn Connection,
) {
    let payload = match codec.encode(response) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(subject, error = %e, "failed to encode reply");
            let fallback =
                ResponseEnvelope::<Resp>::failed(ApplicationError::from_handler_error(&e).to_info());
            match codec.encode(&fallback) {
                Ok(payload) => payload,
                Err(_) => return,
            }
        }
    };

    if let Err(e) = replier.publish(reply, None, payload) {
        tracing::error!(subject, reply, error = %e, "failed to publish reply");
    }
}
