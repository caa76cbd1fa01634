//! Transport traits: what the client needs from a message bus.

use std::error::Error;
use std::fmt;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Instant;

use crate::context::CancelToken;

/// A message as delivered by the bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Subject the message was published to.
    pub subject: String,
    /// Where a reply should be published, if the sender expects one.
    pub reply: Option<String>,
    /// Encoded envelope.
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(subject: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            reply: None,
            payload,
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }
}

/// A raw transport failure.
///
/// Only the message is known; [`translate`](crate::translate) classifies it
/// against the table of known sentinels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusError {
    message: String,
}

impl BusError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for BusError {}

/// Callback invoked by the transport for each delivered message.
///
/// Runs on a transport worker thread, possibly concurrently with other
/// callbacks.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// Opaque id of a bus-level subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(pub u64);

/// Options used when establishing a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    pub url: String,
    /// Client name announced to the server.
    pub name: String,
    pub max_reconnects: u32,
}

/// Establishes connections to a bus.
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection + 'static;

    fn connect(&self, options: &ConnectOptions) -> Result<Self::Connection, BusError>;
}

/// An established bus connection.
///
/// Implementations must be safe to use from many threads at once.
pub trait Connection: Send + Sync {
    /// Publish a payload. Returns once the transport accepted it.
    fn publish(&self, subject: &str, reply: Option<&str>, payload: Vec<u8>)
        -> Result<(), BusError>;

    /// Register a callback for every message on `subject`.
    fn subscribe(&self, subject: &str, handler: MessageHandler)
        -> Result<SubscriptionToken, BusError>;

    /// Remove a subscription. Unknown tokens are an error.
    fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), BusError>;

    /// Publish a request under a fresh reply subject and return a handle to
    /// the pending reply. Dropping the handle abandons the request.
    fn request(&self, subject: &str, payload: Vec<u8>) -> Result<PendingReply, BusError>;

    /// Close the connection. Safe to call more than once.
    fn close(&self);
}

/// Why waiting for a reply stopped without one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitError {
    Timeout,
    Cancelled,
    /// The transport dropped the reply route (e.g. the connection closed).
    Closed,
    /// The transport reported a failure in place of a reply.
    Failed(BusError),
}

enum Signal {
    Reply(Message),
    Failed(BusError),
    Closed,
    Cancelled,
}

/// Transport side of a pending request.
///
/// Dropping it without having delivered a reply tells the waiter the route
/// is gone.
pub struct ReplySender {
    tx: Sender<Signal>,
}

impl ReplySender {
    /// Deliver the reply. Returns `false` if nobody is waiting any more.
    pub fn send(&self, message: Message) -> bool {
        self.tx.send(Signal::Reply(message)).is_ok()
    }

    /// Report a transport failure instead of a reply.
    pub fn fail(&self, error: BusError) -> bool {
        self.tx.send(Signal::Failed(error)).is_ok()
    }
}

impl Drop for ReplySender {
    fn drop(&mut self) {
        let _ = self.tx.send(Signal::Closed);
    }
}

impl fmt::Debug for ReplySender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplySender").finish_non_exhaustive()
    }
}

/// A request in flight, waiting for its correlated reply.
pub struct PendingReply {
    receiver: Receiver<Signal>,
    // Used to wake the waiter when its cancel token fires.
    waker: Sender<Signal>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl PendingReply {
    /// A connected pair: the transport keeps the sender, the caller waits on
    /// the pending reply.
    pub fn channel() -> (ReplySender, PendingReply) {
        let (tx, receiver) = channel();
        let pending = PendingReply {
            receiver,
            waker: tx.clone(),
            on_drop: None,
        };
        (ReplySender { tx }, pending)
    }

    /// Run `cleanup` when the reply is received or abandoned.
    pub fn on_drop(mut self, cleanup: impl FnOnce() + Send + 'static) -> Self {
        self.on_drop = Some(Box::new(cleanup));
        self
    }

    /// Block until the reply arrives, the deadline passes or `cancel` fires.
    pub fn wait(&self, deadline: Instant, cancel: &CancelToken) -> Result<Message, WaitError> {
        let waker = self.waker.clone();
        let listener = cancel
            .on_cancel(move || {
                let _ = waker.send(Signal::Cancelled);
            })
            .ok_or(WaitError::Cancelled)?;

        let outcome = self.receive(deadline);
        cancel.remove_listener(listener);
        outcome
    }

    fn receive(&self, deadline: Instant) -> Result<Message, WaitError> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        match self.receiver.recv_timeout(timeout) {
            Ok(Signal::Reply(message)) => Ok(message),
            Ok(Signal::Failed(error)) => Err(WaitError::Failed(error)),
            Ok(Signal::Cancelled) => Err(WaitError::Cancelled),
            Ok(Signal::Closed) | Err(RecvTimeoutError::Disconnected) => Err(WaitError::Closed),
            Err(RecvTimeoutError::Timeout) => Err(WaitError::Timeout),
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if let Some(cleanup) = self.on_drop.take() {
            cleanup();
        }
    }
}

impl fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReply").finish_non_exhaustive()
    }
}
