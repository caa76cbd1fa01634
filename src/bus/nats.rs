//! NATS transport, backed by the synchronous `nats` client.
//!
//! Enabled with the `nats` feature. Failures reported by the client are
//! mapped onto the same sentinel messages [`InMemoryBus`](super::InMemoryBus)
//! uses, so both transports classify the same way.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::transport::{
    BusError, ConnectOptions, Connection, Connector, Message, MessageHandler, PendingReply,
    SubscriptionToken,
};
use crate::transport_error::TransportError;

/// Connects to a NATS server.
#[derive(Clone, Copy, Debug, Default)]
pub struct NatsConnector;

impl NatsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for NatsConnector {
    type Connection = NatsConnection;

    fn connect(&self, options: &ConnectOptions) -> Result<NatsConnection, BusError> {
        let conn = ::nats::Options::new()
            .with_name(&options.name)
            .max_reconnects(options.max_reconnects as usize)
            .connect(options.url.as_str())
            .map_err(connect_error)?;

        tracing::info!(url = %options.url, name = %options.name, "connected to nats");

        Ok(NatsConnection {
            conn,
            handlers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }
}

type Handlers = Arc<Mutex<HashMap<u64, ::nats::Handler>>>;

/// An open NATS connection.
pub struct NatsConnection {
    conn: ::nats::Connection,
    handlers: Handlers,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl NatsConnection {
    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::ConnectionClosed.to_bus_error())
        } else {
            Ok(())
        }
    }

    fn register(&self, handler: ::nats::Handler) -> Result<u64, BusError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.handlers
            .lock()
            .map_err(|_| BusError::new("nats handler table poisoned"))?
            .insert(id, handler);
        Ok(id)
    }
}

impl Connection for NatsConnection {
    fn publish(&self, subject: &str, reply: Option<&str>, payload: Vec<u8>) -> Result<(), BusError> {
        self.ensure_open()?;
        let sent = match reply {
            Some(reply) => self.conn.publish_request(subject, reply, payload),
            None => self.conn.publish(subject, payload),
        };
        sent.map_err(operation_error)
    }

    fn subscribe(&self, subject: &str, handler: MessageHandler) -> Result<SubscriptionToken, BusError> {
        self.ensure_open()?;
        let subscription = self.conn.subscribe(subject).map_err(operation_error)?;
        let handler = subscription.with_handler(move |mut msg: ::nats::Message| {
            handler(into_message(&mut msg));
            Ok(())
        });
        self.register(handler).map(SubscriptionToken)
    }

    fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), BusError> {
        self.ensure_open()?;
        let handler = self
            .handlers
            .lock()
            .map_err(|_| BusError::new("nats handler table poisoned"))?
            .remove(&token.0)
            .ok_or_else(|| TransportError::BadSubscription.to_bus_error())?;
        handler.unsubscribe().map_err(operation_error)
    }

    fn request(&self, subject: &str, payload: Vec<u8>) -> Result<PendingReply, BusError> {
        self.ensure_open()?;

        let inbox = self.conn.new_inbox();
        let (tx, pending) = PendingReply::channel();
        let handler = self
            .conn
            .subscribe(&inbox)
            .map_err(operation_error)?
            .with_handler(move |mut msg: ::nats::Message| {
                // A status-only reply means nobody was listening.
                if msg.data.is_empty() && msg.headers.is_some() {
                    tx.fail(TransportError::NoResponders.to_bus_error());
                } else {
                    tx.send(into_message(&mut msg));
                }
                Ok(())
            });
        let id = self.register(handler)?;

        let handlers = Arc::clone(&self.handlers);
        let pending = pending.on_drop(move || {
            let handler = handlers.lock().ok().and_then(|mut h| h.remove(&id));
            if let Some(handler) = handler {
                if let Err(e) = handler.unsubscribe() {
                    tracing::debug!(error = %e, "failed to drop reply inbox");
                }
            }
        });

        self.conn
            .publish_request(subject, &inbox, payload)
            .map_err(operation_error)?;
        Ok(pending)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let handlers: Vec<::nats::Handler> = match self.handlers.lock() {
            Ok(mut handlers) => handlers.drain().map(|(_, h)| h).collect(),
            Err(_) => Vec::new(),
        };
        for handler in handlers {
            let _ = handler.unsubscribe();
        }
        self.conn.clone().close();
        tracing::info!("nats connection closed");
    }
}

impl Drop for NatsConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn into_message(msg: &mut ::nats::Message) -> Message {
    Message {
        subject: std::mem::take(&mut msg.subject),
        reply: msg.reply.take(),
        payload: std::mem::take(&mut msg.data),
    }
}

/// A failed connect means no server could be reached, unless the server
/// turned us away.
fn connect_error(err: io::Error) -> BusError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => TransportError::Authorization.to_bus_error(),
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => BusError::new(err.to_string()),
        _ => {
            tracing::warn!(error = %err, "nats connect failed");
            TransportError::NoServers.to_bus_error()
        }
    }
}

fn operation_error(err: io::Error) -> BusError {
    match err.kind() {
        io::ErrorKind::TimedOut => TransportError::Timeout.to_bus_error(),
        io::ErrorKind::NotConnected => TransportError::ConnectionClosed.to_bus_error(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => {
            TransportError::Disconnected.to_bus_error()
        }
        io::ErrorKind::PermissionDenied => TransportError::Authorization.to_bus_error(),
        io::ErrorKind::InvalidInput => {
            let message = err.to_string();
            if message.contains("payload") {
                TransportError::MaxPayload.to_bus_error()
            } else if message.contains("subject") {
                TransportError::BadSubject.to_bus_error()
            } else {
                BusError::new(message)
            }
        }
        _ => BusError::new(err.to_string()),
    }
}
