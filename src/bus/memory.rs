//! In-memory bus for testing and single-process scenarios.
//!
//! Behaves like a small NATS server living inside the process:
//! - subjects are dot-separated tokens, with `*` (one token) and `>` (the
//!   rest) wildcards on the subscribing side
//! - every subscription owns a delivery thread, so one subscription sees its
//!   messages in publish order while different subscriptions run in parallel
//! - requests get a unique `_INBOX.<uuid>` reply subject
//! - failures are reported with the same sentinel messages a NATS client
//!   uses, so they classify the same way

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;

use uuid::Uuid;

use super::transport::{
    BusError, ConnectOptions, Connection, Connector, Message, MessageHandler, PendingReply,
    ReplySender, SubscriptionToken,
};
use crate::transport_error::TransportError;

/// Default payload limit, the NATS server default of 1 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// How many accepted publishes the bus remembers by default.
pub const DEFAULT_RECORD_LIMIT: usize = 256;

const INBOX_PREFIX: &str = "_INBOX.";

/// In-memory message broker.
///
/// Cheap to clone; clones share the same broker, so several clients (or a
/// client and a test) can connect to one bus.
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::mpsc::channel;
/// use std::time::Duration;
/// use busrpc::bus::{ConnectOptions, Connection, Connector, InMemoryBus, Message};
///
/// let bus = InMemoryBus::new();
/// let conn = bus.connect(&ConnectOptions {
///     url: "memory://".into(),
///     name: "doc".into(),
///     max_reconnects: 0,
/// }).unwrap();
///
/// let (tx, rx) = channel();
/// let tx = std::sync::Mutex::new(tx);
/// conn.subscribe("orders.*", Arc::new(move |msg: Message| {
///     let _ = tx.lock().unwrap().send(msg.subject);
/// })).unwrap();
///
/// conn.publish("orders.created", None, b"{}".to_vec()).unwrap();
/// assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "orders.created");
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    broker: Arc<Broker>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Broker {
    routes: RwLock<Vec<Route>>,
    next_id: AtomicU64,
    max_payload: Option<usize>,
    offline: AtomicBool,
    connects: AtomicUsize,
    /// The most recent accepted publishes, oldest first.
    log: Mutex<VecDeque<Message>>,
    record_limit: AtomicUsize,
    fail_next: Mutex<Option<String>>,
}

struct Route {
    id: u64,
    connection: u64,
    pattern: String,
    sink: Sink,
}

enum Sink {
    /// Feeds a subscription's delivery thread.
    Subscription(Sender<Message>),
    /// Answers one pending request.
    Reply(ReplySender),
}

impl Sink {
    fn deliver(&self, message: Message) {
        // A gone receiver means the subscriber or requester went away
        // mid-publish.
        match self {
            Sink::Subscription(sender) => {
                let _ = sender.send(message);
            }
            Sink::Reply(sender) => {
                sender.send(message);
            }
        }
    }
}

impl InMemoryBus {
    /// Create a bus with the default payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Create a bus that rejects payloads larger than `max_payload` bytes.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            broker: Arc::new(Broker {
                max_payload: Some(max_payload),
                record_limit: AtomicUsize::new(DEFAULT_RECORD_LIMIT),
                ..Broker::default()
            }),
        }
    }

    /// Take the bus offline (or back online). New connections fail while
    /// offline; existing connections keep working.
    pub fn set_offline(&self, offline: bool) {
        self.broker.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next publish on any connection fail with `message`.
    pub fn fail_next_publish(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.broker.fail_next.lock() {
            *slot = Some(message.into());
        }
    }

    /// Number of successful `connect` calls so far.
    pub fn connect_count(&self) -> usize {
        self.broker.connects.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions, reply inboxes included.
    pub fn subscription_count(&self) -> usize {
        self.broker.routes.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Keep at most `limit` of the most recent publishes for
    /// [`published`](Self::published). `0` turns recording off.
    pub fn set_record_limit(&self, limit: usize) {
        self.broker.record_limit.store(limit, Ordering::SeqCst);
        if let Ok(mut log) = self.broker.log.lock() {
            trim_log(&mut log, limit);
        }
    }

    /// The most recent accepted messages, replies included, oldest first.
    /// At most [`DEFAULT_RECORD_LIMIT`] unless changed with
    /// [`set_record_limit`](Self::set_record_limit).
    pub fn published(&self) -> Vec<Message> {
        self.broker
            .log
            .lock()
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Accepted messages on one subject.
    pub fn published_on(&self, subject: &str) -> Vec<Message> {
        self.published()
            .into_iter()
            .filter(|m| m.subject == subject)
            .collect()
    }
}

impl Connector for InMemoryBus {
    type Connection = InMemoryConnection;

    fn connect(&self, options: &ConnectOptions) -> Result<InMemoryConnection, BusError> {
        if self.broker.offline.load(Ordering::SeqCst) {
            return Err(TransportError::NoServers.to_bus_error());
        }

        self.broker.connects.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(url = %options.url, name = %options.name, "in-memory bus connected");

        Ok(InMemoryConnection {
            id: self.broker.next_id.fetch_add(1, Ordering::SeqCst),
            name: options.name.clone(),
            broker: Arc::clone(&self.broker),
            closed: AtomicBool::new(false),
        })
    }
}

/// A connection to an [`InMemoryBus`].
pub struct InMemoryConnection {
    id: u64,
    name: String,
    broker: Arc<Broker>,
    closed: AtomicBool,
}

impl InMemoryConnection {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::ConnectionClosed.to_bus_error())
        } else {
            Ok(())
        }
    }

    fn add_route(&self, pattern: &str, sink: Sink) -> Result<u64, BusError> {
        let id = self.broker.next_id.fetch_add(1, Ordering::SeqCst);
        let mut routes = self
            .broker
            .routes
            .write()
            .map_err(|_| BusError::new("bus route table poisoned"))?;
        routes.push(Route {
            id,
            connection: self.id,
            pattern: pattern.to_string(),
            sink,
        });
        Ok(id)
    }

    fn has_responders(&self, subject: &str) -> bool {
        self.broker
            .routes
            .read()
            .map(|routes| routes.iter().any(|r| subject_matches(&r.pattern, subject)))
            .unwrap_or(false)
    }
}

impl Connection for InMemoryConnection {
    fn publish(&self, subject: &str, reply: Option<&str>, payload: Vec<u8>) -> Result<(), BusError> {
        self.ensure_open()?;

        if !valid_subject(subject, false) {
            return Err(TransportError::BadSubject.to_bus_error());
        }
        if let Some(max) = self.broker.max_payload {
            if payload.len() > max {
                return Err(TransportError::MaxPayload.to_bus_error());
            }
        }
        if let Some(message) = self.broker.fail_next.lock().ok().and_then(|mut s| s.take()) {
            return Err(BusError::new(message));
        }

        let message = Message {
            subject: subject.to_string(),
            reply: reply.map(str::to_string),
            payload,
        };

        self.broker.record(&message);

        let routes = self
            .broker
            .routes
            .read()
            .map_err(|_| BusError::new("bus route table poisoned"))?;
        for route in routes.iter().filter(|r| subject_matches(&r.pattern, subject)) {
            route.sink.deliver(message.clone());
        }

        Ok(())
    }

    fn subscribe(&self, subject: &str, handler: MessageHandler) -> Result<SubscriptionToken, BusError> {
        self.ensure_open()?;

        if !valid_subject(subject, true) {
            return Err(TransportError::BadSubject.to_bus_error());
        }

        let (tx, rx) = channel::<Message>();
        thread::Builder::new()
            .name(format!("bus-sub-{}", subject))
            .spawn(move || {
                // Ends once the route (the only sender) is removed.
                for message in rx {
                    handler(message);
                }
            })
            .map_err(|e| BusError::new(format!("failed to spawn delivery thread: {}", e)))?;

        let id = self.add_route(subject, Sink::Subscription(tx))?;
        Ok(SubscriptionToken(id))
    }

    fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), BusError> {
        self.ensure_open()?;

        let mut routes = self
            .broker
            .routes
            .write()
            .map_err(|_| BusError::new("bus route table poisoned"))?;
        let before = routes.len();
        routes.retain(|r| !(r.id == token.0 && r.connection == self.id));
        if routes.len() == before {
            return Err(TransportError::BadSubscription.to_bus_error());
        }
        Ok(())
    }

    fn request(&self, subject: &str, payload: Vec<u8>) -> Result<PendingReply, BusError> {
        self.ensure_open()?;

        if !self.has_responders(subject) {
            return Err(TransportError::NoResponders.to_bus_error());
        }

        let inbox = format!("{}{}", INBOX_PREFIX, Uuid::new_v4().simple());
        let (tx, pending) = PendingReply::channel();
        let route_id = self.add_route(&inbox, Sink::Reply(tx))?;

        let broker = Arc::clone(&self.broker);
        let pending = pending.on_drop(move || {
            if let Ok(mut routes) = broker.routes.write() {
                routes.retain(|r| r.id != route_id);
            }
        });

        self.publish(subject, Some(&inbox), payload)?;
        Ok(pending)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut routes) = self.broker.routes.write() {
            routes.retain(|r| r.connection != self.id);
        }
        tracing::debug!(name = %self.name, "in-memory bus connection closed");
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl Broker {
    fn record(&self, message: &Message) {
        let limit = self.record_limit.load(Ordering::SeqCst);
        if limit == 0 {
            return;
        }
        if let Ok(mut log) = self.log.lock() {
            trim_log(&mut log, limit - 1);
            log.push_back(message.clone());
        }
    }
}

fn trim_log(log: &mut VecDeque<Message>, keep: usize) {
    while log.len() > keep {
        log.pop_front();
    }
}

/// Subjects are non-empty dot-separated tokens without whitespace.
/// Wildcards are only allowed where subscribing.
fn valid_subject(subject: &str, allow_wildcards: bool) -> bool {
    if subject.is_empty() || subject.chars().any(char::is_whitespace) {
        return false;
    }

    let tokens: Vec<&str> = subject.split('.').collect();
    tokens.iter().enumerate().all(|(i, token)| match *token {
        "" => false,
        "*" => allow_wildcards,
        ">" => allow_wildcards && i == tokens.len() - 1,
        _ => true,
    })
}

fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern = pattern.split('.');
    let mut subject = subject.split('.');
    loop {
        match (pattern.next(), subject.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
