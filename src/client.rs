//! The client facade: request, publish, subscribe.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bus::{Connection, Connector, Message, MessageHandler, SubscriptionToken, WaitError};
use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::context::CallContext;
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::{ApplicationError, Error, ValidationError};
use crate::handler::{HandlerBinding, ShapeKind};
use crate::shape;
use crate::transport_error::TransportError;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a registered handler, returned by the `subscribe*` methods.
///
/// Pass it back to [`Client::unsubscribe`] to release the subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
    client_id: u64,
    subject: String,
    kind: ShapeKind,
}

impl Subscription {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }
}

struct ActiveSubscription {
    token: SubscriptionToken,
    subject: String,
}

/// RPC and notification client over a message bus.
///
/// Owns one lazily established connection, shared by every operation and
/// every subscription. Safe to share between threads.
///
/// ```
/// use busrpc::bus::InMemoryBus;
/// use busrpc::{CallContext, Client, ClientConfig};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Ping { n: u32 }
///
/// let client = Client::new(InMemoryBus::new(), ClientConfig::default());
/// client
///     .subscribe_call("svc.ping", |_: &CallContext, req: &Ping| {
///         Ok::<_, std::fmt::Error>(Ping { n: req.n + 1 })
///     })
///     .unwrap();
///
/// let pong: Ping = client.request(&CallContext::new(), "svc.ping", &Ping { n: 1 }).unwrap();
/// assert_eq!(pong.n, 2);
/// client.close().unwrap();
/// ```
pub struct Client<C: Connector> {
    id: u64,
    config: ClientConfig,
    connection: ConnectionManager<C>,
    subscriptions: Mutex<HashMap<u64, ActiveSubscription>>,
    next_subscription: AtomicU64,
}

impl<C: Connector> Client<C> {
    /// Create a client. Nothing is connected until the first operation.
    pub fn new(connector: C, config: ClientConfig) -> Self {
        let connection = ConnectionManager::new(connector, config.connect_options());
        Self {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            config,
            connection,
            subscriptions: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a request and wait for the typed reply.
    ///
    /// The call context's session travels with the request. The wait ends at
    /// the context deadline, or after the configured request timeout when the
    /// context has none, or as soon as the context is cancelled.
    pub fn request<Req, Resp>(
        &self,
        ctx: &CallContext,
        subject: &str,
        request: &Req,
    ) -> Result<Resp, Error>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let start = Instant::now();
        let result = self.send_request(ctx, subject, request);
        trace_outcome("request", subject, start, &result);
        result
    }

    /// Like [`request`](Self::request), writing the reply into `response`.
    /// On error `response` is left as it was.
    pub fn request_into<Req, Resp>(
        &self,
        ctx: &CallContext,
        subject: &str,
        request: &Req,
        response: &mut Resp,
    ) -> Result<(), Error>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        *response = self.request(ctx, subject, request)?;
        Ok(())
    }

    fn send_request<Req, Resp>(
        &self,
        ctx: &CallContext,
        subject: &str,
        request: &Req,
    ) -> Result<Resp, Error>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        shape::check_value("request", request)?;
        shape::check_type::<Resp>("response", "response type")?;

        let codec = self.config.codec;
        let payload = codec.encode(&RequestEnvelope::wrap(ctx.session(), request))?;

        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let conn = self.connection.get()?;
        let pending = conn.request(subject, payload)?;

        let deadline = ctx
            .deadline()
            .unwrap_or_else(|| Instant::now() + self.config.request_timeout());
        let reply = pending
            .wait(deadline, ctx.cancel_token())
            .map_err(|e| match e {
                WaitError::Timeout => Error::Transport(TransportError::Timeout),
                WaitError::Cancelled => Error::Cancelled,
                WaitError::Closed => Error::Transport(TransportError::ConnectionClosed),
                WaitError::Failed(err) => Error::from(err),
            })?;

        let envelope: ResponseEnvelope<Resp> = codec.decode(&reply.payload)?;
        match envelope.into_parts() {
            (_, Some(info)) => match ApplicationError::from_info(info) {
                Some(err) => Err(Error::Application(err)),
                None => Err(Error::EmptyResponse),
            },
            (Some(resp), None) => Ok(resp),
            (None, None) => Err(Error::EmptyResponse),
        }
    }

    /// Publish a notification. Returns once the bus accepted it; there is
    /// no reply.
    pub fn publish<T: Serialize>(
        &self,
        ctx: &CallContext,
        subject: &str,
        value: &T,
    ) -> Result<(), Error> {
        let start = Instant::now();
        let result = self.send_notification(ctx, subject, value);
        trace_outcome("publish", subject, start, &result);
        result
    }

    fn send_notification<T: Serialize>(
        &self,
        ctx: &CallContext,
        subject: &str,
        value: &T,
    ) -> Result<(), Error> {
        shape::check_value("value", value)?;
        let payload = self
            .config
            .codec
            .encode(&RequestEnvelope::wrap(ctx.session(), value))?;

        let conn = self.connection.get()?;
        conn.publish(subject, None, payload)?;
        Ok(())
    }

    /// Subscribe a handler, classified as call or notify from its output
    /// type.
    pub fn subscribe<Req, Out, E, F>(&self, subject: &str, handler: F) -> Result<Subscription, Error>
    where
        Req: DeserializeOwned + 'static,
        Out: Serialize + DeserializeOwned + 'static,
        E: fmt::Display + 'static,
        F: Fn(&CallContext, &Req) -> Result<Out, E> + Send + Sync + 'static,
    {
        let binding = HandlerBinding::bind(subject, handler);
        self.register(subject, binding)
    }

    /// Subscribe a request/reply handler.
    pub fn subscribe_call<Req, Resp, E, F>(
        &self,
        subject: &str,
        handler: F,
    ) -> Result<Subscription, Error>
    where
        Req: DeserializeOwned + 'static,
        Resp: Serialize + DeserializeOwned + 'static,
        E: fmt::Display + 'static,
        F: Fn(&CallContext, &Req) -> Result<Resp, E> + Send + Sync + 'static,
    {
        let binding = HandlerBinding::call(subject, handler);
        self.register(subject, binding)
    }

    /// Subscribe a fire-and-forget handler.
    pub fn subscribe_notify<Req, E, F>(&self, subject: &str, handler: F) -> Result<Subscription, Error>
    where
        Req: DeserializeOwned + 'static,
        E: fmt::Display + 'static,
        F: Fn(&CallContext, &Req) -> Result<(), E> + Send + Sync + 'static,
    {
        let binding = HandlerBinding::notify(subject, handler);
        self.register(subject, binding)
    }

    fn register(
        &self,
        subject: &str,
        binding: Result<HandlerBinding, ValidationError>,
    ) -> Result<Subscription, Error> {
        let start = Instant::now();
        let result = binding
            .map_err(Error::from)
            .and_then(|binding| self.attach(binding));
        trace_outcome("subscribe", subject, start, &result);
        result
    }

    fn attach(&self, binding: HandlerBinding) -> Result<Subscription, Error> {
        let subject = binding.subject().to_string();
        let kind = binding.kind();

        let conn = self.connection.get()?;
        let mut subscriptions = self.lock_subscriptions("subscribe")?;

        let codec = self.config.codec;
        let replier = Arc::downgrade(&conn);
        let callback: MessageHandler = Arc::new(move |message: Message| match replier.upgrade() {
            Some(conn) => binding.dispatch(message, codec, &*conn),
            None => tracing::debug!(subject = %message.subject, "connection gone, message dropped"),
        });

        let token = conn.subscribe(&subject, callback)?;
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        subscriptions.insert(
            id,
            ActiveSubscription {
                token,
                subject: subject.clone(),
            },
        );

        Ok(Subscription {
            id,
            client_id: self.id,
            subject,
            kind,
        })
    }

    /// Release a subscription. Each handle can be released once; afterwards
    /// it reports [`Error::SubscriptionNotFound`].
    pub fn unsubscribe(&self, subscription: &Subscription) -> Result<(), Error> {
        let start = Instant::now();
        let result = self.detach(subscription);
        trace_outcome("unsubscribe", &subscription.subject, start, &result);
        result
    }

    fn detach(&self, subscription: &Subscription) -> Result<(), Error> {
        if subscription.client_id != self.id {
            return Err(Error::ForeignSubscription {
                subject: subscription.subject.clone(),
            });
        }

        let active = self
            .lock_subscriptions("unsubscribe")?
            .remove(&subscription.id)
            .ok_or_else(|| Error::SubscriptionNotFound {
                subject: subscription.subject.clone(),
            })?;

        let conn = self.connection.get()?;
        conn.unsubscribe(active.token)?;
        Ok(())
    }

    /// Release every subscription and close the connection. Calling it again
    /// is a no-op; a later operation connects afresh.
    pub fn close(&self) -> Result<(), Error> {
        let start = Instant::now();

        let drained: Vec<ActiveSubscription> = self
            .lock_subscriptions("close")?
            .drain()
            .map(|(_, active)| active)
            .collect();

        if !drained.is_empty() {
            let conn = self.connection.get()?;
            for active in drained {
                if let Err(e) = conn.unsubscribe(active.token) {
                    tracing::warn!(subject = %active.subject, error = %e, "failed to release subscription on close");
                }
            }
        }

        let result = self.connection.close();
        trace_outcome("close", &self.config.name, start, &result);
        result
    }

    /// Number of subscriptions currently registered.
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    fn lock_subscriptions(
        &self,
        operation: &'static str,
    ) -> Result<MutexGuard<'_, HashMap<u64, ActiveSubscription>>, Error> {
        self.subscriptions
            .lock()
            .map_err(|_| Error::LockPoisoned(operation))
    }
}

impl<C: Connector> fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("connected", &self.is_connected())
            .field("subscriptions", &self.active_subscriptions())
            .finish()
    }
}

fn trace_outcome<T>(operation: &'static str, subject: &str, start: Instant, result: &Result<T, Error>) {
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(_) => tracing::debug!(operation, subject, elapsed_ms, "ok"),
        Err(e) => tracing::debug!(
            operation,
            subject,
            elapsed_ms,
            category = ?e.category(),
            error = %e,
            "failed"
        ),
    }
}
