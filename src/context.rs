//! Per-call context passed to handlers and to outbound calls.
//!
//! Carries the caller's [`Session`], an optional deadline and a cancellation
//! token. On the calling side the session is extracted into the request
//! envelope; on the handler side a fresh context is rebuilt from the
//! envelope before application code runs.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::session::Session;

/// Shared cancellation flag.
///
/// Clones observe the same flag, so a token can be handed to another thread
/// and cancelled from there while a request is waiting for its reply.
/// Waiters register a wake-up callback instead of polling the flag.
#[derive(Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

type Listener = Box<dyn Fn() + Send>;

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    listeners: Mutex<Listeners>,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    active: Vec<(u64, Listener)>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every call using this token.
    pub fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let woken = std::mem::take(&mut self.listeners().active);
        for (_, wake) in woken {
            wake();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Run `wake` once when the token is cancelled. Returns `None` (and
    /// never runs `wake`) if it already is.
    pub(crate) fn on_cancel(&self, wake: impl Fn() + Send + 'static) -> Option<u64> {
        let mut listeners = self.listeners();
        if self.is_cancelled() {
            return None;
        }
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.active.push((id, Box::new(wake)));
        Some(id)
    }

    pub(crate) fn remove_listener(&self, id: u64) {
        self.listeners().active.retain(|(listener, _)| *listener != id);
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        // Only pushes and removals happen under the lock, so a poisoned
        // list is still consistent.
        self.state
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// The context of one call.
///
/// ## Example
///
/// ```
/// use std::time::Duration;
/// use busrpc::CallContext;
///
/// let ctx = CallContext::new()
///     .with_session_id("111111")
///     .with_service("billing")
///     .with_method("charge")
///     .with_timeout(Duration::from_secs(2));
///
/// assert_eq!(ctx.session().session_id(), Some("111111"));
/// assert!(ctx.deadline().is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    session: Session,
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl CallContext {
    /// Create a context with no session, no deadline and a fresh token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a handler-side context from a received session.
    ///
    /// Only the session travels over the bus; the deadline and cancellation
    /// token of the caller stay on the caller's side.
    pub fn from_session(session: Session) -> Self {
        Self {
            session,
            deadline: None,
            cancel: CancelToken::new(),
        }
    }

    /// Snapshot of the session to put in an outgoing envelope.
    pub fn session(&self) -> Session {
        self.session.clone()
    }

    /// Replace the whole session.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session.session_id = Some(session_id.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.session.service = Some(service.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.session.method = Some(method.into());
        self
    }

    /// Set the deadline to `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Share an existing cancellation token with this context.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Cancel this context (and every clone sharing its token).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.session_id()
    }

    pub fn service(&self) -> Option<&str> {
        self.session.service()
    }

    pub fn method(&self) -> Option<&str> {
        self.session.method()
    }
}
