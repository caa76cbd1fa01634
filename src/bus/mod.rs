//! Message bus boundary.
//!
//! The client only needs four things from a bus: connect, publish,
//! subscribe and request/reply. This module defines those as traits and
//! ships an in-memory implementation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Client (per service)                     │
//! │  - request() / publish() / subscribe() / unsubscribe()      │
//! │  - envelopes, handler binding, error taxonomy               │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Connector + Connection traits                 │
//! │  Connector: connect(options)                                │
//! │  Connection: publish / subscribe / unsubscribe / request    │
//! └─────────────────────────────────────────────────────────────┘
//!          │                  │                     │
//!          ▼                  ▼                     ▼
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────────────┐
//! │ InMemoryBus │    │NatsConnector│    │  other brokers      │
//! │ (included)  │    │ (optional)  │    │    (external)       │
//! └─────────────┘    └─────────────┘    └─────────────────────┘
//! ```
//!
//! Transport failures are plain [`BusError`] messages carrying the NATS
//! client's sentinel strings; the client classifies them. [`InMemoryBus`]
//! and the NATS connector report the same strings.

mod memory;
#[cfg(feature = "nats")]
mod nats;
mod transport;

#[cfg(feature = "nats")]
pub use self::nats::{NatsConnection, NatsConnector};

pub use memory::{InMemoryBus, InMemoryConnection, DEFAULT_MAX_PAYLOAD, DEFAULT_RECORD_LIMIT};
pub use transport::{
    BusError, ConnectOptions, Connection, Connector, Message, MessageHandler, PendingReply,
    ReplySender, SubscriptionToken, WaitError,
};
