//! Classification of raw transport failures.
//!
//! The bus reports failures as plain messages. A fixed table of known
//! sentinel messages maps them onto [`TransportError`]; anything not in the
//! table is passed through unchanged as [`Error::Bus`].

use std::error::Error as StdError;
use std::fmt;

use crate::bus::BusError;
use crate::error::Error;

const PREFIX: &str = "nats: ";

macro_rules! sentinels {
    ($( $(#[$meta:meta])* $variant:ident => $raw:literal, )+) => {
        /// A known transport failure.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum TransportError {
            $( $(#[$meta])* $variant, )+
        }

        impl TransportError {
            /// Every known sentinel, in table order.
            pub const ALL: &'static [TransportError] = &[ $( TransportError::$variant, )+ ];

            /// The raw message the transport reports for this failure.
            pub fn sentinel(&self) -> &'static str {
                match self {
                    $( TransportError::$variant => $raw, )+
                }
            }

            /// Look up a raw transport message in the sentinel table.
            pub fn from_raw(message: &str) -> Option<Self> {
                match message {
                    $( $raw => Some(TransportError::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

sentinels! {
    ConnectionClosed => "nats: connection closed",
    ConnectionDraining => "nats: connection draining",
    DrainTimeout => "nats: draining connection timed out",
    ConnectionReconnecting => "nats: connection reconnecting",
    SecureConnRequired => "nats: secure connection required",
    SecureConnWanted => "nats: secure connection not available",
    BadSubscription => "nats: invalid subscription",
    TypeSubscription => "nats: invalid subscription type",
    BadSubject => "nats: invalid subject",
    BadQueueName => "nats: invalid queue name",
    SlowConsumer => "nats: slow consumer, messages dropped",
    /// The request deadline expired before a reply arrived.
    Timeout => "nats: timeout",
    BadTimeout => "nats: timeout invalid",
    Authorization => "nats: authorization violation",
    AuthExpired => "nats: authentication expired",
    AuthRevoked => "nats: authentication revoked",
    AccountAuthExpired => "nats: account authentication expired",
    NoServers => "nats: no servers available for connection",
    JsonParse => "nats: connect message, json parse error",
    ChanArg => "nats: argument needs to be a channel type",
    MaxPayload => "nats: maximum payload exceeded",
    MaxMessages => "nats: maximum messages delivered",
    SyncSubRequired => "nats: illegal call on an async subscription",
    MultipleTlsConfigs => "nats: multiple tls.Configs not allowed",
    NoInfoReceived => "nats: protocol exception, INFO not received",
    ReconnectBufExceeded => "nats: outbound buffer limit exceeded",
    InvalidConnection => "nats: invalid connection",
    InvalidMsg => "nats: invalid message or message nil",
    InvalidArg => "nats: invalid argument",
    InvalidContext => "nats: invalid context",
    NoDeadlineContext => "nats: context requires a deadline",
    NoEchoNotSupported => "nats: no echo option not supported by this server",
    ClientIdNotSupported => "nats: client ID not supported by this server",
    UserButNoSigCb => "nats: user callback defined without a signature handler",
    NkeyButNoSigCb => "nats: nkey defined without a signature handler",
    NoUserCb => "nats: user callback not defined",
    NkeyAndUser => "nats: user callback and nkey defined",
    NkeysNotSupported => "nats: nkeys not supported by the server",
    StaleConnection => "nats: stale connection",
    TokenAlreadySet => "nats: token and token handler both set",
    MsgNotBound => "nats: message is not bound to subscription/connection",
    MsgNoReply => "nats: message does not have a reply",
    ClientIpNotSupported => "nats: client IP not supported by this server",
    Disconnected => "nats: server is disconnected",
    HeadersNotSupported => "nats: headers not supported by this server",
    BadHeaderMsg => "nats: message could not decode headers",
    /// Nobody is subscribed to the requested subject.
    NoResponders => "nats: no responders available for request",
    NoContextOrTimeout => "nats: no context or timeout given",
    PullModeNotAllowed => "nats: pull based not supported",
    JetStreamNotEnabled => "nats: jetstream not enabled",
    JetStreamBadPre => "nats: jetstream api prefix not valid",
    NoStreamResponse => "nats: no response from stream",
    NotJsMessage => "nats: not a jetstream message",
    InvalidStreamName => "nats: invalid stream name",
    InvalidDurableName => "nats: invalid durable name",
    NoMatchingStream => "nats: no stream matches subject",
    SubjectMismatch => "nats: subject does not match consumer",
    ContextAndTimeout => "nats: context and timeout can not both be set",
    InvalidJsAck => "nats: invalid jetstream publish response",
    MultiStreamUnsupported => "nats: multiple streams are not supported",
    StreamNameRequired => "nats: stream name is required",
    StreamNotFound => "nats: stream not found",
    ConsumerNotFound => "nats: consumer not found",
    ConsumerNameRequired => "nats: consumer name is required",
    ConsumerConfigRequired => "nats: consumer configuration is required",
    StreamSnapshotConfigRequired => "nats: stream snapshot configuration is required",
    DeliverSubjectRequired => "nats: deliver subject is required",
    PullSubscribeToPushConsumer => "nats: cannot pull subscribe to push based consumer",
    PullSubscribeRequired => "nats: must use pull subscribe to bind to pull based consumer",
    ConsumerNotActive => "nats: consumer not active",
    MsgNotFound => "nats: message not found",
}

impl TransportError {
    /// The sentinel message without the transport prefix.
    pub fn message(&self) -> &'static str {
        let raw = self.sentinel();
        raw.strip_prefix(PREFIX).unwrap_or(raw)
    }

    /// Build the raw bus error that carries this sentinel.
    pub fn to_bus_error(self) -> BusError {
        BusError::new(self.sentinel())
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl StdError for TransportError {}

/// Translate a raw transport failure into the crate error.
///
/// Known sentinels become [`Error::Transport`]; everything else is returned
/// unchanged as [`Error::Bus`].
pub fn translate(raw: BusError) -> Error {
    match TransportError::from_raw(raw.message()) {
        Some(kind) => Error::Transport(kind),
        None => Error::Bus(raw),
    }
}

impl From<BusError> for Error {
    fn from(raw: BusError) -> Self {
        translate(raw)
    }
}
