//! Shared payloads, handlers and helpers.

#![allow(dead_code)]

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use busrpc::bus::InMemoryBus;
use busrpc::{CallContext, Client, ClientConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "Message")]
    pub message: String,
}

impl Request {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "Message")]
    pub message: String,
}

/// Error returned by [`echo`] for an empty message.
#[derive(Debug)]
pub struct NoMessage;

impl fmt::Display for NoMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no message")
    }
}

impl std::error::Error for NoMessage {}

pub fn echo(_ctx: &CallContext, req: &Request) -> Result<Response, NoMessage> {
    if req.message.is_empty() {
        return Err(NoMessage);
    }
    Ok(Response {
        message: req.message.clone(),
    })
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn client(bus: &InMemoryBus) -> Client<InMemoryBus> {
    init_tracing();
    Client::new(
        bus.clone(),
        ClientConfig::new("memory://test")
            .with_name("rpc-tests")
            .with_request_timeout(Duration::from_secs(2)),
    )
}

/// Poll `check` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}
