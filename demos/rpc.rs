//! Call and notify handlers on the in-memory bus.
//!
//! Run with `RUST_LOG=debug cargo run --example rpc` to see the client's
//! own tracing.

use std::fmt;
use std::thread;
use std::time::Duration;

use busrpc::bus::InMemoryBus;
use busrpc::{CallContext, Client, ClientConfig, Error};
use serde::{Deserialize, Serialize};

const SUBJECT_REQUEST: &str = "demo.subject.request";
const SUBJECT_NOTIFY: &str = "demo.subject.notify";

#[derive(Debug, Serialize, Deserialize)]
struct Request {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Response {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug)]
struct NoMessage;

impl fmt::Display for NoMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no message")
    }
}

fn receive_call(ctx: &CallContext, req: &Request) -> Result<Response, NoMessage> {
    tracing::info!(session = ?ctx.session_id(), request = ?req, "received call");
    if req.message.is_empty() {
        return Err(NoMessage);
    }
    Ok(Response {
        message: "Yes, I'm fine".to_string(),
    })
}

fn receive_notify(ctx: &CallContext, req: &Request) -> Result<(), NoMessage> {
    tracing::info!(session = ?ctx.session_id(), request = ?req, "received notify");
    if req.message.is_empty() {
        return Err(NoMessage);
    }
    Ok(())
}

fn run(client: &Client<InMemoryBus>) -> Result<(), Error> {
    let call = client.subscribe(SUBJECT_REQUEST, receive_call)?;
    let notify = client.subscribe(SUBJECT_NOTIFY, receive_notify)?;

    let ctx = CallContext::new()
        .with_session_id("111111")
        .with_service("demo")
        .with_timeout(Duration::from_secs(1));

    let mut resp = Response::default();
    client.request_into(
        &ctx,
        SUBJECT_REQUEST,
        &Request {
            message: "The one on the right, are you alive?".to_string(),
        },
        &mut resp,
    )?;
    println!("reply: {}", resp.message);

    let ctx = ctx.with_timeout(Duration::from_secs(1));
    match client.request::<_, Response>(
        &ctx,
        SUBJECT_REQUEST,
        &Request {
            message: String::new(),
        },
    ) {
        Err(Error::Application(e)) => println!("handler failed: {} ({})", e, e.kind()),
        other => println!("unexpected: {:?}", other.map(|r| r.message)),
    }

    client.publish(
        &ctx,
        SUBJECT_NOTIFY,
        &Request {
            message: "fire and forget".to_string(),
        },
    )?;
    thread::sleep(Duration::from_millis(50));

    client.unsubscribe(&notify)?;
    client.unsubscribe(&call)?;
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let client = Client::new(InMemoryBus::new(), ClientConfig::default().with_name("demo"));

    let result = run(&client);
    if let Err(e) = client.close() {
        eprintln!("close: {}", e);
    }
    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
