//! Request/reply through call handlers.

use std::sync::Arc;
use std::thread;

use busrpc::bus::InMemoryBus;
use busrpc::{CallContext, Client, ClientConfig, Codec, Error};

use crate::support::{client, echo, Request, Response};

#[test]
fn echo_round_trip() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    client.subscribe_call("svc.echo", echo).unwrap();

    let mut resp = Response::default();
    client
        .request_into(&CallContext::new(), "svc.echo", &Request::new("hi"), &mut resp)
        .unwrap();

    assert_eq!(resp.message, "hi");
}

#[test]
fn handler_error_reaches_caller() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    client.subscribe_call("svc.echo", echo).unwrap();

    let mut resp = Response::default();
    let err = client
        .request_into(&CallContext::new(), "svc.echo", &Request::new(""), &mut resp)
        .unwrap_err();

    let app = err.as_application().expect("application error");
    assert_eq!(app.message(), "no message");
    assert!(app.kind().ends_with("NoMessage"));
    assert_eq!(resp, Response::default());
}

#[test]
fn caller_and_handler_on_separate_clients() {
    let bus = InMemoryBus::new();
    let server = client(&bus);
    let caller = client(&bus);
    server.subscribe_call("svc.echo", echo).unwrap();

    let resp: Response = caller
        .request(&CallContext::new(), "svc.echo", &Request::new("across"))
        .unwrap();
    assert_eq!(resp.message, "across");
    assert_eq!(bus.connect_count(), 2);
}

#[test]
fn replies_are_correlated_under_concurrency() {
    let bus = InMemoryBus::new();
    let client = Arc::new(client(&bus));
    client.subscribe_call("svc.echo", echo).unwrap();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                let message = format!("msg-{}", i);
                let resp: Response = client
                    .request(&CallContext::new(), "svc.echo", &Request::new(&message))
                    .unwrap();
                assert_eq!(resp.message, message);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(bus.connect_count(), 1);
}

#[test]
fn subscribe_classifies_call_handler() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    client.subscribe("svc.echo", echo).unwrap();

    let resp: Response = client
        .request(&CallContext::new(), "svc.echo", &Request::new("bound"))
        .unwrap();
    assert_eq!(resp.message, "bound");
}

#[test]
fn panicking_handler_reports_error() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    client
        .subscribe_call("svc.boom", |_: &CallContext, req: &Request| {
            if req.message == "boom" {
                panic!("exploded");
            }
            Ok::<_, std::fmt::Error>(Response::default())
        })
        .unwrap();

    let err = client
        .request::<_, Response>(&CallContext::new(), "svc.boom", &Request::new("boom"))
        .unwrap_err();
    match err {
        Error::Application(app) => {
            assert_eq!(app.kind(), busrpc::PANIC_KIND);
            assert_eq!(app.message(), "exploded");
        }
        other => panic!("unexpected error: {other}"),
    }

    // The subscription survives the panic.
    let resp: Response = client
        .request(&CallContext::new(), "svc.boom", &Request::new("fine"))
        .unwrap();
    assert_eq!(resp, Response::default());
}

#[cfg(feature = "bitcode")]
#[test]
fn bitcode_codec_round_trip() {
    let bus = InMemoryBus::new();
    let client = Client::new(
        bus.clone(),
        ClientConfig::new("memory://test").with_codec(Codec::Bitcode),
    );
    client.subscribe_call("svc.echo", echo).unwrap();

    let resp: Response = client
        .request(&CallContext::new(), "svc.echo", &Request::new("packed"))
        .unwrap();
    assert_eq!(resp.message, "packed");

    let sent = bus.published_on("svc.echo");
    assert_eq!(sent.len(), 1);
    assert!(serde_json::from_slice::<serde_json::Value>(&sent[0].payload).is_err());
}

#[cfg(feature = "bitcode")]
#[test]
fn bitcode_carries_maps_with_tuple_keys() {
    use std::collections::HashMap;

    use crate::support::NoMessage;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Grid {
        cells: HashMap<(u32, u32), String>,
    }

    let bus = InMemoryBus::new();
    let client = Client::new(
        bus.clone(),
        ClientConfig::new("memory://test").with_codec(Codec::Bitcode),
    );
    client
        .subscribe_call("svc.grid", |_: &CallContext, grid: &Grid| {
            let mut flipped = HashMap::new();
            for ((x, y), cell) in &grid.cells {
                flipped.insert((*y, *x), cell.clone());
            }
            Ok::<_, NoMessage>(Grid { cells: flipped })
        })
        .unwrap();

    let mut cells = HashMap::new();
    cells.insert((1, 2), "a".to_string());
    cells.insert((3, 4), "b".to_string());
    let resp: Grid = client
        .request(&CallContext::new(), "svc.grid", &Grid { cells })
        .unwrap();

    assert_eq!(resp.cells.get(&(2, 1)).map(String::as_str), Some("a"));
    assert_eq!(resp.cells.get(&(4, 3)).map(String::as_str), Some("b"));

    let mut cells = HashMap::new();
    cells.insert((0, 0), "origin".to_string());
    client
        .publish(&CallContext::new(), "svc.grid.log", &Grid { cells })
        .unwrap();
    assert_eq!(bus.published_on("svc.grid.log").len(), 1);
}

#[test]
fn json_wire_format() {
    let bus = InMemoryBus::new();
    let client = Client::new(
        bus.clone(),
        ClientConfig::new("memory://test").with_codec(Codec::Json),
    );
    client.subscribe_call("svc.echo", echo).unwrap();

    let ctx = CallContext::new().with_session_id("s-9");
    let _: Response = client
        .request(&ctx, "svc.echo", &Request::new("wire"))
        .unwrap();

    let sent = bus.published_on("svc.echo");
    let body: serde_json::Value = serde_json::from_slice(&sent[0].payload).unwrap();
    assert_eq!(body["Session"]["Session"], "s-9");
    assert_eq!(body["Request"]["Message"], "wire");

    let reply_subject = sent[0].reply.clone().unwrap();
    let replies = bus.published_on(&reply_subject);
    let reply: serde_json::Value = serde_json::from_slice(&replies[0].payload).unwrap();
    assert_eq!(reply["Response"]["Message"], "wire");
    assert!(reply["Error"]["Type"].is_null());
}
