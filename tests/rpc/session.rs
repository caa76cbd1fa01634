//! Session metadata crossing the bus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use busrpc::bus::InMemoryBus;
use busrpc::{CallContext, Session};

use crate::support::{client, echo, wait_until, NoMessage, Request, Response};

#[test]
fn call_handler_sees_caller_session() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);

    client
        .subscribe_call("svc.whoami", move |ctx: &CallContext, req: &Request| {
            *sink.lock().unwrap() = Some(ctx.session());
            echo(ctx, req)
        })
        .unwrap();

    let ctx = CallContext::new()
        .with_session_id("111111")
        .with_service("billing")
        .with_method("charge");
    let _: Response = client
        .request(&ctx, "svc.whoami", &Request::new("hi"))
        .unwrap();

    let session = seen.lock().unwrap().clone().unwrap();
    assert_eq!(session.session_id(), Some("111111"));
    assert_eq!(session.service(), Some("billing"));
    assert_eq!(session.method(), Some("charge"));
}

#[test]
fn absent_fields_stay_absent() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);

    client
        .subscribe_notify("svc.log", move |ctx: &CallContext, _: &Request| {
            *sink.lock().unwrap() = Some(ctx.session());
            Ok::<(), NoMessage>(())
        })
        .unwrap();

    let ctx = CallContext::new().with_service("billing");
    client.publish(&ctx, "svc.log", &Request::new("x")).unwrap();

    assert!(wait_until(Duration::from_secs(1), || seen.lock().unwrap().is_some()));
    let session = seen.lock().unwrap().clone().unwrap();
    assert_eq!(session, Session::new().with_service("billing"));
    assert_eq!(session.session_id(), None);
}

#[test]
fn reconstructed_context_has_no_deadline() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    let deadline = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&deadline);

    client
        .subscribe_call("svc.echo", move |ctx: &CallContext, req: &Request| {
            *sink.lock().unwrap() = Some(ctx.deadline());
            echo(ctx, req)
        })
        .unwrap();

    let ctx = CallContext::new().with_timeout(Duration::from_secs(1));
    let _: Response = client.request(&ctx, "svc.echo", &Request::new("hi")).unwrap();

    assert_eq!(*deadline.lock().unwrap(), Some(None));
}
