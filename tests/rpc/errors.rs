//! Validation and transport failures as seen by callers.

use std::thread;
use std::time::Duration;

use busrpc::bus::{BusError, InMemoryBus};
use busrpc::{
    translate, CallContext, CancelToken, Error, ErrorCategory, TransportError, CALL_SHAPE,
    NOTIFY_SHAPE,
};

use crate::support::{client, echo, NoMessage, Request, Response};

#[test]
fn unclassifiable_handler_names_both_shapes() {
    let bus = InMemoryBus::new();
    let client = client(&bus);

    let err = client
        .subscribe("svc.bad", |_: &CallContext, req: &Request| {
            Ok::<String, NoMessage>(req.message.clone())
        })
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Validation);
    let text = err.to_string();
    assert!(text.contains(CALL_SHAPE), "{}", text);
    assert!(text.contains(NOTIFY_SHAPE), "{}", text);
    assert_eq!(client.active_subscriptions(), 0);
}

#[test]
fn scalar_request_parameter_is_rejected_at_bind() {
    let bus = InMemoryBus::new();
    let client = client(&bus);

    let err = client
        .subscribe_call("svc.bad", |_: &CallContext, n: &u64| {
            Ok::<Response, NoMessage>(Response {
                message: n.to_string(),
            })
        })
        .unwrap_err();

    match err {
        Error::Validation(v) => {
            assert_eq!(v.target(), "handler");
            assert!(v.reason().contains("request parameter"));
            assert!(v.reason().contains("u64"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(bus.subscription_count(), 0);
}

#[test]
fn non_struct_values_are_rejected_before_sending() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    let ctx = CallContext::new();

    assert!(matches!(
        client.publish(&ctx, "svc.log", &42),
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        client.request::<_, Vec<u8>>(&ctx, "svc.echo", &Request::new("x")),
        Err(Error::Validation(_))
    ));
    assert!(bus.published().is_empty());
}

#[test]
fn request_without_responders() {
    let bus = InMemoryBus::new();
    let client = client(&bus);

    let err = client
        .request::<_, Response>(&CallContext::new(), "svc.nobody", &Request::new("x"))
        .unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::NoResponders)));
    assert_eq!(err.category(), ErrorCategory::Transport);
    assert_eq!(err.to_string(), "no responders available for request");
}

#[test]
fn slow_handler_times_out() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    client
        .subscribe_call("svc.slow", |ctx: &CallContext, req: &Request| {
            thread::sleep(Duration::from_millis(300));
            echo(ctx, req)
        })
        .unwrap();

    let ctx = CallContext::new().with_timeout(Duration::from_millis(50));
    let err = client
        .request::<_, Response>(&ctx, "svc.slow", &Request::new("x"))
        .unwrap_err();
    assert!(err.is_timeout());
}

#[test]
fn cancellation_interrupts_waiting_request() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    client
        .subscribe_call("svc.slow", |ctx: &CallContext, req: &Request| {
            thread::sleep(Duration::from_millis(500));
            echo(ctx, req)
        })
        .unwrap();

    let token = CancelToken::new();
    let remote = token.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        remote.cancel();
    });

    let ctx = CallContext::new().with_cancel_token(token);
    let mut slot = Response {
        message: "before".into(),
    };
    let err = client
        .request_into(&ctx, "svc.slow", &Request::new("x"), &mut slot)
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(slot.message, "before");
}

#[test]
fn known_transport_failure_is_classified() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    bus.fail_next_publish("nats: stale connection");

    let err = client
        .publish(&CallContext::new(), "svc.log", &Request::new("x"))
        .unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::StaleConnection)));
}

#[test]
fn unknown_transport_failure_passes_through() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    bus.fail_next_publish("disk on fire");

    let err = client
        .publish(&CallContext::new(), "svc.log", &Request::new("x"))
        .unwrap_err();
    match err {
        Error::Bus(raw) => assert_eq!(raw.message(), "disk on fire"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn oversized_payload_is_refused() {
    let bus = InMemoryBus::with_max_payload(64);
    let client = client(&bus);

    let err = client
        .publish(&CallContext::new(), "svc.log", &Request::new(&"x".repeat(128)))
        .unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::MaxPayload)));
}

#[test]
fn invalid_subject_is_refused() {
    let bus = InMemoryBus::new();
    let client = client(&bus);

    let err = client
        .publish(&CallContext::new(), "svc log", &Request::new("x"))
        .unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::BadSubject)));
}

#[test]
fn unreachable_bus_reports_no_servers() {
    let bus = InMemoryBus::new();
    bus.set_offline(true);
    let client = client(&bus);

    let err = client.subscribe_call("svc.echo", echo).unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::NoServers)));
    assert!(!client.is_connected());

    bus.set_offline(false);
    client.subscribe_call("svc.echo", echo).unwrap();
    assert!(client.is_connected());
}

#[test]
fn translation_is_stable() {
    let known = translate(BusError::new("nats: timeout"));
    assert!(known.is_timeout());
    assert!(known.translate().is_timeout());

    let unknown = translate(BusError::new("something else"));
    match unknown.translate() {
        Error::Bus(raw) => assert_eq!(raw.message(), "something else"),
        other => panic!("unexpected error: {other}"),
    }
}
