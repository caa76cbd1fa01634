//! Fire-and-forget notifications.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use busrpc::bus::InMemoryBus;
use busrpc::{CallContext, ShapeKind};

use crate::support::{client, wait_until, NoMessage, Request};

#[test]
fn publish_returns_before_handler_fails() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    client
        .subscribe_notify("svc.log", move |_: &CallContext, _: &Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(NoMessage)
        })
        .unwrap();

    client
        .publish(&CallContext::new(), "svc.log", &Request::new("x"))
        .unwrap();

    assert!(wait_until(Duration::from_secs(1), || calls.load(Ordering::SeqCst) == 1));
    // Notifications are never answered.
    assert_eq!(bus.published().len(), 1);
}

#[test]
fn notifications_arrive_in_order() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let sub = client
        .subscribe("svc.log", move |_: &CallContext, req: &Request| {
            sink.lock().unwrap().push(req.message.clone());
            Ok::<(), NoMessage>(())
        })
        .unwrap();
    assert_eq!(sub.kind(), ShapeKind::Notify);

    for i in 0..10 {
        client
            .publish(&CallContext::new(), "svc.log", &Request::new(&i.to_string()))
            .unwrap();
    }

    assert!(wait_until(Duration::from_secs(1), || seen.lock().unwrap().len() == 10));
    let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
    assert_eq!(*seen.lock().unwrap(), expected);
}

#[test]
fn wildcard_subscription_receives_matching_subjects() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    let subjects = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&subjects);

    client
        .subscribe_notify("audit.>", move |_: &CallContext, req: &Request| {
            sink.lock().unwrap().push(req.message.clone());
            Ok::<(), NoMessage>(())
        })
        .unwrap();

    let ctx = CallContext::new();
    client.publish(&ctx, "audit.user.login", &Request::new("login")).unwrap();
    client.publish(&ctx, "audit.order", &Request::new("order")).unwrap();
    client.publish(&ctx, "other.order", &Request::new("ignored")).unwrap();

    assert!(wait_until(Duration::from_secs(1), || subjects.lock().unwrap().len() == 2));
    assert!(!subjects.lock().unwrap().contains(&"ignored".to_string()));
}

#[test]
fn mismatched_notification_is_dropped() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    client
        .subscribe_notify("svc.log", move |_: &CallContext, _: &Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), NoMessage>(())
        })
        .unwrap();

    #[derive(serde::Serialize)]
    struct Other {
        #[serde(rename = "Message")]
        message: u32,
    }
    client
        .publish(&CallContext::new(), "svc.log", &Other { message: 7 })
        .unwrap();
    client
        .publish(&CallContext::new(), "svc.log", &Request::new("ok"))
        .unwrap();

    assert!(wait_until(Duration::from_secs(1), || calls.load(Ordering::SeqCst) == 1));
}
