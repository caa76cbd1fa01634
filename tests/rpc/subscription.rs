//! Subscription lifecycle.

use busrpc::bus::InMemoryBus;
use busrpc::{CallContext, Error, TransportError};

use crate::support::{client, echo, NoMessage, Request, Response};

#[test]
fn second_unsubscribe_reports_not_found() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    let sub = client.subscribe_call("svc.echo", echo).unwrap();

    client.unsubscribe(&sub).unwrap();

    match client.unsubscribe(&sub) {
        Err(Error::SubscriptionNotFound { subject }) => assert_eq!(subject, "svc.echo"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn unsubscribed_handler_stops_answering() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    let sub = client.subscribe_call("svc.echo", echo).unwrap();
    client.unsubscribe(&sub).unwrap();

    let err = client
        .request::<_, Response>(&CallContext::new(), "svc.echo", &Request::new("hi"))
        .unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::NoResponders)));
}

#[test]
fn handle_from_another_client_is_rejected() {
    let bus = InMemoryBus::new();
    let owner = client(&bus);
    let stranger = client(&bus);
    let sub = owner.subscribe_call("svc.echo", echo).unwrap();

    assert!(matches!(
        stranger.unsubscribe(&sub),
        Err(Error::ForeignSubscription { .. })
    ));

    // Still served by the owner.
    let resp: Response = stranger
        .request(&CallContext::new(), "svc.echo", &Request::new("still here"))
        .unwrap();
    assert_eq!(resp.message, "still here");
}

#[test]
fn close_releases_subscriptions_and_allows_reuse() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    let sub = client.subscribe_call("svc.echo", echo).unwrap();
    client
        .subscribe_notify("svc.log", |_: &CallContext, _: &Request| Ok::<(), NoMessage>(()))
        .unwrap();

    client.close().unwrap();
    client.close().unwrap();
    assert_eq!(bus.subscription_count(), 0);
    assert!(!client.is_connected());
    assert!(matches!(
        client.unsubscribe(&sub),
        Err(Error::SubscriptionNotFound { .. })
    ));

    client.subscribe_call("svc.echo", echo).unwrap();
    let resp: Response = client
        .request(&CallContext::new(), "svc.echo", &Request::new("again"))
        .unwrap();
    assert_eq!(resp.message, "again");
    assert_eq!(bus.connect_count(), 2);
}

#[test]
fn close_without_connection_does_not_connect() {
    let bus = InMemoryBus::new();
    let client = client(&bus);
    client.close().unwrap();
    assert_eq!(bus.connect_count(), 0);
}
