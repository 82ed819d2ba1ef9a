//! Integration tests for the connection lifecycle
//!
//! These tests run the full client against a local mock feed server.

#[macro_use]
mod common;

use common::*;
use crossbeam_channel::unbounded;
use resocket::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_connects_and_reports_muted_then_connected() {
    verbose_println!("Testing readiness sequence...");
    let server = MockFeedServer::start().await;
    let (tx, rx) = unbounded();

    let client = resocket::builder()
        .url(server.ws_url())
        .handler(ChannelHandler { tx })
        .retry_policy(fast_policy())
        .options(live_options())
        .build()
        .await
        .unwrap();

    assert!(wait_for_state(&client, ConnectionState::Muted, WAIT).await);
    assert!(client.is_connected());

    server.push(r#"{"type":"data","id":"n-1","headline":"Markets open higher"}"#);
    assert!(wait_for_state(&client, ConnectionState::Connected, WAIT).await);

    let message = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(message.kind, "data");
    assert_eq!(message.body["id"], "n-1");
    assert_eq!(client.url(), server.ws_url());

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_queued_sends_follow_subscriptions() {
    let server = MockFeedServer::start().await;
    let (tx, _rx) = unbounded();

    let client = resocket::builder()
        .url(server.ws_url())
        .handler(ChannelHandler { tx })
        .retry_policy(fast_policy())
        .options(live_options())
        .subscription("hello", "hello")
        .build()
        .await
        .unwrap();

    // still handshaking, so this is queued
    client.send("queued").unwrap();

    assert!(eventually(WAIT, || server.received().len() == 2).await);
    assert_eq!(server.received(), vec!["hello", "queued"]);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_subscriptions_resent_after_reconnect() {
    let server = MockFeedServer::start_with_greeting(Some(r#"{"type":"welcome"}"#)).await;
    let (tx, _rx) = unbounded();

    let client = resocket::builder()
        .url(server.ws_url())
        .handler(ChannelHandler { tx })
        .retry_policy(fast_policy())
        .options(live_options())
        .subscription("hello", "hello")
        .build()
        .await
        .unwrap();

    assert!(wait_for_state(&client, ConnectionState::Connected, WAIT).await);
    client.subscribe("prices", "subscribe prices").unwrap();
    assert!(eventually(WAIT, || server.received().len() == 2).await);

    server.kick();
    assert!(wait_for_state(&client, ConnectionState::Closed, WAIT).await);
    assert!(wait_for_state(&client, ConnectionState::Connected, WAIT).await);
    assert!(eventually(WAIT, || server.received().len() == 4).await);

    assert_eq!(
        server.received(),
        vec!["hello", "subscribe prices", "hello", "subscribe prices"]
    );
    assert_eq!(server.connections(), 2);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_close_stops_reconnection_until_reconnect() {
    let server = MockFeedServer::start_with_greeting(Some(r#"{"type":"welcome"}"#)).await;
    let (tx, _rx) = unbounded();

    let client = resocket::builder()
        .url(server.ws_url())
        .handler(ChannelHandler { tx })
        .retry_policy(fast_policy())
        .options(live_options())
        .build()
        .await
        .unwrap();

    assert!(wait_for_state(&client, ConnectionState::Connected, WAIT).await);

    client.close().unwrap();
    assert!(wait_for_state(&client, ConnectionState::Closed, WAIT).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.connections(), 1);
    assert_eq!(client.ready_state(), ConnectionState::Closed);

    client.reconnect().unwrap();
    assert!(wait_for_state(&client, ConnectionState::Connected, WAIT).await);
    assert_eq!(server.connections(), 2);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_server_close_message_stops_client() {
    let server = MockFeedServer::start_with_greeting(Some(r#"{"type":"welcome"}"#)).await;
    let (tx, rx) = unbounded();

    let client = resocket::builder()
        .url(server.ws_url())
        .handler(ChannelHandler { tx })
        .retry_policy(fast_policy())
        .options(live_options())
        .build()
        .await
        .unwrap();

    assert!(wait_for_state(&client, ConnectionState::Connected, WAIT).await);
    server.push(r#"{"type":"closed"}"#);
    assert!(wait_for_state(&client, ConnectionState::Closed, WAIT).await);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.connections(), 1);

    // only the greeting reached the handler
    assert_eq!(rx.try_iter().count(), 1);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_batched_delivery_newest_first() {
    let server = MockFeedServer::start().await;

    let client = resocket::builder()
        .url(server.ws_url())
        .batched(Duration::from_millis(100))
        .retry_policy(fast_policy())
        .options(live_options())
        .build()
        .await
        .unwrap();

    assert!(wait_for_state(&client, ConnectionState::Muted, WAIT).await);
    for seq in 1..=3 {
        server.push(&format!(r#"{{"seq":{}}}"#, seq));
    }

    let mut batch = None;
    let deadline = tokio::time::Instant::now() + WAIT;
    while batch.is_none() && tokio::time::Instant::now() < deadline {
        match client.try_recv_event() {
            Some(HostEvent::Data(messages)) => batch = Some(messages),
            Some(_) => {}
            None => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }

    let seqs: Vec<u64> = batch
        .unwrap()
        .iter()
        .map(|m| m.body["seq"].as_u64().unwrap())
        .collect();
    assert_eq!(seqs, vec![3, 2, 1]);

    client.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deferred_messages_released_on_demand() {
    let server = MockFeedServer::start().await;
    let (tx, rx) = unbounded();

    let client = resocket::builder()
        .url(server.ws_url())
        .handler(ChannelHandler { tx })
        .retry_policy(fast_policy())
        .options(ConnectionOptions {
            defer_updates: true,
            ..live_options()
        })
        .build()
        .await
        .unwrap();

    assert!(wait_for_state(&client, ConnectionState::Muted, WAIT).await);
    server.push(r#"{"seq":1}"#);
    server.push(r#"{"seq":2}"#);
    assert!(wait_for_state(&client, ConnectionState::Connected, WAIT).await);
    assert!(eventually(WAIT, || client.metrics().deferred == 2).await);
    assert!(rx.try_recv().is_err());

    client.set_defer_updates(false).unwrap();
    let first = rx.recv_timeout(WAIT).unwrap();
    let second = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(first.body["seq"], 1);
    assert_eq!(second.body["seq"], 2);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_listeners_observe_each_open() {
    let server = MockFeedServer::start_with_greeting(Some(r#"{"type":"welcome"}"#)).await;
    let (tx, _rx) = unbounded();

    let client = resocket::builder()
        .url(server.ws_url())
        .handler(ChannelHandler { tx })
        .retry_policy(fast_policy())
        .options(live_options())
        .build()
        .await
        .unwrap();

    let opens = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opens);
    let id = client
        .add_listener(EventKind::Open, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert!(wait_for_state(&client, ConnectionState::Connected, WAIT).await);
    assert!(eventually(WAIT, || opens.load(Ordering::SeqCst) == 1).await);

    server.kick();
    assert!(eventually(WAIT, || opens.load(Ordering::SeqCst) == 2).await);

    client.remove_listener(EventKind::Open, id).unwrap();
    server.kick();
    assert!(eventually(WAIT, || server.connections() == 3).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(opens.load(Ordering::SeqCst), 2);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_negotiated_protocol_is_exposed() {
    let server = MockFeedServer::start().await;
    let (tx, _rx) = unbounded();

    let client = resocket::builder()
        .url(server.ws_url())
        .handler(ChannelHandler { tx })
        .retry_policy(fast_policy())
        .options(ConnectionOptions {
            protocols: vec!["news.v2".into(), "news.v1".into()],
            ..live_options()
        })
        .build()
        .await
        .unwrap();

    assert!(wait_for_state(&client, ConnectionState::Muted, WAIT).await);
    assert_eq!(client.protocol(), "news.v2");

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_start_closed_waits_for_reconnect() {
    let server = MockFeedServer::start().await;
    let (tx, _rx) = unbounded();

    let client = resocket::builder()
        .url(server.ws_url())
        .handler(ChannelHandler { tx })
        .retry_policy(fast_policy())
        .options(live_options())
        .start_closed(true)
        .build()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.connections(), 0);
    assert_eq!(client.ready_state(), ConnectionState::Closed);
    match client.try_recv_event() {
        Some(HostEvent::ReadyState(ready)) => assert_eq!(ready.state, ConnectionState::Closed),
        other => panic!("expected an initial Closed, got {:?}", other),
    }

    client.reconnect().unwrap();
    assert!(wait_for_state(&client, ConnectionState::Muted, WAIT).await);
    assert_eq!(server.connections(), 1);

    client.shutdown().await.unwrap();
}
