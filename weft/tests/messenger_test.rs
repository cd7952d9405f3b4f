// Integration tests for named messengers


use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use test_helpers::{wait_until, DEFAULT_WAIT_TIME};
use weft::error::MessengerError;
use weft::messenger::MessengerHub;

fn collect(messenger: &weft::Messenger) -> (Arc<Mutex<Vec<Value>>>, weft::Subscription) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let subscription = messenger.on_message(move |payload| sink.lock().unwrap().push(payload.clone()));
    (received, subscription)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_broadcast_skips_the_sender() {
    let hub = MessengerHub::new();
    let alice = hub.open("chat");
    let bob = hub.open("chat");
    let carol = hub.open("chat");
    assert_eq!(hub.attached("chat"), 3);

    let (alice_seen, _a) = collect(&alice);
    let (bob_seen, _b) = collect(&bob);
    let (carol_seen, _c) = collect(&carol);

    alice.send(json!("hello")).unwrap();

    assert!(wait_until(DEFAULT_WAIT_TIME, || bob_seen.lock().unwrap().len() == 1).await);
    assert!(wait_until(DEFAULT_WAIT_TIME, || carol_seen.lock().unwrap().len() == 1).await);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(alice_seen.lock().unwrap().is_empty());
    assert_eq!(bob_seen.lock().unwrap()[0], json!("hello"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_channels_are_isolated_by_name() {
    let hub = MessengerHub::new();
    let sender = hub.open("a");
    let same = hub.open("a");
    let other = hub.open("b");

    let (same_seen, _s) = collect(&same);
    let (other_seen, _o) = collect(&other);

    sender.send(json!({"n": 1})).unwrap();
    assert!(wait_until(DEFAULT_WAIT_TIME, || same_seen.lock().unwrap().len() == 1).await);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(other_seen.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancelled_subscription_stops_delivery() {
    let hub = MessengerHub::new();
    let sender = hub.open("news");
    let receiver = hub.open("news");

    let (seen, subscription) = collect(&receiver);
    sender.send(json!(1)).unwrap();
    assert!(wait_until(DEFAULT_WAIT_TIME, || seen.lock().unwrap().len() == 1).await);

    subscription.cancel();
    sender.send(json!(2)).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn test_close_detaches_only_the_local_instance() {
    let hub = MessengerHub::new();
    let first = hub.open("room");
    let second = hub.open("room");

    first.close();
    assert!(first.is_closed());
    assert_eq!(hub.attached("room"), 1);
    assert_eq!(
        first.send(json!("late")),
        Err(MessengerError::Closed("room".to_string()))
    );
    assert!(second.send(json!("still open")).is_ok());

    drop(second);
    assert_eq!(hub.attached("room"), 0);
    assert!(hub.names().is_empty());
}
