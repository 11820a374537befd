//! Timing tests for the peer snapshot poller and the feed-to-poller flow.
//!
//! All tests run on a paused tokio clock, so intervals elapse instantly and
//! deterministically.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use peermap_core::location::{
    FeedError, FeedStatus, LocationStore, PeerLocation, PeerSnapshotPoller, Position,
    PositionSample, PushPositionFeed,
};
use peermap_core::storage::MemoryKeyValueStore;
use peermap_core::PeerMapCore;

const INTERVAL: Duration = Duration::from_millis(3000);

fn store_with(emails: &[&str]) -> Arc<LocationStore> {
    let store = Arc::new(LocationStore::new(Arc::new(MemoryKeyValueStore::new())));
    for email in emails {
        store.update_user_location(email, email, Position::new(0.0, 0.0));
    }
    store
}

fn counting_poller(store: Arc<LocationStore>) -> (Arc<AtomicUsize>, peermap_core::location::PollerHandle) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let handle = PeerSnapshotPoller::new(store, INTERVAL)
        .start("me@x.com", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("poller should start");
    (count, handle)
}

/// Sleeps past `ticks` intervals, landing between ticks.
async fn advance(ticks: u32) {
    tokio::time::sleep(INTERVAL * ticks + Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn delivers_immediately_then_every_interval() {
    let (count, handle) = counting_poller(store_with(&["a@x.com"]));
    assert_eq!(count.load(Ordering::SeqCst), 1);

    advance(1).await;
    assert_eq!(count.load(Ordering::SeqCst), 2);

    advance(2).await;
    assert_eq!(count.load(Ordering::SeqCst), 4);

    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn no_delivery_after_stop() {
    let (count, handle) = counting_poller(store_with(&["a@x.com"]));
    advance(1).await;
    let before = count.load(Ordering::SeqCst);

    handle.stop();
    advance(2).await;

    assert_eq!(count.load(Ordering::SeqCst), before);
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_stops_poller() {
    let (count, handle) = counting_poller(store_with(&[]));
    drop(handle);

    advance(2).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn snapshots_reflect_writes_between_ticks() {
    let store = store_with(&["a@x.com", "me@x.com"]);
    let snapshots: Arc<Mutex<Vec<Vec<PeerLocation>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&snapshots);

    let handle = PeerSnapshotPoller::new(Arc::clone(&store), INTERVAL)
        .start("me@x.com", move |snapshot| sink.lock().unwrap().push(snapshot))
        .unwrap();

    store.update_user_location("c@x.com", "c@x.com", Position::new(5.0, 5.0));
    store.remove_user_location("a@x.com");
    advance(1).await;
    handle.stop();

    let snapshots = snapshots.lock().unwrap();
    assert_eq!(snapshots.len(), 2);

    let first: Vec<&str> = snapshots[0].iter().map(|p| p.email.as_str()).collect();
    let second: Vec<&str> = snapshots[1].iter().map(|p| p.email.as_str()).collect();
    assert_eq!(first, vec!["a@x.com"]);
    assert_eq!(second, vec!["c@x.com"]);
}

#[tokio::test(start_paused = true)]
async fn feed_samples_reach_peers_but_not_self() {
    let core = PeerMapCore::with_defaults(Arc::new(MemoryKeyValueStore::new()));
    core.store()
        .update_user_location("peer@x.com", "peer@x.com", Position::new(1.0, 1.0));
    core.sign_in_with_email("me@x.com");

    let (sender, feed) = PushPositionFeed::channel();
    let feed_handle = core.start_location_feed(&feed).unwrap();

    let latest: Arc<Mutex<Vec<PeerLocation>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&latest);
    let poller = core
        .start_peer_poller(move |snapshot| *sink.lock().unwrap() = snapshot)
        .unwrap();

    let mut changes = core.store().subscribe_changes();
    sender.send(PositionSample::new(2.0, 2.0));
    changes.changed().await.unwrap();
    advance(1).await;

    assert_eq!(
        core.store().get("me@x.com").unwrap().position(),
        Position::new(2.0, 2.0)
    );
    let peers = latest.lock().unwrap().clone();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].email, "peer@x.com");
    assert_eq!(
        feed_handle.last_position().map(|s| s.position),
        Some(Position::new(2.0, 2.0))
    );

    poller.stop();
    feed_handle.stop();
}

#[tokio::test(start_paused = true)]
async fn revoked_permission_is_reported_as_terminal_state() {
    let core = PeerMapCore::with_defaults(Arc::new(MemoryKeyValueStore::new()));
    core.sign_in_with_email("me@x.com");

    let (sender, feed) = PushPositionFeed::channel();
    let feed_handle = core.start_location_feed(&feed).unwrap();
    let mut status = feed_handle.status_changes();

    sender.fail(FeedError::PermissionDenied);
    status.changed().await.unwrap();

    assert_eq!(
        *status.borrow(),
        FeedStatus::Failed(FeedError::PermissionDenied)
    );
    assert!(!sender.send(PositionSample::new(1.0, 1.0)));
    assert!(core.store().is_empty());
}
