#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use biblio_core::{Context, ExErrorKind};
use biblio_store::EventName;
use chrono::{Duration as ChronoDuration, Utc};
use common::{dataset, file_client, json, publication, repo, user};
use serde_json::json as j;
use std::time::{Duration, Instant};

#[test]
fn test_committed_write_emits_event() {
    // Given: A listener at the end of the channel
    let (_dir, repo) = repo();
    let ctx = Context::new();
    let mut listener = repo.client().listener(&ctx).unwrap();

    // When: A dataset is created and then changed
    let first = repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();
    let mut edit = first.clone();
    edit.title = Some("B".to_string());
    let second = repo.save_dataset(&ctx, edit, &user()).unwrap();

    // Then: One event per committed write, in order
    let created = listener.try_next(&ctx).unwrap().unwrap();
    assert_eq!(created.name, EventName::Create);
    assert_eq!(created.record_type, "datasets");
    assert_eq!(created.record_id, "d1");
    assert_eq!(created.version_id, first.snapshot.version_id);

    let updated = listener.try_next(&ctx).unwrap().unwrap();
    assert_eq!(updated.name, EventName::Update);
    assert_eq!(updated.version_id, second.snapshot.version_id);
    assert!(updated.seq > created.seq);

    assert!(listener.try_next(&ctx).unwrap().is_none());
}

#[test]
fn test_rolled_back_write_emits_nothing() {
    let (_dir, repo) = repo();
    let ctx = Context::new();
    let mut listener = repo.client().listener(&ctx).unwrap();

    let _ = repo.transaction(&ctx, |r| {
        r.save_publication(publication("p1", "A"), &user())?;
        r.get_dataset("missing")
    });

    assert!(listener.try_next(&ctx).unwrap().is_none());
}

#[test]
fn test_new_listener_skips_earlier_events() {
    let (_dir, client) = file_client();
    let ctx = Context::new();
    let store = client.store(&ctx, "datasets").unwrap();
    store.add("d1", &json(j!({"id": "d1"}))).unwrap();

    let mut late = client.listener(&ctx).unwrap();
    assert!(late.try_next(&ctx).unwrap().is_none());

    let mut replay = client.listener_from(0);
    let event = replay.try_next(&ctx).unwrap().unwrap();
    assert_eq!(event.record_id, "d1");
    assert_eq!(replay.cursor(), event.seq);
}

#[test]
fn test_purge_emits_event_without_version() {
    let (_dir, client) = file_client();
    let ctx = Context::new();
    let store = client.store(&ctx, "publications").unwrap();
    store.add("p1", &json(j!({"id": "p1"}))).unwrap();
    let mut listener = client.listener(&ctx).unwrap();

    store.purge("p1").unwrap();
    store.purge("p404").unwrap();

    let event = listener.try_next(&ctx).unwrap().unwrap();
    assert_eq!(event.name, EventName::Purge);
    assert_eq!(event.record_id, "p1");
    assert!(event.version_id.is_none());
    assert!(listener.try_next(&ctx).unwrap().is_none());
}

#[test]
fn test_listen_wakes_on_commit_from_another_thread() {
    // Given: A listener blocked on an empty channel
    let (_dir, client) = file_client();
    let ctx = Context::new().with_timeout(Duration::from_secs(10));
    let mut listener = client.listener(&ctx).unwrap();

    // When: Another thread commits a write
    let writer = client.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        let ctx = Context::new();
        writer
            .store(&ctx, "datasets")
            .unwrap()
            .add("d1", &json(j!({"id": "d1"})))
            .unwrap();
    });

    let started = Instant::now();
    let event = listener.listen(&ctx).unwrap();
    handle.join().unwrap();

    // Then: The listener returns that event well before its deadline
    assert_eq!(event.record_id, "d1");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_listen_ends_with_the_context() {
    let (_dir, client) = file_client();

    let ctx = Context::new().with_timeout(Duration::from_millis(50));
    let mut listener = client.listener(&ctx).unwrap();
    let err = listener.listen(&ctx).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::DeadlineExceeded);

    let ctx = Context::new();
    let mut listener = client.listener(&ctx).unwrap();
    let canceller = ctx.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        canceller.cancel();
    });
    let err = listener.listen(&ctx).unwrap_err();
    handle.join().unwrap();
    assert_eq!(err.kind(), ExErrorKind::Cancelled);
}

#[test]
fn test_prune_drops_old_events() {
    let (_dir, client) = file_client();
    let ctx = Context::new();
    let store = client.store(&ctx, "datasets").unwrap();
    store.add("d1", &json(j!({"id": "d1"}))).unwrap();
    store.add("d2", &json(j!({"id": "d2"}))).unwrap();

    let removed = client
        .prune_notifications(&ctx, Utc::now() + ChronoDuration::seconds(1))
        .unwrap();

    assert_eq!(removed, 2);
    assert!(client.listener_from(0).try_next(&ctx).unwrap().is_none());
}
