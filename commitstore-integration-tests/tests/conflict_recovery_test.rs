//! Conflict handling end to end: automatic refresh after a concurrent
//! write, retry idempotence, duplicate commit ids, and the disposal guard.

use commitstore::{
    BucketId, CommitId, EventMessage, OptimisticEventStore, StoreError, StreamId, MAX_REVISION,
};
use commitstore_memory::InMemoryPersistence;
use serde_json::json;

fn bucket() -> BucketId {
    BucketId::default_bucket()
}

fn stream_id() -> StreamId {
    StreamId::try_new("orders-1").unwrap()
}

fn event(n: u64) -> EventMessage {
    EventMessage::new(json!({ "n": n }))
}

/// Seeds "orders-1" with three commits of two events each (revisions 1..=6).
async fn seeded_store() -> OptimisticEventStore {
    let store = OptimisticEventStore::new(InMemoryPersistence::new());
    let mut stream = store.create_stream(bucket(), stream_id());
    for n in (1..=6).step_by(2) {
        stream.add(event(n)).unwrap();
        stream.add(event(n + 1)).unwrap();
        stream.commit_changes(CommitId::fresh()).await.unwrap();
    }
    store
}

#[tokio::test]
async fn retry_after_conflict_appends_the_same_pending_events() {
    let store = seeded_store().await;

    let mut ours = store
        .open_stream(bucket(), stream_id(), 0, MAX_REVISION)
        .await
        .unwrap();
    let mut theirs = store
        .open_stream(bucket(), stream_id(), 0, MAX_REVISION)
        .await
        .unwrap();

    // The competing writer commits revisions 7 and 8 first.
    theirs.add(event(7)).unwrap();
    theirs.add(event(8)).unwrap();
    theirs.commit_changes(CommitId::fresh()).await.unwrap();

    // Our commit expecting revision 7 must fail exactly once.
    ours.add(event(100)).unwrap();
    let conflict = ours.commit_changes(CommitId::fresh()).await;
    assert!(matches!(
        conflict,
        Err(StoreError::ConcurrencyConflict { .. })
    ));

    // The failed call refreshed the committed view; the pending event
    // survived and lands after the competing commits under a fresh id.
    assert_eq!(ours.stream_revision(), 8);
    assert_eq!(ours.uncommitted_events().len(), 1);
    ours.commit_changes(CommitId::fresh()).await.unwrap();

    let replay = store
        .open_stream(bucket(), stream_id(), 0, MAX_REVISION)
        .await
        .unwrap();
    assert_eq!(replay.committed_events().len(), 9);
    assert_eq!(
        replay.committed_events().last().unwrap().body,
        json!({ "n": 100 })
    );
    assert_eq!(replay.commit_sequence(), 5);
}

#[tokio::test]
async fn conflict_error_surfaces_once_per_failed_attempt() {
    let store = seeded_store().await;

    let mut ours = store
        .open_stream(bucket(), stream_id(), 0, MAX_REVISION)
        .await
        .unwrap();
    let mut theirs = store
        .open_stream(bucket(), stream_id(), 0, MAX_REVISION)
        .await
        .unwrap();

    theirs.add(event(7)).unwrap();
    theirs.commit_changes(CommitId::fresh()).await.unwrap();

    ours.add(event(100)).unwrap();
    assert!(ours.commit_changes(CommitId::fresh()).await.is_err());

    // After the one failure the stream is current; no second conflict.
    assert!(ours.commit_changes(CommitId::fresh()).await.is_ok());
}

#[tokio::test]
async fn reusing_a_commit_id_is_rejected_without_clearing_changes() {
    let store = seeded_store().await;
    let mut stream = store
        .open_stream(bucket(), stream_id(), 0, MAX_REVISION)
        .await
        .unwrap();

    let reused = CommitId::fresh();
    stream.add(event(7)).unwrap();
    stream.commit_changes(reused).await.unwrap();

    stream.add(event(8)).unwrap();
    let result = stream.commit_changes(reused).await;
    assert!(matches!(
        result,
        Err(StoreError::DuplicateCommit { commit_id, .. }) if commit_id == reused
    ));

    // The pending event is still staged; a fresh id commits it.
    assert_eq!(stream.uncommitted_events().len(), 1);
    stream.commit_changes(CommitId::fresh()).await.unwrap();
    assert_eq!(stream.stream_revision(), 8);
}

#[tokio::test]
async fn commit_ids_of_replayed_commits_count_as_seen() {
    let store = OptimisticEventStore::new(InMemoryPersistence::new());
    let reused = CommitId::fresh();

    let mut writer = store.create_stream(bucket(), stream_id());
    writer.add(event(1)).unwrap();
    writer.commit_changes(reused).await.unwrap();

    // A second instance learns the id from replay, not from its own commit.
    let mut reader = store
        .open_stream(bucket(), stream_id(), 0, MAX_REVISION)
        .await
        .unwrap();
    reader.add(event(2)).unwrap();
    let result = reader.commit_changes(reused).await;
    assert!(matches!(result, Err(StoreError::DuplicateCommit { .. })));
}

#[tokio::test]
async fn disposed_stream_refuses_commit_changes() {
    let store = seeded_store().await;
    let mut stream = store
        .open_stream(bucket(), stream_id(), 0, MAX_REVISION)
        .await
        .unwrap();

    stream.add(event(7)).unwrap();
    stream.dispose();
    assert_eq!(
        stream.commit_changes(CommitId::fresh()).await,
        Err(StoreError::Disposed)
    );
}

#[tokio::test]
async fn concurrent_writers_interleave_without_losing_commits() {
    let store = OptimisticEventStore::new(InMemoryPersistence::new());
    // Initialize the stream so every writer starts from revision 1.
    let mut init = store.create_stream(bucket(), stream_id());
    init.add(event(0)).unwrap();
    init.commit_changes(CommitId::fresh()).await.unwrap();

    let mut handles = Vec::new();
    for writer in 0..4u64 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut appended = 0;
            for n in 0..5u64 {
                let mut stream = store
                    .open_stream(bucket(), stream_id(), 0, MAX_REVISION)
                    .await
                    .unwrap();
                stream.add(event(writer * 100 + n)).unwrap();
                // Retry until this event lands; each attempt needs a new id.
                loop {
                    match stream.commit_changes(CommitId::fresh()).await {
                        Ok(()) => break,
                        Err(StoreError::ConcurrencyConflict { .. }) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
                appended += 1;
            }
            appended
        }));
    }

    let mut total = 1; // the initializing event
    for handle in handles {
        total += handle.await.unwrap();
    }
    assert_eq!(total, 21);

    let replay = store
        .open_stream(bucket(), stream_id(), 0, MAX_REVISION)
        .await
        .unwrap();
    assert_eq!(replay.committed_events().len(), 21);
    assert_eq!(replay.stream_revision(), 21);
    assert_eq!(replay.commit_sequence(), 21);
}
