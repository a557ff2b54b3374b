//! Windowed replay through the in-memory adapter: bounded folds, partial
//! streams, and snapshot-anchored opens.

use commitstore::{
    BucketId, CommitId, EventMessage, OptimisticEventStore, Snapshot, StoreError, StreamId,
    StreamState, MAX_REVISION,
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

/// Seeds "orders-1" with four commits of two events each (revisions 1..=8).
async fn seeded_store() -> OptimisticEventStore {
    let store = OptimisticEventStore::new(InMemoryPersistence::new());
    let mut stream = store.create_stream(bucket(), stream_id());
    for n in (1..=8).step_by(2) {
        stream.add(event(n)).unwrap();
        stream.add(event(n + 1)).unwrap();
        stream.commit_changes(CommitId::fresh()).await.unwrap();
    }
    store
}

#[tokio::test]
async fn bounded_window_folds_exactly_the_requested_revisions() {
    let store = seeded_store().await;

    let stream = store
        .open_stream(bucket(), stream_id(), 2, 7)
        .await
        .unwrap();

    assert_eq!(stream.committed_events().len(), 6);
    assert_eq!(stream.stream_revision(), 7);
    assert_eq!(stream.commit_sequence(), 4);

    let bodies: Vec<u64> = stream
        .committed_events()
        .iter()
        .map(|e| e.body["n"].as_u64().unwrap())
        .collect();
    assert_eq!(bodies, vec![2, 3, 4, 5, 6, 7]);
}

#[tokio::test]
async fn window_ending_mid_commit_marks_the_stream_partial() {
    let store = seeded_store().await;

    let stream = store
        .open_stream(bucket(), stream_id(), 0, 7)
        .await
        .unwrap();
    assert_eq!(stream.state(), StreamState::Partial);

    let full = store
        .open_stream(bucket(), stream_id(), 0, 8)
        .await
        .unwrap();
    assert_eq!(full.state(), StreamState::Loaded);
    assert_eq!(full.committed_events().len(), 8);
}

#[tokio::test]
async fn partial_stream_commit_conflicts_then_recovers() {
    let store = seeded_store().await;

    let mut stream = store
        .open_stream(bucket(), stream_id(), 0, 3)
        .await
        .unwrap();
    assert_eq!(stream.state(), StreamState::Partial);
    assert_eq!(stream.stream_revision(), 3);

    stream.add(event(100)).unwrap();
    let result = stream.commit_changes(CommitId::fresh()).await;
    assert!(matches!(
        result,
        Err(StoreError::ConcurrencyConflict { .. })
    ));

    // The conflict refreshed the stream to the real head; retrying appends
    // the pending event at revision 9.
    assert_eq!(stream.state(), StreamState::Loaded);
    assert_eq!(stream.stream_revision(), 8);
    stream.commit_changes(CommitId::fresh()).await.unwrap();
    assert_eq!(stream.stream_revision(), 9);
}

#[tokio::test]
async fn open_with_min_revision_on_missing_stream_is_not_found() {
    let store = OptimisticEventStore::new(InMemoryPersistence::new());
    let result = store
        .open_stream(bucket(), stream_id(), 1, MAX_REVISION)
        .await;
    assert!(matches!(result, Err(StoreError::StreamNotFound { .. })));
}

#[tokio::test]
async fn snapshot_open_skips_replay_below_the_anchor() {
    let store = seeded_store().await;

    let snapshot = Snapshot::new(bucket(), stream_id(), 4, json!({ "sum": 10 })).unwrap();
    let stream = store
        .open_stream_from_snapshot(snapshot, MAX_REVISION)
        .await
        .unwrap();

    assert_eq!(stream.committed_events().len(), 4);
    assert_eq!(stream.stream_revision(), 8);
    assert_eq!(stream.commit_sequence(), 4);
    assert_eq!(stream.committed_events()[0].body, json!({ "n": 5 }));
}

#[tokio::test]
async fn snapshot_open_mid_commit_continues_correctly() {
    let store = seeded_store().await;

    // Revision 5 is the first event of the third commit; the anchor commit
    // itself must be re-read to find the commit sequence.
    let snapshot = Snapshot::new(bucket(), stream_id(), 5, json!({})).unwrap();
    let mut stream = store
        .open_stream_from_snapshot(snapshot, MAX_REVISION)
        .await
        .unwrap();

    assert_eq!(stream.committed_events().len(), 3); // revisions 6..=8
    assert_eq!(stream.stream_revision(), 8);
    assert_eq!(stream.commit_sequence(), 4);

    stream.add(event(9)).unwrap();
    stream.commit_changes(CommitId::fresh()).await.unwrap();
    assert_eq!(stream.stream_revision(), 9);
    assert_eq!(stream.commit_sequence(), 5);
}

#[tokio::test]
async fn committed_headers_merge_across_commits() {
    let store = OptimisticEventStore::new(InMemoryPersistence::new());
    let mut writer = store.create_stream(bucket(), stream_id());

    writer.add(event(1)).unwrap();
    writer
        .set_uncommitted_header("origin", json!("import"))
        .unwrap();
    writer.commit_changes(CommitId::fresh()).await.unwrap();

    writer.add(event(2)).unwrap();
    writer
        .set_uncommitted_header("origin", json!("api"))
        .unwrap();
    writer.commit_changes(CommitId::fresh()).await.unwrap();

    let replay = store
        .open_stream(bucket(), stream_id(), 0, MAX_REVISION)
        .await
        .unwrap();
    assert_eq!(replay.committed_headers()["origin"], json!("api"));
}
