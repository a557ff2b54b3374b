//! Property tests: for any batching of a stream and any revision window,
//! the materialized view matches the ledger arithmetic.

use commitstore::{BucketId, CommitId, EventMessage, OptimisticEventStore, StreamId};
use commitstore_memory::InMemoryPersistence;
use proptest::prelude::*;
use serde_json::json;

fn bucket() -> BucketId {
    BucketId::default_bucket()
}

fn stream_id() -> StreamId {
    StreamId::try_new("orders-1").unwrap()
}

/// Appends events 1..=total in the given batches, then opens the window
/// and returns (folded bodies, stream revision, commit sequence).
async fn replay_window(batches: Vec<u64>, min: u64, max: u64) -> (Vec<u64>, u64, u64) {
    let store = OptimisticEventStore::new(InMemoryPersistence::new());
    let mut writer = store.create_stream(bucket(), stream_id());
    let mut next = 1;
    for batch in &batches {
        for _ in 0..*batch {
            writer.add(EventMessage::new(json!(next))).unwrap();
            next += 1;
        }
        writer.commit_changes(CommitId::fresh()).await.unwrap();
    }

    let stream = store
        .open_stream(bucket(), stream_id(), min, max)
        .await
        .unwrap();
    let bodies = stream
        .committed_events()
        .iter()
        .map(|e| e.body.as_u64().unwrap())
        .collect();
    (bodies, stream.stream_revision(), stream.commit_sequence())
}

/// Batch sizes plus a window within the resulting revision span.
fn batches_and_window() -> impl Strategy<Value = (Vec<u64>, u64, u64)> {
    prop::collection::vec(1u64..=3, 1..=8)
        .prop_flat_map(|batches| {
            let total: u64 = batches.iter().sum();
            (Just(batches), 1..=total, 1..=total)
        })
        .prop_map(|(batches, a, b)| (batches, a.min(b), a.max(b)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn windowed_replay_matches_the_ledger((batches, min, max) in batches_and_window()) {
        let (bodies, revision, sequence) =
            tokio_test::block_on(replay_window(batches.clone(), min, max));

        let expected: Vec<u64> = (min..=max).collect();
        prop_assert_eq!(bodies, expected);
        prop_assert_eq!(revision, max);

        // The reported sequence is the commit containing the window ceiling.
        let mut last_revision = 0;
        let mut containing = 0;
        for (index, batch) in batches.iter().enumerate() {
            last_revision += batch;
            if last_revision >= max {
                containing = index as u64 + 1;
                break;
            }
        }
        prop_assert_eq!(sequence, containing);
    }
}
