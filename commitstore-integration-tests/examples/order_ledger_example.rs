//! Example demonstrating the optimistic append protocol end to end.
//!
//! This example shows:
//! - Creating a stream and committing batches of events
//! - A concurrency conflict between two writers of the same stream
//! - Automatic refresh and retry with the pending events intact
//! - Replaying a stream through a bounded revision window

use commitstore::{
    BucketId, CommitId, EventMessage, OptimisticEventStore, StoreError, StreamId, MAX_REVISION,
};
use commitstore_memory::InMemoryPersistence;
use serde_json::json;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), StoreError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let store = OptimisticEventStore::new(InMemoryPersistence::new());
    let bucket = BucketId::default_bucket();
    let stream_id = StreamId::try_new("order-1001").expect("valid stream id");

    // A fresh stream accepts its first batch at revisions 1 and 2.
    let mut checkout = store.create_stream(bucket.clone(), stream_id.clone());
    checkout.add(EventMessage::new(json!({ "type": "order-placed", "total": 120 })))?;
    checkout.add(EventMessage::new(json!({ "type": "payment-authorized" })))?;
    checkout.set_uncommitted_header("source", json!("checkout"))?;
    checkout.commit_changes(CommitId::fresh()).await?;
    info!(revision = checkout.stream_revision(), "checkout committed");

    // Two independent views of the same order race to append next.
    let mut shipping = store
        .open_stream(bucket.clone(), stream_id.clone(), 0, MAX_REVISION)
        .await?;
    let mut billing = store
        .open_stream(bucket.clone(), stream_id.clone(), 0, MAX_REVISION)
        .await?;

    shipping.add(EventMessage::new(json!({ "type": "order-shipped" })))?;
    shipping.commit_changes(CommitId::fresh()).await?;
    info!(revision = shipping.stream_revision(), "shipping won the race");

    billing.add(EventMessage::new(json!({ "type": "invoice-issued" })))?;
    match billing.commit_changes(CommitId::fresh()).await {
        Err(StoreError::ConcurrencyConflict { .. }) => {
            info!(
                revision = billing.stream_revision(),
                "billing hit a conflict and was refreshed"
            );
            // The invoice event is still pending; retry under a fresh id.
            billing.commit_changes(CommitId::fresh()).await?;
        }
        other => other?,
    }
    info!(revision = billing.stream_revision(), "billing committed");

    // Replay only part of the history.
    let window = store
        .open_stream(bucket, stream_id, 2, 3)
        .await?;
    for event in window.committed_events() {
        info!(body = %event.body, "replayed");
    }

    Ok(())
}
