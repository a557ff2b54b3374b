//! In-memory adapter for the `commitstore` event-sourcing library.
//!
//! This crate provides an in-memory implementation of the [`PersistStreams`]
//! trait from the commitstore crate, useful for testing and development
//! scenarios where persistence is not required. It enforces the same
//! duplicate-id and contiguity constraints a durable adapter must, so the
//! optimistic protocol behaves identically against it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use commitstore::commit::{Commit, CommitAttempt};
use commitstore::errors::{StoreError, StoreResult};
use commitstore::persistence::PersistStreams;
use commitstore::types::{BucketId, Checkpoint, StreamId, Timestamp};

type Streams = HashMap<StreamId, Vec<Commit>>;

#[derive(Default)]
struct Storage {
    // Maps bucket -> stream -> commits in commit-sequence order
    buckets: HashMap<BucketId, Streams>,
    // Global persistence-order counter backing checkpoint assignment
    last_checkpoint: u64,
}

impl Storage {
    fn next_checkpoint(&mut self) -> Checkpoint {
        self.last_checkpoint += 1;
        Checkpoint::new(self.last_checkpoint)
    }
}

/// Thread-safe in-memory commit storage.
///
/// Cloning shares the underlying storage, so a clone handed to another task
/// sees the same streams.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    storage: Arc<RwLock<Storage>>,
}

impl InMemoryPersistence {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of commits across all streams and buckets.
    pub fn commit_count(&self) -> usize {
        let storage = self.storage.read().expect("RwLock poisoned");
        storage
            .buckets
            .values()
            .flat_map(Streams::values)
            .map(Vec::len)
            .sum()
    }
}

#[async_trait]
impl PersistStreams for InMemoryPersistence {
    async fn read(
        &self,
        bucket_id: &BucketId,
        stream_id: &StreamId,
        min_revision: u64,
        max_revision: u64,
    ) -> StoreResult<Vec<Commit>> {
        let storage = self.storage.read().expect("RwLock poisoned");

        let Some(commits) = storage
            .buckets
            .get(bucket_id)
            .and_then(|streams| streams.get(stream_id))
        else {
            return Ok(Vec::new());
        };

        // Intersect each commit's revision span with the requested window.
        // Commits are kept in append order, which is commit-sequence order.
        Ok(commits
            .iter()
            .filter(|commit| {
                commit.stream_revision >= min_revision && commit.first_revision() <= max_revision
            })
            .cloned()
            .collect())
    }

    async fn append(&self, attempt: CommitAttempt) -> StoreResult<Commit> {
        let mut storage = self.storage.write().expect("RwLock poisoned");

        // Verify the attempt against the current head before any mutation.
        {
            let existing = storage
                .buckets
                .get(&attempt.bucket_id)
                .and_then(|streams| streams.get(&attempt.stream_id));

            if let Some(commits) = existing {
                if commits.iter().any(|c| c.commit_id == attempt.commit_id) {
                    return Err(StoreError::DuplicateCommit {
                        stream_id: attempt.stream_id,
                        commit_id: attempt.commit_id,
                    });
                }
            }

            let (head_revision, head_sequence) = existing
                .and_then(|commits| commits.last())
                .map_or((0, 0), |head| (head.stream_revision, head.commit_sequence));

            if attempt.commit_sequence != head_sequence + 1
                || attempt.stream_revision != head_revision + attempt.events.len() as u64
            {
                return Err(StoreError::ConcurrencyConflict {
                    bucket_id: attempt.bucket_id,
                    stream_id: attempt.stream_id,
                });
            }
        }

        let checkpoint = storage.next_checkpoint();
        let commit = Commit::from_attempt(attempt, checkpoint, Timestamp::now());

        storage
            .buckets
            .entry(commit.bucket_id.clone())
            .or_default()
            .entry(commit.stream_id.clone())
            .or_default()
            .push(commit.clone());

        Ok(commit)
    }

    async fn purge(&self, bucket_id: Option<&BucketId>) -> StoreResult<()> {
        let mut storage = self.storage.write().expect("RwLock poisoned");
        match bucket_id {
            Some(bucket_id) => {
                storage.buckets.remove(bucket_id);
            }
            None => storage.buckets.clear(),
        }
        Ok(())
    }

    async fn delete_stream(&self, bucket_id: &BucketId, stream_id: &StreamId) -> StoreResult<()> {
        let mut storage = self.storage.write().expect("RwLock poisoned");
        if let Some(streams) = storage.buckets.get_mut(bucket_id) {
            streams.remove(stream_id);
        }
        Ok(())
    }
}
