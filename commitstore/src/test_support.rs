//! In-crate storage double for unit tests.
//!
//! A deliberately small stand-in for a real adapter: enough contiguity and
//! duplicate checking to make the optimistic protocol observable, with an
//! append counter so tests can tell hook rejections from storage rejections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::commit::{Commit, CommitAttempt};
use crate::errors::{StoreError, StoreResult};
use crate::persistence::PersistStreams;
use crate::store::OptimisticEventStore;
use crate::types::{BucketId, Checkpoint, StreamId, Timestamp};

type StreamMap = HashMap<(BucketId, StreamId), Vec<Commit>>;

/// Shared-state fake storage; clones share the same commits.
#[derive(Clone)]
pub(crate) struct FakePersistence {
    streams: Arc<RwLock<StreamMap>>,
    checkpoint: Arc<AtomicU64>,
    appends: Arc<AtomicUsize>,
}

impl FakePersistence {
    pub(crate) fn new() -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
            checkpoint: Arc::new(AtomicU64::new(0)),
            appends: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many attempts reached storage (accepted or rejected).
    pub(crate) fn appends(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistStreams for FakePersistence {
    async fn read(
        &self,
        bucket_id: &BucketId,
        stream_id: &StreamId,
        min_revision: u64,
        max_revision: u64,
    ) -> StoreResult<Vec<Commit>> {
        let streams = self.streams.read().expect("fake storage poisoned");
        let Some(commits) = streams.get(&(bucket_id.clone(), stream_id.clone())) else {
            return Ok(Vec::new());
        };
        Ok(commits
            .iter()
            .filter(|commit| {
                commit.stream_revision >= min_revision && commit.first_revision() <= max_revision
            })
            .cloned()
            .collect())
    }

    async fn append(&self, attempt: CommitAttempt) -> StoreResult<Commit> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        let mut streams = self.streams.write().expect("fake storage poisoned");
        let commits = streams
            .entry((attempt.bucket_id.clone(), attempt.stream_id.clone()))
            .or_default();

        if commits.iter().any(|c| c.commit_id == attempt.commit_id) {
            return Err(StoreError::DuplicateCommit {
                stream_id: attempt.stream_id,
                commit_id: attempt.commit_id,
            });
        }

        let (head_revision, head_sequence) = commits
            .last()
            .map_or((0, 0), |c| (c.stream_revision, c.commit_sequence));
        if attempt.commit_sequence != head_sequence + 1
            || attempt.stream_revision != head_revision + attempt.events.len() as u64
        {
            return Err(StoreError::ConcurrencyConflict {
                bucket_id: attempt.bucket_id,
                stream_id: attempt.stream_id,
            });
        }

        let checkpoint = Checkpoint::new(self.checkpoint.fetch_add(1, Ordering::SeqCst) + 1);
        let commit = Commit::from_attempt(attempt, checkpoint, Timestamp::now());
        commits.push(commit.clone());
        Ok(commit)
    }

    async fn purge(&self, bucket_id: Option<&BucketId>) -> StoreResult<()> {
        let mut streams = self.streams.write().expect("fake storage poisoned");
        match bucket_id {
            Some(bucket_id) => streams.retain(|(bucket, _), _| bucket != bucket_id),
            None => streams.clear(),
        }
        Ok(())
    }

    async fn delete_stream(&self, bucket_id: &BucketId, stream_id: &StreamId) -> StoreResult<()> {
        let mut streams = self.streams.write().expect("fake storage poisoned");
        streams.remove(&(bucket_id.clone(), stream_id.clone()));
        Ok(())
    }
}

/// A store over a fresh fake storage, with the default hook pipeline.
pub(crate) fn store_with_fake_storage() -> OptimisticEventStore {
    OptimisticEventStore::new(FakePersistence::new())
}
