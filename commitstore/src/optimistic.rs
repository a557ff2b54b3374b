//! In-process conflict detection ahead of storage.
//!
//! [`OptimisticHook`] keeps a bounded, recency-evicted cache of the most
//! advanced known commit per `(bucket, stream)`. With a warm entry it rejects
//! stale or gapped attempts without a storage round trip; on a miss it defers
//! to the storage adapter's own constraints rather than asserting anything.
//! Reads warm the cache through [`PipelineHook::select`] and successful
//! writes through [`PipelineHook::post_commit`].

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::commit::{Commit, CommitAttempt};
use crate::errors::{StoreError, StoreResult};
use crate::hooks::PipelineHook;
use crate::types::{BucketId, StreamId};

/// Default number of stream heads kept before recency eviction kicks in.
pub const DEFAULT_HEAD_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    bucket_id: BucketId,
    stream_id: StreamId,
}

impl StreamKey {
    fn of_commit(commit: &Commit) -> Self {
        Self {
            bucket_id: commit.bucket_id.clone(),
            stream_id: commit.stream_id.clone(),
        }
    }

    fn of_attempt(attempt: &CommitAttempt) -> Self {
        Self {
            bucket_id: attempt.bucket_id.clone(),
            stream_id: attempt.stream_id.clone(),
        }
    }
}

/// Head map plus recency queue, mutated only as one unit.
///
/// Recency rule: every `track` moves the key to the most-recently-used end
/// *before* the capacity check; eviction then pops least-recently-used keys
/// until within capacity. Plain lookups (`head`, `contains`) never reorder.
struct HeadCache {
    heads: HashMap<StreamKey, Commit>,
    recency: VecDeque<StreamKey>,
    capacity: usize,
}

impl HeadCache {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            heads: HashMap::with_capacity(capacity.min(DEFAULT_HEAD_CAPACITY)),
            recency: VecDeque::with_capacity(capacity.min(DEFAULT_HEAD_CAPACITY)),
            capacity,
        }
    }

    fn track(&mut self, commit: Commit) {
        let key = StreamKey::of_commit(&commit);
        let advanced = match self.heads.get(&key) {
            Some(head) => head.stream_revision < commit.stream_revision,
            None => true,
        };
        if advanced {
            self.heads.insert(key.clone(), commit);
        }

        self.touch(&key);
        while self.heads.len() > self.capacity {
            match self.recency.pop_front() {
                Some(evicted) => {
                    debug!(bucket = %evicted.bucket_id, stream = %evicted.stream_id, "evicting stream head");
                    self.heads.remove(&evicted);
                }
                None => break,
            }
        }
    }

    fn touch(&mut self, key: &StreamKey) {
        if let Some(position) = self.recency.iter().position(|k| k == key) {
            self.recency.remove(position);
        }
        self.recency.push_back(key.clone());
    }

    fn head(&self, key: &StreamKey) -> Option<&Commit> {
        self.heads.get(key)
    }

    fn remove(&mut self, key: &StreamKey) {
        self.heads.remove(key);
        self.recency.retain(|k| k != key);
    }

    fn clear(&mut self) {
        self.heads.clear();
        self.recency.clear();
    }

    fn purge_bucket(&mut self, bucket_id: &BucketId) {
        self.heads.retain(|key, _| &key.bucket_id != bucket_id);
        self.recency.retain(|key| &key.bucket_id != bucket_id);
    }
}

/// The head-tracking pipeline hook.
///
/// Shared across every caller of a store; all read-modify-write sequences on
/// the cache happen under a single lock so the recency accounting and the
/// returned head can never disagree under races.
pub struct OptimisticHook {
    cache: Mutex<HeadCache>,
}

impl OptimisticHook {
    /// Creates a tracker holding up to [`DEFAULT_HEAD_CAPACITY`] stream heads.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HEAD_CAPACITY)
    }

    /// Creates a tracker holding up to `capacity` stream heads.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(HeadCache::with_capacity(capacity)),
        }
    }

    /// Records `commit` as the head of its stream if it is more advanced than
    /// what is cached, and marks the stream most recently used either way.
    pub fn track(&self, commit: Commit) {
        self.cache.lock().expect("head cache poisoned").track(commit);
    }

    /// Returns whether the stream of `commit` currently has a cached head.
    ///
    /// Observability only; does not refresh recency.
    pub fn contains(&self, commit: &Commit) -> bool {
        self.cache
            .lock()
            .expect("head cache poisoned")
            .head(&StreamKey::of_commit(commit))
            .is_some()
    }
}

impl Default for OptimisticHook {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineHook for OptimisticHook {
    fn select(&self, commit: Commit) -> Option<Commit> {
        self.track(commit.clone());
        Some(commit)
    }

    fn pre_commit(&self, attempt: &CommitAttempt) -> StoreResult<bool> {
        let cache = self.cache.lock().expect("head cache poisoned");
        let Some(head) = cache.head(&StreamKey::of_attempt(attempt)) else {
            // Nothing known about this stream; let storage arbitrate.
            return Ok(true);
        };

        if head.commit_sequence >= attempt.commit_sequence
            || head.stream_revision >= attempt.stream_revision
        {
            warn!(
                bucket = %attempt.bucket_id,
                stream = %attempt.stream_id,
                head_sequence = head.commit_sequence,
                attempt_sequence = attempt.commit_sequence,
                head_revision = head.stream_revision,
                attempt_revision = attempt.stream_revision,
                "rejecting stale commit attempt"
            );
            return Err(StoreError::ConcurrencyConflict {
                bucket_id: attempt.bucket_id.clone(),
                stream_id: attempt.stream_id.clone(),
            });
        }

        if head.commit_sequence < attempt.commit_sequence - 1 {
            warn!(
                bucket = %attempt.bucket_id,
                stream = %attempt.stream_id,
                head_sequence = head.commit_sequence,
                attempt_sequence = attempt.commit_sequence,
                "commit attempt skips past the known end of the stream"
            );
            return Err(StoreError::InvariantViolation {
                bucket_id: attempt.bucket_id.clone(),
                stream_id: attempt.stream_id.clone(),
                details: format!(
                    "attempt sequence {} leaves a gap after head sequence {}",
                    attempt.commit_sequence, head.commit_sequence
                ),
            });
        }

        if head.stream_revision < attempt.stream_revision - attempt.events.len() as u64 {
            warn!(
                bucket = %attempt.bucket_id,
                stream = %attempt.stream_id,
                head_revision = head.stream_revision,
                attempt_first_revision = attempt.first_revision(),
                "commit attempt starts beyond the known head revision"
            );
            return Err(StoreError::InvariantViolation {
                bucket_id: attempt.bucket_id.clone(),
                stream_id: attempt.stream_id.clone(),
                details: format!(
                    "attempt starting at revision {} leaves a gap after head revision {}",
                    attempt.first_revision(),
                    head.stream_revision
                ),
            });
        }

        Ok(true)
    }

    fn post_commit(&self, commit: &Commit) {
        self.track(commit.clone());
    }

    fn on_purge(&self, bucket_id: Option<&BucketId>) {
        let mut cache = self.cache.lock().expect("head cache poisoned");
        match bucket_id {
            Some(bucket_id) => cache.purge_bucket(bucket_id),
            None => cache.clear(),
        }
    }

    fn on_delete_stream(&self, bucket_id: &BucketId, stream_id: &StreamId) {
        let key = StreamKey {
            bucket_id: bucket_id.clone(),
            stream_id: stream_id.clone(),
        };
        self.cache.lock().expect("head cache poisoned").remove(&key);
    }
}
