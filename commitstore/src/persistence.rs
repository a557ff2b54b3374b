//! The storage collaborator contract.
//!
//! This trait is the port boundary between the optimistic engine and whatever
//! actually holds the commits (in-memory, SQL, or otherwise). The engine never
//! trusts an adapter's filtering precision: reads may return commits extending
//! beyond the requested ceiling, and the fold logic stays correct regardless.

use async_trait::async_trait;

use crate::commit::{Commit, CommitAttempt};
use crate::errors::StoreResult;
use crate::types::{BucketId, StreamId};

/// Read an unbounded upper revision.
pub const MAX_REVISION: u64 = u64::MAX;

/// Backend-independent persistence of commits.
///
/// Implementations must make [`append`](Self::append) atomic: a commit is
/// inserted wholly or not at all. Cross-commit atomicity is not required.
#[async_trait]
pub trait PersistStreams: Send + Sync {
    /// Reads the commits of a stream whose event revisions intersect
    /// `min_revision..=max_revision`, ascending by commit sequence.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`](crate::StoreError::Unavailable) or
    /// [`StoreError::Storage`](crate::StoreError::Storage) on infrastructure
    /// failures.
    async fn read(
        &self,
        bucket_id: &BucketId,
        stream_id: &StreamId,
        min_revision: u64,
        max_revision: u64,
    ) -> StoreResult<Vec<Commit>>;

    /// Persists an attempt, assigning its checkpoint and stamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConcurrencyConflict`](crate::StoreError::ConcurrencyConflict)
    /// when another writer already advanced the stream past the attempt's
    /// position, and
    /// [`StoreError::DuplicateCommit`](crate::StoreError::DuplicateCommit)
    /// when the same commit id already exists on the stream.
    async fn append(&self, attempt: CommitAttempt) -> StoreResult<Commit>;

    /// Deletes every commit in the given bucket, or in all buckets when
    /// `bucket_id` is `None`.
    async fn purge(&self, bucket_id: Option<&BucketId>) -> StoreResult<()>;

    /// Deletes exactly one stream.
    async fn delete_stream(&self, bucket_id: &BucketId, stream_id: &StreamId) -> StoreResult<()>;
}
