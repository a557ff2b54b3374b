//! Error types for `CommitStore`.
//!
//! One enum carries the whole failure taxonomy of the commit protocol so that
//! callers can match on the condition they care about and let everything else
//! propagate. The variants fall into three groups:
//!
//! - **Caller mistakes** (`InvalidInput`, `DuplicateCommit`, `Disposed`):
//!   surfaced immediately, never retried automatically.
//! - **Races** (`ConcurrencyConflict`): another writer advanced the stream.
//!   The stream refreshes its committed state before re-raising, so the caller
//!   can retry the same pending events under a new commit id.
//! - **Infrastructure** (`InvariantViolation`, `Unavailable`, `Storage`):
//!   propagated unchanged; `InvariantViolation` indicates a gap or corruption
//!   rather than an ordinary race and should not be blindly retried.

use crate::types::{BucketId, CommitId, StreamId};
use thiserror::Error;

/// A specialized `Result` for commit store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the commit store, its hooks, and its storage adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Malformed input: a blank identifier, a non-positive revision or
    /// sequence, a nil commit id, or an empty event list.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Another writer advanced the stream past the attempted position.
    /// The stream has been refreshed; reload-free retry with a fresh commit
    /// id is safe.
    #[error(
        "concurrency conflict on stream '{stream_id}' in bucket '{bucket_id}' \
         (hint: stream was modified; retry with a fresh commit id)"
    )]
    ConcurrencyConflict {
        /// The bucket containing the contested stream.
        bucket_id: BucketId,
        /// The stream another writer advanced.
        stream_id: StreamId,
    },

    /// A commit id was reused against the same stream.
    #[error("commit {commit_id} was already applied to stream '{stream_id}'")]
    DuplicateCommit {
        /// The stream the id was reused against.
        stream_id: StreamId,
        /// The reused commit id.
        commit_id: CommitId,
    },

    /// The attempt is inconsistent with the known head of the stream in a way
    /// that indicates a gap, not a simple race.
    #[error("stream '{stream_id}' in bucket '{bucket_id}' violates storage invariants: {details}")]
    InvariantViolation {
        /// The bucket containing the inconsistent stream.
        bucket_id: BucketId,
        /// The inconsistent stream.
        stream_id: StreamId,
        /// What the attempt skipped past.
        details: String,
    },

    /// A read requested a non-zero minimum revision against a stream with no
    /// commits.
    #[error("stream '{stream_id}' not found in bucket '{bucket_id}'")]
    StreamNotFound {
        /// The bucket that was searched.
        bucket_id: BucketId,
        /// The stream that does not exist.
        stream_id: StreamId,
    },

    /// The storage collaborator is temporarily unreachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The storage collaborator failed in an unexpected way.
    #[error("storage error: {0}")]
    Storage(String),

    /// An operation was attempted on a disposed stream.
    #[error("the event stream has been disposed")]
    Disposed,
}

impl StoreError {
    /// Returns `true` for conflicts that are safe to retry with a fresh
    /// commit id once the stream has been refreshed.
    pub const fn is_retryable_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}
