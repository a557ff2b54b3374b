//! The commit data model: persisted [`Commit`]s, proposed [`CommitAttempt`]s,
//! and the [`EventMessage`]s they carry.
//!
//! A commit is an immutable batch of one or more events appended atomically to
//! a stream. Its `stream_revision` is the revision of the *last* event in the
//! batch; the batch occupies the contiguous revision range ending there. Its
//! `commit_sequence` is the 1-based ordinal of the commit within the stream,
//! strictly increasing with no gaps.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{StoreError, StoreResult};
use crate::types::{BucketId, Checkpoint, CommitId, StreamId, Timestamp};

/// Commit-level and event-level metadata headers.
pub type Headers = HashMap<String, Value>;

/// A single domain event: a header map plus an opaque JSON body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Metadata attached to this event alone.
    pub headers: Headers,
    /// The event payload. Opaque to the store.
    pub body: Value,
}

impl EventMessage {
    /// Creates an event message with the given body and no headers.
    pub fn new(body: Value) -> Self {
        Self {
            headers: Headers::new(),
            body,
        }
    }

    /// Adds a header to this event.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: Value) -> Self {
        self.headers.insert(key.into(), value);
        self
    }
}

/// An immutable, persisted batch of events within a stream.
///
/// Identity is defined by `(bucket_id, stream_id, commit_id)` — the stricter
/// of the two plausible rules, since the same commit id may legitimately
/// appear in different buckets. Equality and hashing use exactly those three
/// fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    /// The bucket containing the stream.
    pub bucket_id: BucketId,
    /// The stream this commit belongs to.
    pub stream_id: StreamId,
    /// The revision of the last event in this commit.
    pub stream_revision: u64,
    /// The caller-supplied identity of this commit attempt.
    pub commit_id: CommitId,
    /// The 1-based ordinal of this commit within the stream.
    pub commit_sequence: u64,
    /// When this commit was persisted.
    pub commit_stamp: Timestamp,
    /// Storage-assigned global ordering token.
    pub checkpoint: Checkpoint,
    /// Commit-level metadata.
    pub headers: Headers,
    /// The events carried by this commit. Never empty.
    pub events: Vec<EventMessage>,
}

impl Commit {
    /// Builds the persisted form of an accepted attempt.
    ///
    /// Storage adapters call this after assigning a checkpoint; the stamp is
    /// taken at persistence time, not attempt-build time.
    pub fn from_attempt(attempt: CommitAttempt, checkpoint: Checkpoint, stamp: Timestamp) -> Self {
        Self {
            bucket_id: attempt.bucket_id,
            stream_id: attempt.stream_id,
            stream_revision: attempt.stream_revision,
            commit_id: attempt.commit_id,
            commit_sequence: attempt.commit_sequence,
            commit_stamp: stamp,
            checkpoint,
            headers: attempt.headers,
            events: attempt.events,
        }
    }

    /// The revision of the first event in this commit.
    pub fn first_revision(&self) -> u64 {
        self.stream_revision - self.events.len() as u64 + 1
    }
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.bucket_id == other.bucket_id
            && self.stream_id == other.stream_id
            && self.commit_id == other.commit_id
    }
}

impl Eq for Commit {}

impl Hash for Commit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bucket_id.hash(state);
        self.stream_id.hash(state);
        self.commit_id.hash(state);
    }
}

/// A proposed commit that has not yet been persisted.
///
/// Attempts are validated at construction and discarded after the append
/// succeeds or fails; retrying requires building a new attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAttempt {
    /// The bucket containing the stream.
    pub bucket_id: BucketId,
    /// The stream to append to.
    pub stream_id: StreamId,
    /// The revision the stream will have once this attempt is applied.
    pub stream_revision: u64,
    /// The identity of this attempt; must be unique per stream.
    pub commit_id: CommitId,
    /// The sequence the commit will occupy: prior sequence + 1.
    pub commit_sequence: u64,
    /// When the attempt was built.
    pub commit_stamp: Timestamp,
    /// Commit-level metadata.
    pub headers: Headers,
    /// The events to append. Never empty.
    pub events: Vec<EventMessage>,
}

impl CommitAttempt {
    /// Creates a validated commit attempt.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] if the revision or sequence is
    /// zero, the revision is below the sequence (a commit carries at least one
    /// event per sequence slot), or the event list is empty. Blank identifiers
    /// and nil commit ids are unrepresentable in the argument types.
    pub fn new(
        bucket_id: BucketId,
        stream_id: StreamId,
        stream_revision: u64,
        commit_id: CommitId,
        commit_sequence: u64,
        headers: Headers,
        events: Vec<EventMessage>,
    ) -> StoreResult<Self> {
        if stream_revision == 0 {
            return Err(StoreError::InvalidInput(
                "stream revision must be positive".into(),
            ));
        }
        if commit_sequence == 0 {
            return Err(StoreError::InvalidInput(
                "commit sequence must be positive".into(),
            ));
        }
        if stream_revision < commit_sequence {
            return Err(StoreError::InvalidInput(format!(
                "stream revision {stream_revision} cannot be below commit sequence {commit_sequence}"
            )));
        }
        if events.is_empty() {
            return Err(StoreError::InvalidInput(
                "a commit must carry at least one event".into(),
            ));
        }
        if events.len() as u64 > stream_revision {
            return Err(StoreError::InvalidInput(format!(
                "{} events cannot end at revision {stream_revision}",
                events.len()
            )));
        }

        Ok(Self {
            bucket_id,
            stream_id,
            stream_revision,
            commit_id,
            commit_sequence,
            commit_stamp: Timestamp::now(),
            headers,
            events,
        })
    }

    /// The revision of the first event in this attempt.
    pub fn first_revision(&self) -> u64 {
        self.stream_revision - self.events.len() as u64 + 1
    }
}
