//! A single stream's committed history plus pending changes.
//!
//! [`OptimisticEventStream`] folds a bounded window of persisted commits into
//! an in-memory view, layers uncommitted events on top, and runs the append
//! protocol against the owning store. It is single-owner state: callers that
//! need concurrent access to the same logical stream open independent
//! instances and let the storage layer arbitrate.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::commit::{Commit, CommitAttempt, EventMessage, Headers};
use crate::errors::{StoreError, StoreResult};
use crate::persistence::MAX_REVISION;
use crate::snapshot::Snapshot;
use crate::store::OptimisticEventStore;
use crate::types::{BucketId, CommitId, StreamId};
use serde_json::Value;

/// Where a stream stands relative to its persisted history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Created empty; nothing has been read or committed yet.
    Fresh,
    /// The requested window was folded completely.
    Loaded,
    /// The last fold stopped because events exist beyond the requested
    /// ceiling. Commits are refused until the stream refreshes.
    Partial,
    /// Disposed; all further mutations fail.
    Disposed,
}

/// One stream's materialized view and append protocol.
pub struct OptimisticEventStream {
    store: OptimisticEventStore,
    bucket_id: BucketId,
    stream_id: StreamId,
    stream_revision: u64,
    commit_sequence: u64,
    committed: Vec<EventMessage>,
    committed_headers: Headers,
    uncommitted: Vec<EventMessage>,
    uncommitted_headers: Headers,
    identifiers: HashSet<CommitId>,
    state: StreamState,
}

impl OptimisticEventStream {
    pub(crate) fn create(
        store: OptimisticEventStore,
        bucket_id: BucketId,
        stream_id: StreamId,
    ) -> Self {
        Self {
            store,
            bucket_id,
            stream_id,
            stream_revision: 0,
            commit_sequence: 0,
            committed: Vec::new(),
            committed_headers: Headers::new(),
            uncommitted: Vec::new(),
            uncommitted_headers: Headers::new(),
            identifiers: HashSet::new(),
            state: StreamState::Fresh,
        }
    }

    pub(crate) async fn open(
        store: OptimisticEventStore,
        bucket_id: BucketId,
        stream_id: StreamId,
        min_revision: u64,
        max_revision: u64,
    ) -> StoreResult<Self> {
        let commits = store
            .read(&bucket_id, &stream_id, min_revision, max_revision)
            .await?;

        let mut stream = Self::create(store, bucket_id, stream_id);
        stream.fold(min_revision, max_revision, commits);
        if min_revision > 0 && stream.committed.is_empty() {
            return Err(StoreError::StreamNotFound {
                bucket_id: stream.bucket_id,
                stream_id: stream.stream_id,
            });
        }
        if stream.state == StreamState::Fresh && !stream.identifiers.is_empty() {
            stream.state = StreamState::Loaded;
        }
        Ok(stream)
    }

    pub(crate) async fn open_from_snapshot(
        store: OptimisticEventStore,
        snapshot: Snapshot,
        max_revision: u64,
    ) -> StoreResult<Self> {
        let Snapshot {
            bucket_id,
            stream_id,
            stream_revision: anchor,
            ..
        } = snapshot;

        // The commit containing the anchor revision is needed to learn the
        // commit sequence at the anchor, so the read starts at it inclusively.
        let commits = store
            .read(&bucket_id, &stream_id, anchor, max_revision)
            .await?;

        let mut stream = Self::create(store, bucket_id, stream_id);
        stream.fold(anchor + 1, max_revision, commits);
        stream.stream_revision = anchor + stream.committed.len() as u64;
        if stream.state == StreamState::Fresh {
            stream.state = StreamState::Loaded;
        }
        Ok(stream)
    }

    /// The bucket this stream lives in.
    pub const fn bucket_id(&self) -> &BucketId {
        &self.bucket_id
    }

    /// The identity of this stream within its bucket.
    pub const fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// The revision of the last committed event folded into this view.
    pub const fn stream_revision(&self) -> u64 {
        self.stream_revision
    }

    /// The sequence of the last commit folded into this view.
    pub const fn commit_sequence(&self) -> u64 {
        self.commit_sequence
    }

    /// Where this stream stands relative to its persisted history.
    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// The committed events folded into this view, in revision order.
    pub fn committed_events(&self) -> &[EventMessage] {
        &self.committed
    }

    /// Commit-level headers merged across all folded commits, last write wins.
    pub const fn committed_headers(&self) -> &Headers {
        &self.committed_headers
    }

    /// Events staged by [`add`](Self::add) but not yet committed.
    pub fn uncommitted_events(&self) -> &[EventMessage] {
        &self.uncommitted
    }

    /// Headers staged for the next commit.
    pub const fn uncommitted_headers(&self) -> &Headers {
        &self.uncommitted_headers
    }

    /// Stages an event for the next commit.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::InvalidInput`] if the event body is null, and
    /// with [`StoreError::Disposed`] after disposal.
    pub fn add(&mut self, event: EventMessage) -> StoreResult<()> {
        if self.state == StreamState::Disposed {
            return Err(StoreError::Disposed);
        }
        if event.body.is_null() {
            return Err(StoreError::InvalidInput(
                "an event message must carry a body".into(),
            ));
        }
        self.uncommitted.push(event);
        Ok(())
    }

    /// Stages a commit-level header for the next commit.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::Disposed`] after disposal.
    pub fn set_uncommitted_header(
        &mut self,
        key: impl Into<String>,
        value: Value,
    ) -> StoreResult<()> {
        if self.state == StreamState::Disposed {
            return Err(StoreError::Disposed);
        }
        self.uncommitted_headers.insert(key.into(), value);
        Ok(())
    }

    /// Drops all staged events and headers without touching committed state.
    pub fn clear_changes(&mut self) {
        self.uncommitted.clear();
        self.uncommitted_headers.clear();
    }

    /// Durably commits the staged events under `commit_id`.
    ///
    /// On success the persisted commit is folded into the committed view and
    /// the staged changes are cleared. On a concurrency conflict the stream
    /// first refreshes its committed view from storage and then re-raises the
    /// conflict; the staged events are retained so the caller can retry with
    /// a fresh commit id on top of the now-current head.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Disposed`] after disposal.
    /// - [`StoreError::ConcurrencyConflict`] if the stream was partial or
    ///   another writer advanced it; the view has been refreshed either way.
    /// - [`StoreError::DuplicateCommit`] if `commit_id` was already applied
    ///   to this stream; nothing is refreshed or cleared.
    pub async fn commit_changes(&mut self, commit_id: CommitId) -> StoreResult<()> {
        if self.state == StreamState::Disposed {
            return Err(StoreError::Disposed);
        }
        if self.state == StreamState::Partial {
            warn!(
                bucket = %self.bucket_id,
                stream = %self.stream_id,
                revision = self.stream_revision,
                "stream is partial; refreshing before surfacing the conflict"
            );
            self.refresh().await?;
            return Err(StoreError::ConcurrencyConflict {
                bucket_id: self.bucket_id.clone(),
                stream_id: self.stream_id.clone(),
            });
        }
        if self.identifiers.contains(&commit_id) {
            return Err(StoreError::DuplicateCommit {
                stream_id: self.stream_id.clone(),
                commit_id,
            });
        }
        if self.uncommitted.is_empty() {
            debug!(
                bucket = %self.bucket_id,
                stream = %self.stream_id,
                "no staged changes; nothing to commit"
            );
            return Ok(());
        }

        self.persist_changes(commit_id).await
    }

    /// Marks this stream disposed; every later mutation fails.
    pub fn dispose(&mut self) {
        self.state = StreamState::Disposed;
    }

    async fn persist_changes(&mut self, commit_id: CommitId) -> StoreResult<()> {
        let attempt = CommitAttempt::new(
            self.bucket_id.clone(),
            self.stream_id.clone(),
            self.stream_revision + self.uncommitted.len() as u64,
            commit_id,
            self.commit_sequence + 1,
            self.uncommitted_headers.clone(),
            self.uncommitted.clone(),
        )?;
        let attempted_revision = attempt.stream_revision;
        let outcome = self.store.commit(attempt).await;

        match outcome {
            Ok(Some(commit)) => {
                debug!(
                    bucket = %self.bucket_id,
                    stream = %self.stream_id,
                    revision = commit.stream_revision,
                    sequence = commit.commit_sequence,
                    "commit persisted"
                );
                let min_revision = self.stream_revision + 1;
                self.fold(min_revision, attempted_revision, vec![commit]);
                self.clear_changes();
                if self.state == StreamState::Fresh {
                    self.state = StreamState::Loaded;
                }
                Ok(())
            }
            Ok(None) => {
                // A hook vetoed the attempt; deliberate, not an error.
                debug!(
                    bucket = %self.bucket_id,
                    stream = %self.stream_id,
                    "commit vetoed by a pipeline hook"
                );
                self.clear_changes();
                Ok(())
            }
            Err(error @ StoreError::ConcurrencyConflict { .. }) => {
                warn!(
                    bucket = %self.bucket_id,
                    stream = %self.stream_id,
                    "conflicting write detected; refreshing committed view"
                );
                self.refresh().await?;
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    /// Reloads every commit beyond the current revision and folds it in.
    ///
    /// Pending events are untouched; only the committed view advances.
    async fn refresh(&mut self) -> StoreResult<()> {
        let commits = self
            .store
            .read(
                &self.bucket_id,
                &self.stream_id,
                self.stream_revision + 1,
                MAX_REVISION,
            )
            .await?;
        self.state = StreamState::Loaded;
        self.fold(self.stream_revision + 1, MAX_REVISION, commits);
        Ok(())
    }

    /// Folds persisted commits into the committed view.
    ///
    /// Events below `min_revision` are skipped; an event beyond
    /// `max_revision` marks the stream partial and stops the fold. The commit
    /// id of every visited commit is recorded even when its events are not
    /// copied, so duplicate detection spans the whole visited window. Storage
    /// adapters are not trusted to filter precisely: the bounds are enforced
    /// here regardless of what the read returned.
    fn fold(&mut self, min_revision: u64, max_revision: u64, commits: Vec<Commit>) {
        for commit in commits {
            self.identifiers.insert(commit.commit_id);
            self.commit_sequence = commit.commit_sequence;

            let first_revision = commit.first_revision();
            if first_revision > max_revision {
                debug!(
                    bucket = %self.bucket_id,
                    stream = %self.stream_id,
                    first_revision,
                    max_revision,
                    "commit lies beyond the requested ceiling; stream is partial"
                );
                self.state = StreamState::Partial;
                return;
            }

            let Commit {
                headers, events, ..
            } = commit;
            for (key, value) in headers {
                self.committed_headers.insert(key, value);
            }

            let mut revision = first_revision;
            for event in events {
                if revision > max_revision {
                    self.state = StreamState::Partial;
                    break;
                }
                if revision < min_revision {
                    revision += 1;
                    continue;
                }
                self.committed.push(event);
                self.stream_revision = revision;
                revision += 1;
            }
        }
    }
}

impl std::fmt::Debug for OptimisticEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimisticEventStream")
            .field("bucket_id", &self.bucket_id)
            .field("stream_id", &self.stream_id)
            .field("stream_revision", &self.stream_revision)
            .field("commit_sequence", &self.commit_sequence)
            .field("committed", &self.committed.len())
            .field("uncommitted", &self.uncommitted.len())
            .field("state", &self.state)
            .finish()
    }
}
