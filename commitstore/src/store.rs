//! The commit store facade: the hook pipeline around a storage adapter and
//! the factory for event streams.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::commit::{Commit, CommitAttempt};
use crate::errors::StoreResult;
use crate::hooks::PipelineHook;
use crate::optimistic::{OptimisticHook, DEFAULT_HEAD_CAPACITY};
use crate::persistence::PersistStreams;
use crate::snapshot::Snapshot;
use crate::stream::OptimisticEventStream;
use crate::types::{BucketId, StreamId};

/// The commit store: wraps a [`PersistStreams`] adapter with the pipeline-hook
/// protocol and opens [`OptimisticEventStream`]s bound to itself.
///
/// Cloning is cheap and shares the adapter and the hooks, so one store can be
/// handed to any number of concurrent callers; it holds no per-call mutable
/// state of its own.
#[derive(Clone)]
pub struct OptimisticEventStore {
    inner: Arc<Inner>,
}

struct Inner {
    persistence: Arc<dyn PersistStreams>,
    hooks: Vec<Arc<dyn PipelineHook>>,
}

impl OptimisticEventStore {
    /// Creates a store over `persistence` with the default head-tracking hook.
    pub fn new(persistence: impl PersistStreams + 'static) -> Self {
        Self::builder(persistence).build()
    }

    /// Starts configuring a store over `persistence`.
    pub fn builder(persistence: impl PersistStreams + 'static) -> OptimisticEventStoreBuilder {
        OptimisticEventStoreBuilder {
            persistence: Arc::new(persistence),
            hooks: Vec::new(),
            head_capacity: DEFAULT_HEAD_CAPACITY,
        }
    }

    /// Runs an attempt through the pre-commit hooks, the storage adapter, and
    /// the post-commit hooks, in registration order.
    ///
    /// Returns `Ok(None)` when a hook vetoed the attempt silently; storage is
    /// not contacted and no post-commit hook runs.
    ///
    /// # Errors
    ///
    /// Head-tracking vetoes surface as
    /// [`StoreError::ConcurrencyConflict`](crate::StoreError::ConcurrencyConflict) or
    /// [`StoreError::InvariantViolation`](crate::StoreError::InvariantViolation);
    /// storage failures propagate unchanged.
    #[instrument(
        skip(self, attempt),
        fields(
            bucket = %attempt.bucket_id,
            stream = %attempt.stream_id,
            sequence = attempt.commit_sequence,
            revision = attempt.stream_revision,
        )
    )]
    pub async fn commit(&self, attempt: CommitAttempt) -> StoreResult<Option<Commit>> {
        for hook in &self.inner.hooks {
            if !hook.pre_commit(&attempt)? {
                info!("commit attempt vetoed by a pipeline hook");
                return Ok(None);
            }
        }

        let commit = self.inner.persistence.append(attempt).await?;
        debug!(checkpoint = %commit.checkpoint, "commit persisted");

        for hook in &self.inner.hooks {
            hook.post_commit(&commit);
        }
        Ok(Some(commit))
    }

    /// Reads a revision window of a stream, passing every commit through the
    /// hooks' `select` (which warms the head cache and may drop commits).
    #[instrument(skip(self), fields(bucket = %bucket_id, stream = %stream_id))]
    pub async fn read(
        &self,
        bucket_id: &BucketId,
        stream_id: &StreamId,
        min_revision: u64,
        max_revision: u64,
    ) -> StoreResult<Vec<Commit>> {
        let commits = self
            .inner
            .persistence
            .read(bucket_id, stream_id, min_revision, max_revision)
            .await?;

        let mut selected = Vec::with_capacity(commits.len());
        'commits: for commit in commits {
            let mut current = commit;
            for hook in &self.inner.hooks {
                match hook.select(current) {
                    Some(next) => current = next,
                    None => {
                        debug!("commit dropped from read results by a pipeline hook");
                        continue 'commits;
                    }
                }
            }
            selected.push(current);
        }
        Ok(selected)
    }

    /// Creates a stream that does not exist yet. No storage round trip.
    pub fn create_stream(&self, bucket_id: BucketId, stream_id: StreamId) -> OptimisticEventStream {
        OptimisticEventStream::create(self.clone(), bucket_id, stream_id)
    }

    /// Opens an existing stream, folding commits covering
    /// `min_revision..=max_revision`.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::StreamNotFound`](crate::StoreError::StreamNotFound)
    /// when `min_revision > 0` and the stream has no commits.
    pub async fn open_stream(
        &self,
        bucket_id: BucketId,
        stream_id: StreamId,
        min_revision: u64,
        max_revision: u64,
    ) -> StoreResult<OptimisticEventStream> {
        OptimisticEventStream::open(self.clone(), bucket_id, stream_id, min_revision, max_revision)
            .await
    }

    /// Opens a stream anchored at a snapshot, folding commits from the
    /// snapshot revision through `max_revision`.
    pub async fn open_stream_from_snapshot(
        &self,
        snapshot: Snapshot,
        max_revision: u64,
    ) -> StoreResult<OptimisticEventStream> {
        OptimisticEventStream::open_from_snapshot(self.clone(), snapshot, max_revision).await
    }

    /// Deletes every commit in every bucket, then notifies the hooks.
    pub async fn purge(&self) -> StoreResult<()> {
        self.inner.persistence.purge(None).await?;
        for hook in &self.inner.hooks {
            hook.on_purge(None);
        }
        Ok(())
    }

    /// Deletes every commit in one bucket, then notifies the hooks.
    pub async fn purge_bucket(&self, bucket_id: &BucketId) -> StoreResult<()> {
        self.inner.persistence.purge(Some(bucket_id)).await?;
        for hook in &self.inner.hooks {
            hook.on_purge(Some(bucket_id));
        }
        Ok(())
    }

    /// Deletes exactly one stream, then notifies the hooks.
    pub async fn delete_stream(&self, bucket_id: &BucketId, stream_id: &StreamId) -> StoreResult<()> {
        self.inner
            .persistence
            .delete_stream(bucket_id, stream_id)
            .await?;
        for hook in &self.inner.hooks {
            hook.on_delete_stream(bucket_id, stream_id);
        }
        Ok(())
    }
}

impl std::fmt::Debug for OptimisticEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimisticEventStore")
            .field("hooks", &self.inner.hooks.len())
            .finish_non_exhaustive()
    }
}

/// Configures an [`OptimisticEventStore`] before construction.
pub struct OptimisticEventStoreBuilder {
    persistence: Arc<dyn PersistStreams>,
    hooks: Vec<Arc<dyn PipelineHook>>,
    head_capacity: usize,
}

impl OptimisticEventStoreBuilder {
    /// Registers an additional hook. Hooks run in registration order, after
    /// the head tracker.
    #[must_use]
    pub fn hook(mut self, hook: impl PipelineHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Overrides how many stream heads the conflict-detection cache keeps.
    #[must_use]
    pub const fn head_capacity(mut self, capacity: usize) -> Self {
        self.head_capacity = capacity;
        self
    }

    /// Builds the store. The head tracker is always the first hook.
    pub fn build(self) -> OptimisticEventStore {
        let mut hooks: Vec<Arc<dyn PipelineHook>> =
            vec![Arc::new(OptimisticHook::with_capacity(self.head_capacity))];
        hooks.extend(self.hooks);

        OptimisticEventStore {
            inner: Arc::new(Inner {
                persistence: self.persistence,
                hooks,
            }),
        }
    }
}
