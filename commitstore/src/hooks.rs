//! The pipeline-hook contract.
//!
//! Hooks observe and gate the commit pipeline. They run in registration
//! order: every pre-commit hook sees an attempt before storage does, every
//! post-commit hook sees the persisted commit, and every read passes each
//! commit through `select` (which may drop it from the results).

use crate::commit::{Commit, CommitAttempt};
use crate::errors::StoreResult;
use crate::types::{BucketId, StreamId};

/// A participant in the commit pipeline.
///
/// All methods have no-op defaults so a hook implements only what it needs.
pub trait PipelineHook: Send + Sync {
    /// Filters or transforms a commit on the read path.
    ///
    /// Returning `None` drops the commit from the results.
    fn select(&self, commit: Commit) -> Option<Commit> {
        Some(commit)
    }

    /// Inspects an attempt before it reaches storage.
    ///
    /// Returning `Ok(false)` vetoes the attempt silently: the pipeline
    /// short-circuits and yields no commit, but no error is raised. Returning
    /// an error aborts the attempt with that error.
    fn pre_commit(&self, attempt: &CommitAttempt) -> StoreResult<bool> {
        let _ = attempt;
        Ok(true)
    }

    /// Observes a commit after storage accepted it.
    fn post_commit(&self, commit: &Commit) {
        let _ = commit;
    }

    /// Notifies that a bucket (or, with `None`, the whole store) was purged.
    fn on_purge(&self, bucket_id: Option<&BucketId>) {
        let _ = bucket_id;
    }

    /// Notifies that a single stream was deleted.
    fn on_delete_stream(&self, bucket_id: &BucketId, stream_id: &StreamId) {
        let _ = (bucket_id, stream_id);
    }
}

impl<T: PipelineHook + ?Sized> PipelineHook for std::sync::Arc<T> {
    fn select(&self, commit: Commit) -> Option<Commit> {
        (**self).select(commit)
    }

    fn pre_commit(&self, attempt: &CommitAttempt) -> StoreResult<bool> {
        (**self).pre_commit(attempt)
    }

    fn post_commit(&self, commit: &Commit) {
        (**self).post_commit(commit);
    }

    fn on_purge(&self, bucket_id: Option<&BucketId>) {
        (**self).on_purge(bucket_id);
    }

    fn on_delete_stream(&self, bucket_id: &BucketId, stream_id: &StreamId) {
        (**self).on_delete_stream(bucket_id, stream_id);
    }
}
