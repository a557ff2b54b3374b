//! Snapshots: externally-supplied materialized views of a stream at a given
//! revision, used to open a stream without replaying its full history.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{StoreError, StoreResult};
use crate::types::{BucketId, StreamId};

/// A materialized view of a stream as of a specific revision.
///
/// The store does not produce or persist snapshots; callers supply them when
/// opening a stream to skip replay below the snapshot revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The bucket containing the snapshotted stream.
    pub bucket_id: BucketId,
    /// The snapshotted stream.
    pub stream_id: StreamId,
    /// The revision of the last event folded into the payload.
    pub stream_revision: u64,
    /// The caller's materialized state. Opaque to the store.
    pub payload: Value,
}

impl Snapshot {
    /// Creates a snapshot anchored at `stream_revision`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] if `stream_revision` is zero; a
    /// snapshot of an empty stream has nothing to anchor to.
    pub fn new(
        bucket_id: BucketId,
        stream_id: StreamId,
        stream_revision: u64,
        payload: Value,
    ) -> StoreResult<Self> {
        if stream_revision == 0 {
            return Err(StoreError::InvalidInput(
                "snapshot revision must be positive".into(),
            ));
        }
        Ok(Self {
            bucket_id,
            stream_id,
            stream_revision,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_at_zero_revision_is_rejected() {
        let result = Snapshot::new(
            BucketId::default_bucket(),
            StreamId::try_new("orders-1").unwrap(),
            0,
            json!({}),
        );
        assert!(matches!(result, Err(StoreError::InvalidInput(_))));
    }

    #[test]
    fn snapshot_keeps_its_anchor() {
        let snapshot = Snapshot::new(
            BucketId::default_bucket(),
            StreamId::try_new("orders-1").unwrap(),
            7,
            json!({ "total": 3 }),
        )
        .unwrap();
        assert_eq!(snapshot.stream_revision, 7);
        assert_eq!(snapshot.payload, json!({ "total": 3 }));
    }
}
