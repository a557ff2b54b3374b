//! Core identifier types for the `CommitStore` library.
//!
//! All types use smart constructors to ensure validity at construction time,
//! following the "parse, don't validate" principle: once a value exists, it is
//! known to be well-formed and no downstream code re-checks it.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bucket identifier that partitions independent sets of streams.
///
/// Buckets are the multi-tenancy mechanism: two streams with the same name in
/// different buckets are unrelated. `BucketId` values are guaranteed to be
/// non-empty and at most 255 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct BucketId(String);

impl BucketId {
    /// The bucket used when a caller does not partition its streams.
    pub fn default_bucket() -> Self {
        Self::try_new("default").expect("'default' is a valid bucket id")
    }
}

/// A stream identifier that uniquely identifies an event stream within its
/// bucket.
///
/// `StreamId` values are guaranteed to be non-empty and at most 255 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct StreamId(String);

/// The identity of a single commit attempt against a stream.
///
/// A `CommitId` is supplied by the caller and must never repeat within a
/// stream; re-submitting the same id is how duplicate appends are detected
/// across retries. The nil UUID is rejected at construction.
#[nutype(
    validate(predicate = |id: &Uuid| !id.is_nil()),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CommitId(Uuid);

impl CommitId {
    /// Creates a new `CommitId` with the current timestamp.
    ///
    /// This is a convenience method that generates a new `UUIDv7`, giving ids
    /// a monotonic sort order for commits created in sequence.
    pub fn fresh() -> Self {
        // This will always succeed as Uuid::now_v7() is never nil
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() is never nil")
    }
}

/// A storage-assigned token ordering commits globally across all streams and
/// buckets.
///
/// Checkpoints are opaque to callers; the only contract is that they are
/// totally ordered in persistence order.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Into,
    Serialize,
    Deserialize
))]
pub struct Checkpoint(u64);

impl Checkpoint {
    /// Returns the next checkpoint after this one.
    #[must_use]
    pub fn next(self) -> Self {
        let current: u64 = self.into();
        Self::new(current + 1)
    }
}

/// The instant at which a commit was persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
