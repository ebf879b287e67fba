//! Represents a bucket — a top-level directory under the storage root.

use chrono::{DateTime, Utc};

/// A bucket as reported by `ListBuckets`.
///
/// Buckets carry no stored metadata; the creation time is the directory's
/// modification time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    /// Bucket name, identical to the directory name under the root.
    pub name: String,

    /// Directory modification time.
    pub created_at: DateTime<Utc>,
}
