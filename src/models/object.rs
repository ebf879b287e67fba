//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};

/// Metadata describing a single stored object.
///
/// The object's bytes live at `root/{bucket}/{key}`; this struct carries only
/// what is derived from that file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Object {
    /// Object key (slash-separated path within the bucket).
    pub key: String,

    /// Size in bytes.
    pub size_bytes: u64,

    /// Hex-encoded MD5 of the full content.
    pub etag: String,

    /// File modification time.
    pub last_modified: DateTime<Utc>,
}

impl Object {
    /// ETag in its quoted wire form.
    pub fn quoted_etag(&self) -> String {
        format!("\"{}\"", self.etag)
    }
}
