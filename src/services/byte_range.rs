//! Single-range `Range: bytes=...` parsing.
//!
//! Only one range per request is honoured; a comma-separated list is
//! rejected as unsatisfiable rather than served as multipart/byteranges.

use std::{ops::Range, str::FromStr};
use thiserror::Error;

const UNIT_PREFIX: &str = "bytes=";

/// A parsed byte range, not yet resolved against an object size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=-N`: the last `N` bytes.
    Suffix(u64),
    /// `bytes=N-`: from offset `N` to the end.
    From(u64),
    /// `bytes=N-M`: offsets `N..=M`.
    Bounded { start: u64, end: u64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("range `{0}` does not use the bytes unit")]
    UnsupportedUnit(String),
    #[error("multiple ranges are not supported")]
    MultipleRanges,
    #[error("malformed range `{0}`")]
    Malformed(String),
}

impl FromStr for ByteRange {
    type Err = RangeError;

    fn from_str(header: &str) -> Result<Self, Self::Err> {
        let ranges = header
            .strip_prefix(UNIT_PREFIX)
            .ok_or_else(|| RangeError::UnsupportedUnit(header.to_string()))?;
        if ranges.contains(',') {
            return Err(RangeError::MultipleRanges);
        }

        let malformed = || RangeError::Malformed(header.to_string());
        let (first, last) = ranges.trim().split_once('-').ok_or_else(malformed)?;

        if first.is_empty() {
            let len = last.parse::<u64>().map_err(|_| malformed())?;
            if len == 0 {
                return Err(malformed());
            }
            return Ok(ByteRange::Suffix(len));
        }

        let start = first.parse::<u64>().map_err(|_| malformed())?;
        if last.is_empty() {
            return Ok(ByteRange::From(start));
        }

        let end = last.parse::<u64>().map_err(|_| malformed())?;
        if end < start {
            return Err(malformed());
        }
        Ok(ByteRange::Bounded { start, end })
    }
}

impl ByteRange {
    /// Parse an optional `Range` header value. `None` means "whole object".
    pub fn parse_header(value: Option<&str>) -> Result<Option<Self>, RangeError> {
        match value {
            None => Ok(None),
            Some(v) if v.trim().is_empty() => Ok(None),
            Some(v) => v.parse().map(Some),
        }
    }

    /// Resolve against the real object size into a half-open window.
    ///
    /// Suffix lengths larger than the object clamp to the whole object and an
    /// explicit end past the last byte clamps to it. Returns `None` when the
    /// start offset falls outside the object.
    pub fn resolve(&self, size: u64) -> Option<Range<u64>> {
        let (start, end) = match *self {
            ByteRange::Suffix(len) => (size - len.min(size), size),
            ByteRange::From(start) => (start, size),
            ByteRange::Bounded { start, end } => (start, end.saturating_add(1).min(size)),
        };
        if start >= size {
            return None;
        }
        Some(start..end)
    }

    /// Render the `Content-Range` value for a satisfiable range.
    pub fn content_range(&self, size: u64) -> Option<String> {
        self.resolve(size)
            .map(|window| format!("bytes {}-{}/{}", window.start, window.end - 1, size))
    }
}
