//! Core data models for the S3-compatible object store.
//!
//! Buckets and objects are derived from the filesystem on every request;
//! nothing here is persisted separately.

pub mod bucket;
pub mod object;
