//! src/services/storage_service.rs
//!
//! StorageService — S3-like bucket and object operations mapped directly onto
//! a directory tree: `base_path/{bucket}/{key segments...}`. There is no
//! metadata store; sizes, timestamps and ETags are derived from the files
//! themselves on every call.
//!
//! The only synchronization point between concurrent requests is the
//! filesystem: uploads land in a colocated scratch file and are renamed onto
//! the final path, so readers observe either the previous or the new content
//! in full, and the last rename to complete wins.

use crate::models::{bucket::Bucket, object::Object};
use crate::services::byte_range::ByteRange;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{
    collections::HashSet,
    fs::Metadata,
    io::{self, ErrorKind, SeekFrom},
    ops::Range,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, Take},
};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct ListObjectsParams {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub continuation_token: Option<String>,
    pub start_after: Option<String>,
    pub max_keys: usize,
}

#[derive(Debug)]
pub struct ListObjectsResult {
    pub objects: Vec<Object>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
    pub key_count: usize,
}

/// An opened object positioned at the start of the requested window.
#[derive(Debug)]
pub struct ObjectReader {
    pub object: Object,
    /// Content limited to the window (or the whole file).
    pub body: Take<File>,
    /// Resolved `[start, end)` window; `None` for a whole-object read.
    pub window: Option<Range<u64>>,
}

impl ObjectReader {
    pub fn content_length(&self) -> u64 {
        self.window
            .as_ref()
            .map(|w| w.end - w.start)
            .unwrap_or(self.object.size_bytes)
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` does not exist")]
    NoSuchBucket(String),
    #[error("bucket `{0}` is not empty")]
    BucketNotEmpty(String),
    #[error("bucket name `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: &'static str },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NoSuchKey { bucket: String, key: String },
    #[error("object key `{key}` invalid: {reason}")]
    InvalidObjectKey { key: String, reason: &'static str },
    #[error("requested range not satisfiable for object of {size} bytes")]
    RangeNotSatisfiable { size: u64 },
    #[error("received {received} bytes, expected {expected}")]
    IncompleteBody { expected: u64, received: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// StorageService provides the S3-like operations over `base_path`:
/// - bucket listing, creation and deletion (directories under the root)
/// - streaming uploads with atomic replace and inline MD5
/// - whole and ranged reads, metadata-only reads
/// - ListObjectsV2 with prefix, delimiter and pagination
///
/// The struct is a cheap handle; clone it freely into request handlers.
#[derive(Clone, Debug)]
pub struct StorageService {
    /// Root directory; every subdirectory is a bucket.
    pub base_path: PathBuf,
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
const SCRATCH_SUFFIX: &str = ".tmp";
const HASH_BUF_SIZE: usize = 64 * 1024;
pub const MAX_KEYS_LIMIT: usize = 1000;

impl StorageService {
    /// Create a new StorageService rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Reject keys that would escape the bucket directory or cannot be
    /// represented as a relative path.
    ///
    /// Every `/`-separated segment must be a plain, non-empty file name.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        let invalid = |reason| {
            Err(StorageError::InvalidObjectKey {
                key: key.to_string(),
                reason,
            })
        };
        if key.is_empty() {
            return invalid("must not be empty");
        }
        if key.len() > MAX_OBJECT_KEY_LEN {
            return invalid("must be at most 1024 bytes");
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return invalid("contains control characters or backslashes");
        }
        if key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return invalid("contains empty, `.` or `..` path segments");
        }
        if key.rsplit('/').next().is_some_and(is_scratch_name) {
            return invalid("collides with upload scratch file naming");
        }
        Ok(())
    }

    /// Bucket names map one-to-one onto a single directory name.
    fn ensure_bucket_name_safe(&self, name: &str) -> StorageResult<()> {
        let invalid = |reason| {
            Err(StorageError::InvalidBucketName {
                name: name.to_string(),
                reason,
            })
        };
        if name.is_empty() {
            return invalid("must not be empty");
        }
        if name == "." || name == ".." {
            return invalid("must not be a relative path component");
        }
        if name.contains(['/', '\\', '\0']) {
            return invalid("must not contain path separators");
        }
        Ok(())
    }

    /// Compute the directory path for a bucket.
    ///
    /// This does not check for existence.
    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Construct the file path for an object: base_path/bucket/seg/seg/...
    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let mut path = self.bucket_root(bucket_name);
        path.extend(key.split('/'));
        path
    }

    /// Verify the bucket directory exists, returning its path.
    async fn existing_bucket(&self, bucket: &str) -> StorageResult<PathBuf> {
        self.ensure_bucket_name_safe(bucket)?;
        let root = self.bucket_root(bucket);
        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => Ok(root),
            Ok(_) => Err(StorageError::NoSuchBucket(bucket.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StorageError::NoSuchBucket(bucket.to_string()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// List every directory under the root, sorted by name.
    ///
    /// Entries that cannot be stat'ed (e.g. removed concurrently) are skipped.
    pub async fn list_buckets(&self) -> StorageResult<Vec<Bucket>> {
        let mut entries = fs::read_dir(&self.base_path).await?;
        let mut buckets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                debug!("skipping non UTF-8 bucket directory {:?}", entry.path());
                continue;
            };
            let meta = match fs::metadata(entry.path()).await {
                Ok(meta) => meta,
                Err(err) => {
                    debug!("skipping bucket {}: {}", name, err);
                    continue;
                }
            };
            if !meta.is_dir() {
                continue;
            }
            buckets.push(Bucket {
                name,
                created_at: modified_at(&meta),
            });
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    /// Create the bucket directory. Idempotent.
    pub async fn make_bucket(&self, name: &str) -> StorageResult<()> {
        self.ensure_bucket_name_safe(name)?;
        fs::create_dir_all(self.bucket_root(name)).await?;
        Ok(())
    }

    /// Delete a bucket that holds no files.
    ///
    /// The subtree walk stops at the first file found. Leftover empty
    /// directories are removed deepest-first with `remove_dir`, so a file
    /// landing concurrently makes the delete fail instead of destroying it.
    pub async fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        let root = self.existing_bucket(name).await?;
        let Some(dirs) = empty_subtree(&root).await? else {
            return Err(StorageError::BucketNotEmpty(name.to_string()));
        };

        for dir in dirs.iter().rev() {
            match fs::remove_dir(dir).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => {
                    return Err(StorageError::BucketNotEmpty(name.to_string()));
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }
        Ok(())
    }

    /// Stream-upload an object, creating the bucket if needed.
    ///
    /// - Writes chunks to a scratch file next to the final path while feeding
    ///   the same chunks into the MD5 context (single pass, no buffering).
    /// - Flushes and fsyncs, then renames onto the final path.
    /// - Removes the scratch file on any failure before the rename.
    ///
    /// When `declared_len` is known, a short or long body is rejected.
    pub async fn put_object_stream<S>(
        &self,
        bucket: &str,
        key: &str,
        declared_len: Option<u64>,
        stream: S,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.ensure_key_safe(key)?;
        self.make_bucket(bucket).await?;

        let file_path = self.object_path(bucket, key);
        let tmp_path = scratch_path(&file_path);
        let (file, parent) = create_scratch(&file_path, &tmp_path).await?;
        debug!("writing {} via {}", file_path.display(), parent.display());

        let (etag, size_bytes) = match write_scratch(file, stream, declared_len).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        let meta = fs::metadata(&file_path).await?;
        Ok(Object {
            key: key.to_string(),
            size_bytes,
            etag,
            last_modified: modified_at(&meta),
        })
    }

    /// Open an object for reading, optionally restricted to a byte range.
    ///
    /// The ETag always covers the full file: the handle is read to the end
    /// for hashing and then repositioned at the window start, so the hash and
    /// the streamed bytes come from the same file version.
    pub async fn get_object_reader(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> StorageResult<ObjectReader> {
        self.ensure_key_safe(key)?;
        self.existing_bucket(bucket).await?;
        let (mut file, meta) = self.open_object(bucket, key).await?;

        let size = meta.len();
        let etag = md5_hex(&mut file).await?;
        let window = match range {
            Some(range) => Some(
                range
                    .resolve(size)
                    .ok_or(StorageError::RangeNotSatisfiable { size })?,
            ),
            None => None,
        };
        let (start, len) = match &window {
            Some(w) => (w.start, w.end - w.start),
            None => (0, size),
        };
        file.seek(SeekFrom::Start(start)).await?;

        Ok(ObjectReader {
            object: Object {
                key: key.to_string(),
                size_bytes: size,
                etag,
                last_modified: modified_at(&meta),
            },
            body: file.take(len),
            window,
        })
    }

    /// Fetch only object metadata.
    ///
    /// There is no stored digest, so this still reads the full file.
    pub async fn get_object_metadata(&self, bucket: &str, key: &str) -> StorageResult<Object> {
        self.ensure_key_safe(key)?;
        self.existing_bucket(bucket).await?;
        let (mut file, meta) = self.open_object(bucket, key).await?;
        let etag = md5_hex(&mut file).await?;
        Ok(Object {
            key: key.to_string(),
            size_bytes: meta.len(),
            etag,
            last_modified: modified_at(&meta),
        })
    }

    /// Remove an object and prune the directories it leaves empty.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        let bucket_root = self.existing_bucket(bucket).await?;
        let file_path = self.object_path(bucket, key);

        let not_found = || StorageError::NoSuchKey {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        match fs::symlink_metadata(&file_path).await {
            Ok(meta) if meta.is_dir() => return Err(not_found()),
            Ok(_) => {}
            Err(err) if is_not_found(&err) => return Err(not_found()),
            Err(err) => return Err(StorageError::Io(err)),
        }
        match fs::remove_file(&file_path).await {
            Ok(()) => debug!("removed {}", file_path.display()),
            Err(err) if is_not_found(&err) => return Err(not_found()),
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            prune_empty_dirs(parent, &bucket_root).await;
        }
        Ok(())
    }

    /// List objects following S3 ListObjectsV2 rules.
    ///
    /// Walks the whole bucket, keeps keys under `prefix`, and sorts them; that
    /// total order is what continuation tokens index into. The page starts
    /// after the continuation token, then after `start_after`, and holds at
    /// most `max_keys` entries. With a delimiter, entries whose remainder
    /// (after the prefix) contains it collapse into common prefixes.
    ///
    /// ETags are computed only for entries returned in `objects`.
    pub async fn list_objects_v2(
        &self,
        bucket: &str,
        params: ListObjectsParams,
    ) -> StorageResult<ListObjectsResult> {
        let root = self.existing_bucket(bucket).await?;
        let prefix = params.prefix.as_deref().unwrap_or("");

        let mut entries: Vec<(String, PathBuf, Metadata)> = walk_files(&root)
            .await?
            .into_iter()
            .filter_map(|(path, meta)| {
                let key = relative_key(&root, &path)?;
                key.starts_with(prefix).then_some((key, path, meta))
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut start = 0;
        if let Some(token) = non_empty(&params.continuation_token) {
            start = entries.partition_point(|(key, ..)| key.as_str() <= token);
        }
        if let Some(after) = non_empty(&params.start_after) {
            start = start.max(entries.partition_point(|(key, ..)| key.as_str() <= after));
        }
        let end = start.saturating_add(params.max_keys).min(entries.len());
        let page = &entries[start..end];

        let is_truncated = end < entries.len();
        let next_continuation_token = if is_truncated {
            page.last().map(|(key, ..)| key.clone())
        } else {
            None
        };

        let delimiter = non_empty(&params.delimiter);
        let mut contents = Vec::new();
        let mut common_prefixes = Vec::new();
        let mut seen = HashSet::new();
        for (key, path, meta) in page {
            if let Some(delim) = delimiter {
                if let Some(group) = compute_common_prefix(key, prefix, delim) {
                    if seen.insert(group.clone()) {
                        common_prefixes.push(group);
                    }
                    continue;
                }
            }
            let etag = match md5_hex_of_path(path).await {
                Ok(etag) => etag,
                Err(err) if is_not_found(&err) => {
                    debug!("{} vanished during listing", path.display());
                    continue;
                }
                Err(err) => return Err(StorageError::Io(err)),
            };
            contents.push(Object {
                key: key.clone(),
                size_bytes: meta.len(),
                etag,
                last_modified: modified_at(meta),
            });
        }

        let key_count = contents.len() + common_prefixes.len();
        Ok(ListObjectsResult {
            objects: contents,
            common_prefixes,
            is_truncated,
            next_continuation_token,
            key_count,
        })
    }

    /// Open an object file, treating directories and broken intermediate
    /// paths as a missing key.
    async fn open_object(&self, bucket: &str, key: &str) -> StorageResult<(File, Metadata)> {
        let not_found = || StorageError::NoSuchKey {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        let file = File::open(self.object_path(bucket, key))
            .await
            .map_err(|err| {
                if is_not_found(&err) {
                    not_found()
                } else {
                    StorageError::Io(err)
                }
            })?;
        let meta = file.metadata().await?;
        if meta.is_dir() {
            return Err(not_found());
        }
        Ok((file, meta))
    }
}

/// Create the scratch file, recreating the parent directory once if a
/// concurrent delete pruned it in between.
async fn create_scratch(file_path: &Path, tmp_path: &Path) -> StorageResult<(File, PathBuf)> {
    let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
        StorageError::Io(io::Error::new(
            ErrorKind::Other,
            "object path missing parent directory",
        ))
    })?;
    fs::create_dir_all(&parent).await?;
    match File::create(tmp_path).await {
        Ok(file) => Ok((file, parent)),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(&parent).await?;
            Ok((File::create(tmp_path).await?, parent))
        }
        Err(err) => Err(StorageError::Io(err)),
    }
}

/// Copy the body into `file`, hashing as it goes. Returns (etag, size).
async fn write_scratch<S>(
    mut file: File,
    stream: S,
    declared_len: Option<u64>,
) -> StorageResult<(String, u64)>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut size_bytes: u64 = 0;
    let mut digest = Context::new();
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as u64;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;

    if let Some(expected) = declared_len {
        if expected != size_bytes {
            return Err(StorageError::IncompleteBody {
                expected,
                received: size_bytes,
            });
        }
    }
    Ok((format!("{:x}", digest.compute()), size_bytes))
}

/// `<final name>.<uuid>.tmp` in the same directory as the final path.
fn scratch_path(file_path: &Path) -> PathBuf {
    let name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    file_path.with_file_name(format!(
        "{}.{}{}",
        name,
        Uuid::new_v4().simple(),
        SCRATCH_SUFFIX
    ))
}

fn is_scratch_name(name: &str) -> bool {
    name.strip_suffix(SCRATCH_SUFFIX)
        .and_then(|stem| stem.rsplit_once('.'))
        .is_some_and(|(_, id)| id.len() == 32 && id.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Depth-first walk that stops at the first non-directory entry.
///
/// Returns every directory visited (parents before children) when the
/// subtree holds no files, `None` otherwise.
async fn empty_subtree(root: &Path) -> io::Result<Option<Vec<PathBuf>>> {
    let mut visited = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        visited.push(dir);
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                stack.push(entry.path());
            } else {
                return Ok(None);
            }
        }
    }
    Ok(Some(visited))
}

/// Collect every non-directory entry below `root`, skipping upload scratch
/// files and directories removed while walking.
async fn walk_files(root: &Path) -> io::Result<Vec<(PathBuf, Metadata)>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                stack.push(path);
                continue;
            }
            if entry.file_name().to_str().is_some_and(is_scratch_name) {
                continue;
            }
            match fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => files.push((path, meta)),
                Ok(_) => {}
                Err(err) => debug!("skipping {}: {}", path.display(), err),
            }
        }
    }
    Ok(files)
}

/// Relative path below `root` as a forward-slash key.
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let segments = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(segments.join("/"))
}

/// Remove `start` and then each parent in turn while they are empty.
///
/// `stop` (the bucket directory) is never removed. The walk ends at the first
/// directory that is missing, still populated, or otherwise not removable.
async fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut dir = Some(start);
    while let Some(current) = dir.filter(|d| d.starts_with(stop) && *d != stop) {
        if let Err(err) = fs::remove_dir(current).await {
            if !matches!(err.kind(), ErrorKind::NotFound | ErrorKind::DirectoryNotEmpty) {
                debug!("failed to prune directory {}: {}", current.display(), err);
            }
            break;
        }
        dir = current.parent();
    }
}

/// Compute a "common prefix" for S3 list semantics.
///
/// `key` is known to start with `prefix`. Returns the prefix plus the
/// remainder up to and including the first delimiter, if there is one.
fn compute_common_prefix(key: &str, prefix: &str, delimiter: &str) -> Option<String> {
    let after_prefix = key.strip_prefix(prefix)?;
    let pos = after_prefix.find(delimiter)?;
    Some(format!(
        "{}{}",
        prefix,
        &after_prefix[..pos + delimiter.len()]
    ))
}

async fn md5_hex<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<String> {
    let mut digest = Context::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        digest.consume(&buf[..n]);
    }
    Ok(format!("{:x}", digest.compute()))
}

async fn md5_hex_of_path(path: &Path) -> io::Result<String> {
    let mut file = File::open(path).await?;
    md5_hex(&mut file).await
}

fn modified_at(meta: &Metadata) -> DateTime<Utc> {
    meta.modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::from(UNIX_EPOCH))
}

fn is_not_found(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
