//! HTTP handlers for object operations.
//! Streams object bodies in both directions and delegates filesystem
//! concerns to `StorageService`.

use crate::{
    errors::AppError,
    handlers::{extract::S3Path, http_date},
    models::object::Object,
    services::{
        byte_range::{ByteRange, RangeError},
        storage_service::StorageService,
    },
};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use futures::StreamExt;
use std::io;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

/// PUT `/{bucket}/{*key}` — upload an object, creating the bucket if needed.
pub async fn upload_object(
    State(service): State<StorageService>,
    S3Path((bucket, key)): S3Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    if let Err(err) = service.make_bucket(&bucket).await {
        debug!("best-effort create of bucket {} failed: {}", bucket, err);
    }

    let declared_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(|err| io::Error::new(io::ErrorKind::Other, err)));

    let object = service
        .put_object_stream(&bucket, &key, declared_len, stream)
        .await?;
    info!(
        bucket = %bucket,
        key = %key,
        size = object.size_bytes,
        etag = %object.etag,
        "PUT"
    );

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    insert_header(response.headers_mut(), header::ETAG, &object.quoted_etag());
    insert_header(
        response.headers_mut(),
        header::LAST_MODIFIED,
        &http_date(&object.last_modified),
    );
    Ok(response)
}

/// GET `/{bucket}/{*key}` — stream the object, or a single byte range of it.
pub async fn get_object(
    State(service): State<StorageService>,
    S3Path((bucket, key)): S3Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let range = match headers.get(header::RANGE) {
        Some(value) => {
            let text = value.to_str().map_err(|_| {
                RangeError::Malformed(String::from_utf8_lossy(value.as_bytes()).into_owned())
            })?;
            ByteRange::parse_header(Some(text))?
        }
        None => None,
    };

    let reader = service.get_object_reader(&bucket, &key, range).await?;
    let length = reader.content_length();
    let object = reader.object.clone();
    let content_range = range.and_then(|r| r.content_range(object.size_bytes));

    let mut response = Response::new(Body::from_stream(ReaderStream::new(reader.body)));
    set_object_headers(response.headers_mut(), &object, length);
    match content_range {
        Some(value) => {
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            insert_header(response.headers_mut(), header::CONTENT_RANGE, &value);
        }
        None => *response.status_mut() = StatusCode::OK,
    }

    info!(
        bucket = %bucket,
        key = %key,
        size = object.size_bytes,
        etag = %object.etag,
        sent = length,
        "GET"
    );
    Ok(response)
}

/// HEAD `/{bucket}/{*key}` — same headers as GET but no body.
pub async fn head_object(
    State(service): State<StorageService>,
    S3Path((bucket, key)): S3Path<(String, String)>,
) -> Result<Response, AppError> {
    let object = service.get_object_metadata(&bucket, &key).await?;
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &object, object.size_bytes);
    Ok(response)
}

/// DELETE `/{bucket}/{*key}` — remove the object.
pub async fn delete_object(
    State(service): State<StorageService>,
    S3Path((bucket, key)): S3Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    service.delete_object(&bucket, &key).await?;
    info!(bucket = %bucket, key = %key, "DELETE");
    Ok(StatusCode::NO_CONTENT)
}

fn set_object_headers(headers: &mut HeaderMap, meta: &Object, content_length: u64) {
    let content_type = mime_guess::from_path(&meta.key).first_or_octet_stream();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type.as_ref())
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    insert_header(headers, header::ETAG, &meta.quoted_etag());
    insert_header(headers, header::LAST_MODIFIED, &http_date(&meta.last_modified));
}

fn insert_header(headers: &mut HeaderMap, name: header::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
