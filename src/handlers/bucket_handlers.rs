//! Service- and bucket-level handlers: list buckets, create/delete a bucket,
//! and ListObjectsV2.

use crate::{
    errors::{AppError, ErrorCode},
    handlers::{
        extract::{S3Path, S3Query},
        xml, xml_response,
    },
    services::storage_service::{ListObjectsParams, MAX_KEYS_LIMIT, StorageService},
};
use axum::{
    extract::{RawQuery, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;

/// Query params accepted by ListObjectsV2.
///
/// Everything is taken as text so that odd values fall back to defaults
/// instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct ListObjectsV2Query {
    #[serde(rename = "list-type")]
    pub list_type: Option<String>,
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    #[serde(rename = "max-keys")]
    pub max_keys: Option<String>,
    #[serde(rename = "continuation-token")]
    pub continuation_token: Option<String>,
    #[serde(rename = "start-after")]
    pub start_after: Option<String>,
}

impl ListObjectsV2Query {
    fn into_params(self) -> ListObjectsParams {
        let max_keys = self
            .max_keys
            .as_deref()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(MAX_KEYS_LIMIT)
            .min(MAX_KEYS_LIMIT);
        ListObjectsParams {
            prefix: non_empty(self.prefix),
            delimiter: non_empty(self.delimiter),
            continuation_token: non_empty(self.continuation_token),
            start_after: non_empty(self.start_after),
            max_keys,
        }
    }
}

/// GET `/` — list buckets.
pub async fn list_buckets(State(service): State<StorageService>) -> Result<Response, AppError> {
    let buckets = service.list_buckets().await?;
    info!(count = buckets.len(), "LIST BUCKETS");
    Ok(xml_response(
        StatusCode::OK,
        xml::list_buckets_document(&buckets),
    ))
}

/// PUT `/{bucket}` — create bucket. Succeeds if it already exists.
pub async fn create_bucket(
    State(service): State<StorageService>,
    S3Path(bucket): S3Path<String>,
) -> Result<impl IntoResponse, AppError> {
    service.make_bucket(&bucket).await?;
    info!(bucket = %bucket, "BUCKET PUT");

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/{bucket}")) {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::OK, headers))
}

/// DELETE `/{bucket}` — delete an empty bucket.
pub async fn delete_bucket(
    State(service): State<StorageService>,
    S3Path(bucket): S3Path<String>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_bucket(&bucket).await?;
    info!(bucket = %bucket, "BUCKET DELETE");
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/{bucket}` — ListObjectsV2.
///
/// A bare `GET /{bucket}` lists with defaults; any query string must select
/// `list-type=2`, other listing styles are not implemented.
pub async fn list_objects(
    State(service): State<StorageService>,
    S3Path(bucket): S3Path<String>,
    RawQuery(raw_query): RawQuery,
    S3Query(q): S3Query<ListObjectsV2Query>,
) -> Result<Response, AppError> {
    let has_query = raw_query.is_some_and(|q| !q.is_empty());
    if has_query && q.list_type.as_deref() != Some("2") {
        return Err(
            AppError::new(ErrorCode::NotImplemented, "only list-type=2 is supported")
                .with_resource(format!("/{bucket}")),
        );
    }

    let params = q.into_params();
    let result = service.list_objects_v2(&bucket, params.clone()).await?;
    info!(
        bucket = %bucket,
        prefix = ?params.prefix,
        delimiter = ?params.delimiter,
        start_after = ?params.start_after,
        continuation_token = ?params.continuation_token,
        max_keys = params.max_keys,
        returned = result.key_count,
        "LIST"
    );

    Ok(xml_response(
        StatusCode::OK,
        xml::list_objects_v2_document(&bucket, &params, &result),
    ))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
