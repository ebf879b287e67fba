//! HTTP handlers for the path-style S3 surface.

pub mod bucket_handlers;
pub mod extract;
pub mod object_handlers;
pub mod xml;

use crate::errors::{AppError, ErrorCode};
use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, Uri, header},
    response::Response,
};
use chrono::{DateTime, Utc};

/// Method fallback for every route: the verb is not supported on this resource.
pub async fn method_not_allowed(uri: Uri) -> AppError {
    AppError::method_not_allowed().with_resource(uri.path())
}

/// Router fallback for paths that address neither a bucket nor an object,
/// such as `/bucket/` with an empty key.
pub async fn no_such_resource(uri: Uri) -> AppError {
    AppError::new(ErrorCode::NoSuchKey, "no bucket or object at this path")
        .with_resource(uri.path())
}

/// IMF-fixdate, as used by `Last-Modified`.
pub(crate) fn http_date(ts: &DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub(crate) fn xml_response(status: StatusCode, xml: String) -> Response {
    let mut response = Response::new(Body::from(xml));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    response
}
