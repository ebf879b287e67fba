use crate::{
    handlers::xml,
    services::{byte_range::RangeError, storage_service::StorageError},
};
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::fmt;
use tracing::{error, warn};
use uuid::Uuid;

/// Machine-readable error codes carried in the `<Error>` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NoSuchBucket,
    NoSuchKey,
    BucketNotEmpty,
    InvalidBucketName,
    InvalidArgument,
    InvalidRange,
    IncompleteBody,
    NotImplemented,
    MethodNotAllowed,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSuchBucket => "NoSuchBucket",
            Self::NoSuchKey => "NoSuchKey",
            Self::BucketNotEmpty => "BucketNotEmpty",
            Self::InvalidBucketName => "InvalidBucketName",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidRange => "InvalidRange",
            Self::IncompleteBody => "IncompleteBody",
            Self::NotImplemented => "NotImplemented",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::InternalError => "InternalError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoSuchBucket | Self::NoSuchKey => StatusCode::NOT_FOUND,
            Self::BucketNotEmpty => StatusCode::CONFLICT,
            Self::InvalidBucketName | Self::InvalidArgument | Self::IncompleteBody => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidRange => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// An error on its way out as an S3 `<Error>` document.
#[derive(Debug)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub resource: Option<String>,
}

impl AppError {
    /// Create a new AppError with a specific code and message.
    pub fn new(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            resource: None,
        }
    }

    /// Attach the request path the error refers to.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, msg)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(
            ErrorCode::MethodNotAllowed,
            "The specified method is not allowed against this resource.",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.code.status_code()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code.as_str(), request_id = %request_id, "{}", self.message);
        } else {
            warn!(code = self.code.as_str(), request_id = %request_id, "{}", self.message);
        }

        let body = xml::error_document(
            self.code.as_str(),
            &self.message,
            self.resource.as_deref(),
            &request_id,
        );
        let mut response = (status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/xml"),
        );
        headers.insert("x-amz-error-code", HeaderValue::from_static(self.code.as_str()));
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            headers.insert("x-amz-request-id", value);
        }
        response
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match err {
            StorageError::NoSuchBucket(bucket) => {
                AppError::new(ErrorCode::NoSuchBucket, message).with_resource(format!("/{bucket}"))
            }
            StorageError::BucketNotEmpty(bucket) => AppError::new(ErrorCode::BucketNotEmpty, message)
                .with_resource(format!("/{bucket}")),
            StorageError::NoSuchKey { bucket, key } => {
                AppError::new(ErrorCode::NoSuchKey, message).with_resource(format!("/{bucket}/{key}"))
            }
            StorageError::InvalidBucketName { .. } => {
                AppError::new(ErrorCode::InvalidBucketName, message)
            }
            StorageError::InvalidObjectKey { .. } => AppError::new(ErrorCode::InvalidArgument, message),
            StorageError::RangeNotSatisfiable { .. } => AppError::new(ErrorCode::InvalidRange, message),
            StorageError::IncompleteBody { .. } => AppError::new(ErrorCode::IncompleteBody, message),
            StorageError::Io(_) => AppError::internal(message),
        }
    }
}

impl From<RangeError> for AppError {
    fn from(err: RangeError) -> Self {
        AppError::new(ErrorCode::InvalidRange, err.to_string())
    }
}
