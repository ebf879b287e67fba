//! Path and query extractors whose rejections render as S3 error documents.

use crate::errors::{AppError, ErrorCode};
use axum::{
    extract::{FromRequestParts, Path, Query},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

/// `Path<T>` that rejects with `InvalidArgument` instead of plain text.
#[derive(Debug)]
pub struct S3Path<T>(pub T);

impl<T, S> FromRequestParts<S> for S3Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let resource = parts.uri.path().to_string();
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(
                AppError::new(ErrorCode::InvalidArgument, rejection.body_text())
                    .with_resource(resource),
            ),
        }
    }
}

/// `Query<T>` that rejects with `InvalidArgument` instead of plain text.
#[derive(Debug)]
pub struct S3Query<T>(pub T);

impl<T, S> FromRequestParts<S> for S3Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let resource = parts.uri.path().to_string();
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(
                AppError::new(ErrorCode::InvalidArgument, rejection.body_text())
                    .with_resource(resource),
            ),
        }
    }
}
