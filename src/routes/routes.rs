//! Defines path-style routes for bucket and object operations.
//!
//! ## Structure
//! - **Service endpoint**
//!   - `GET    /` — list buckets
//!
//! - **Bucket-level endpoints**
//!   - `GET    /{bucket}` — list objects (ListObjectsV2)
//!   - `PUT    /{bucket}` — create bucket
//!   - `DELETE /{bucket}` — delete empty bucket
//!
//! - **Object-level endpoints**
//!   - `PUT    /{bucket}/{*key}` — upload object
//!   - `GET    /{bucket}/{*key}` — download object (optionally ranged)
//!   - `HEAD   /{bucket}/{*key}` — retrieve metadata only
//!   - `DELETE /{bucket}/{*key}` — delete object
//!
//! Any other verb on a route answers 405 with an S3 error document. HEAD is
//! listed explicitly where unsupported because axum would otherwise serve it
//! from the GET handler.
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        bucket_handlers::{create_bucket, delete_bucket, list_buckets, list_objects},
        method_not_allowed, no_such_resource,
        object_handlers::{delete_object, get_object, head_object, upload_object},
    },
    services::storage_service::StorageService,
};
use axum::{
    Router,
    routing::{get, put},
};

/// Build and return the router for all S3-compatible routes.
///
/// The router carries shared state (`StorageService`) to all handlers.
pub fn routes() -> Router<StorageService> {
    Router::new()
        .route(
            "/",
            get(list_buckets)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        // Object-level routes
        .route(
            "/{bucket}/{*key}",
            put(upload_object)
                .get(get_object)
                .head(head_object)
                .delete(delete_object)
                .fallback(method_not_allowed),
        )
        // Bucket-level routes
        .route(
            "/{bucket}",
            get(list_objects)
                .put(create_bucket)
                .delete(delete_bucket)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .fallback(no_such_resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, Bytes, to_bytes},
        http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header},
    };
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    const HELLO_MD5: &str = "b1946ac92492d2347c6235b4d2611184";

    fn app() -> (TempDir, Router) {
        let dir = tempdir().unwrap();
        let router = routes().with_state(StorageService::new(dir.path()));
        (dir, router)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn ranged(uri: &str, range: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::RANGE, range)
            .body(Body::empty())
            .unwrap()
    }

    async fn put_object(app: &Router, uri: &str, data: &'static [u8]) -> HeaderMap {
        let req = Request::builder()
            .method(Method::PUT)
            .uri(uri)
            .header(header::CONTENT_LENGTH, data.len().to_string())
            .body(Body::from(data))
            .unwrap();
        let (status, headers, _) = send(app, req).await;
        assert_eq!(status, StatusCode::OK, "PUT {uri}");
        headers
    }

    fn text(body: &Bytes) -> &str {
        std::str::from_utf8(body).unwrap()
    }

    #[tokio::test]
    async fn put_and_head_report_content_hash() {
        let (_dir, app) = app();
        let headers = put_object(&app, "/mybucket/hello.txt", b"hello\n").await;
        assert_eq!(headers[header::ETAG], format!("\"{HELLO_MD5}\""));
        assert!(headers[header::LAST_MODIFIED].to_str().unwrap().ends_with("GMT"));

        let (status, headers, body) =
            send(&app, request(Method::HEAD, "/mybucket/hello.txt")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert_eq!(headers[header::CONTENT_LENGTH], "6");
        assert_eq!(headers[header::ETAG], format!("\"{HELLO_MD5}\""));
        assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
    }

    #[tokio::test]
    async fn get_streams_whole_object_with_metadata() {
        let (_dir, app) = app();
        put_object(&app, "/docs/notes/readme.txt", b"hello\n").await;

        let (status, headers, body) =
            send(&app, request(Method::GET, "/docs/notes/readme.txt")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"hello\n");
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(headers[header::CONTENT_LENGTH], "6");
        assert!(headers.get(header::CONTENT_RANGE).is_none());

        put_object(&app, "/docs/blob", b"\x00\x01").await;
        let (_, headers, _) = send(&app, request(Method::GET, "/docs/blob")).await;
        assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
    }

    #[tokio::test]
    async fn ranged_get_returns_partial_content() {
        let (_dir, app) = app();
        put_object(&app, "/b/hello.txt", b"hello\n").await;

        let (status, headers, body) = send(&app, ranged("/b/hello.txt", "bytes=0-5")).await;
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(headers[header::CONTENT_RANGE], "bytes 0-5/6");
        assert_eq!(&body[..], b"hello\n");
        assert_eq!(headers[header::ETAG], format!("\"{HELLO_MD5}\""));

        let (status, headers, body) = send(&app, ranged("/b/hello.txt", "bytes=-100")).await;
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(headers[header::CONTENT_RANGE], "bytes 0-5/6");
        assert_eq!(&body[..], b"hello\n");

        let (status, headers, body) = send(&app, ranged("/b/hello.txt", "bytes=1-3")).await;
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(headers[header::CONTENT_RANGE], "bytes 1-3/6");
        assert_eq!(headers[header::CONTENT_LENGTH], "3");
        assert_eq!(&body[..], b"ell");
    }

    #[tokio::test]
    async fn bad_ranges_are_not_satisfiable() {
        let (_dir, app) = app();
        put_object(&app, "/b/hello.txt", b"hello\n").await;

        for range in ["bytes=5-1", "bytes=0-1,3-4", "lines=1-2", "bytes=6-"] {
            let (status, headers, body) = send(&app, ranged("/b/hello.txt", range)).await;
            assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE, "{range}");
            assert_eq!(headers["x-amz-error-code"], "InvalidRange");
            assert!(text(&body).contains("<Code>InvalidRange</Code>"));
        }
    }

    #[tokio::test]
    async fn missing_objects_and_buckets_are_404() {
        let (_dir, app) = app();
        let (status, _, body) = send(&app, request(Method::GET, "/nobucket/key")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(text(&body).contains("<Code>NoSuchBucket</Code>"));

        put_object(&app, "/b/present", b"x").await;
        let (status, headers, body) = send(&app, request(Method::HEAD, "/b/absent")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(headers["x-amz-error-code"], "NoSuchKey");
        assert!(body.is_empty());

        let (status, _, body) = send(&app, request(Method::GET, "/b/absent")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let body = text(&body);
        assert!(body.contains("<Code>NoSuchKey</Code>"));
        assert!(body.contains("<Resource>/b/absent</Resource>"));
    }

    #[tokio::test]
    async fn bucket_lifecycle() {
        let (_dir, app) = app();
        for name in ["zebra", "apple"] {
            let (status, headers, _) = send(&app, request(Method::PUT, &format!("/{name}"))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(headers[header::LOCATION], format!("/{name}"));
        }

        let (status, headers, body) = send(&app, request(Method::GET, "/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/xml");
        let body = text(&body);
        let apple = body.find("<Name>apple</Name>").unwrap();
        let zebra = body.find("<Name>zebra</Name>").unwrap();
        assert!(apple < zebra);

        put_object(&app, "/apple/deep/seed", b"x").await;
        let (status, _, body) = send(&app, request(Method::DELETE, "/apple")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(text(&body).contains("<Code>BucketNotEmpty</Code>"));

        let (status, _, _) = send(&app, request(Method::DELETE, "/apple/deep/seed")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _, _) = send(&app, request(Method::DELETE, "/apple/deep/seed")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = send(&app, request(Method::DELETE, "/apple")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, _, body) = send(&app, request(Method::GET, "/")).await;
        assert!(!text(&body).contains("<Name>apple</Name>"));
    }

    #[tokio::test]
    async fn list_objects_v2_with_delimiter() {
        let (_dir, app) = app();
        for key in ["a/b.txt", "a/c/d.txt", "a/c/e.txt"] {
            put_object(&app, &format!("/b/{key}"), b"x").await;
        }

        let (status, _, body) = send(
            &app,
            request(Method::GET, "/b?list-type=2&prefix=a%2F&delimiter=%2F"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = text(&body);
        assert!(body.contains("<Key>a/b.txt</Key>"));
        assert!(!body.contains("<Key>a/c/d.txt</Key>"));
        assert_eq!(body.matches("<CommonPrefixes>").count(), 1);
        assert!(body.contains("<CommonPrefixes><Prefix>a/c/</Prefix></CommonPrefixes>"));
        assert!(body.contains("<KeyCount>2</KeyCount>"));
        assert!(body.contains("<IsTruncated>false</IsTruncated>"));
    }

    #[tokio::test]
    async fn list_objects_v2_paginates() {
        let (_dir, app) = app();
        for key in ["k1", "k2", "k3"] {
            put_object(&app, &format!("/b/{key}"), b"x").await;
        }

        let (_, _, body) = send(&app, request(Method::GET, "/b?list-type=2&max-keys=1")).await;
        let body = text(&body);
        assert!(body.contains("<Key>k1</Key>"));
        assert!(body.contains("<IsTruncated>true</IsTruncated>"));
        assert!(body.contains("<NextContinuationToken>k1</NextContinuationToken>"));

        let (_, _, body) = send(
            &app,
            request(Method::GET, "/b?list-type=2&max-keys=1&continuation-token=k2"),
        )
        .await;
        let body = text(&body);
        assert!(body.contains("<ContinuationToken>k2</ContinuationToken>"));
        assert!(body.contains("<Key>k3</Key>"));
        assert!(body.contains("<IsTruncated>false</IsTruncated>"));
        assert!(!body.contains("<NextContinuationToken>"));
    }

    #[tokio::test]
    async fn only_list_type_2_is_implemented() {
        let (_dir, app) = app();
        send(&app, request(Method::PUT, "/b")).await;

        let (status, _, body) = send(&app, request(Method::GET, "/b?prefix=x")).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert!(text(&body).contains("<Code>NotImplemented</Code>"));

        let (status, _, _) = send(&app, request(Method::GET, "/b?list-type=1")).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

        let (status, _, _) = send(&app, request(Method::GET, "/b")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, body) = send(&app, request(Method::GET, "/missing?list-type=2")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(text(&body).contains("<Code>NoSuchBucket</Code>"));
    }

    #[tokio::test]
    async fn unsupported_methods_are_405() {
        let (_dir, app) = app();
        put_object(&app, "/b/k", b"x").await;

        for (method, uri) in [
            (Method::POST, "/"),
            (Method::HEAD, "/"),
            (Method::POST, "/b"),
            (Method::HEAD, "/b"),
            (Method::PATCH, "/b/k"),
            (Method::POST, "/b/k"),
        ] {
            let (status, headers, _) = send(&app, request(method.clone(), uri)).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method} {uri}");
            assert_eq!(headers["x-amz-error-code"], "MethodNotAllowed");
        }
    }

    #[tokio::test]
    async fn undecodable_path_or_query_is_invalid_argument() {
        let (_dir, app) = app();
        send(&app, request(Method::PUT, "/b")).await;

        for uri in ["/b?list-type=2&prefix=a&prefix=b", "/b/%FF%FE"] {
            let (status, headers, body) = send(&app, request(Method::GET, uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(headers[header::CONTENT_TYPE], "application/xml");
            assert_eq!(headers["x-amz-error-code"], "InvalidArgument");
            assert!(text(&body).contains("<Code>InvalidArgument</Code>"));
        }
    }

    #[tokio::test]
    async fn non_text_range_header_is_not_satisfiable() {
        let (_dir, app) = app();
        put_object(&app, "/b/hello.txt", b"hello\n").await;

        let req = Request::builder()
            .uri("/b/hello.txt")
            .header(header::RANGE, HeaderValue::from_bytes(b"bytes=\xff-1").unwrap())
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(headers["x-amz-error-code"], "InvalidRange");
        assert!(text(&body).contains("<Code>InvalidRange</Code>"));
    }

    #[tokio::test]
    async fn invalid_keys_are_rejected() {
        let (_dir, app) = app();
        let req = Request::builder()
            .method(Method::PUT)
            .uri("/b/a/../../escape")
            .body(Body::from("x"))
            .unwrap();
        let (status, _, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(text(&body).contains("<Code>InvalidArgument</Code>"));
    }
}
