//! XML documents for the S3 wire format.
//!
//! Built by hand; the shapes are small and fixed.

use crate::{
    models::bucket::Bucket,
    services::storage_service::{ListObjectsParams, ListObjectsResult},
};
use chrono::SecondsFormat;

pub const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const OWNER_ID: &str = "s3-localfs";

pub fn error_document(
    code: &str,
    message: &str,
    resource: Option<&str>,
    request_id: &str,
) -> String {
    let mut xml = format!(r#"{XML_DECL}<Error xmlns="{S3_XMLNS}">"#);
    xml.push_str(&format!("<Code>{}</Code>", xml_escape(code)));
    xml.push_str(&format!("<Message>{}</Message>", xml_escape(message)));
    if let Some(resource) = resource {
        xml.push_str(&format!("<Resource>{}</Resource>", xml_escape(resource)));
    }
    xml.push_str(&format!("<RequestId>{}</RequestId>", xml_escape(request_id)));
    xml.push_str("</Error>");
    xml
}

pub fn list_buckets_document(buckets: &[Bucket]) -> String {
    let mut xml = format!(r#"{XML_DECL}<ListAllMyBucketsResult xmlns="{S3_XMLNS}">"#);
    xml.push_str(&format!(
        "<Owner><ID>{OWNER_ID}</ID><DisplayName>{OWNER_ID}</DisplayName></Owner>"
    ));
    xml.push_str("<Buckets>");
    for bucket in buckets {
        xml.push_str("<Bucket>");
        xml.push_str(&format!("<Name>{}</Name>", xml_escape(&bucket.name)));
        xml.push_str(&format!(
            "<CreationDate>{}</CreationDate>",
            bucket
                .created_at
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        xml.push_str("</Bucket>");
    }
    xml.push_str("</Buckets></ListAllMyBucketsResult>");
    xml
}

pub fn list_objects_v2_document(
    bucket: &str,
    params: &ListObjectsParams,
    result: &ListObjectsResult,
) -> String {
    let mut xml = format!(r#"{XML_DECL}<ListBucketResult xmlns="{S3_XMLNS}">"#);
    xml.push_str(&format!("<Name>{}</Name>", xml_escape(bucket)));
    xml.push_str(&format!(
        "<Prefix>{}</Prefix>",
        xml_escape(params.prefix.as_deref().unwrap_or(""))
    ));
    if let Some(delim) = params.delimiter.as_deref().filter(|d| !d.is_empty()) {
        xml.push_str(&format!("<Delimiter>{}</Delimiter>", xml_escape(delim)));
    }
    xml.push_str(&format!("<MaxKeys>{}</MaxKeys>", params.max_keys));
    xml.push_str(&format!("<KeyCount>{}</KeyCount>", result.key_count));
    if let Some(token) = params.continuation_token.as_deref() {
        xml.push_str(&format!(
            "<ContinuationToken>{}</ContinuationToken>",
            xml_escape(token)
        ));
    }
    if let Some(sa) = params.start_after.as_deref() {
        xml.push_str(&format!("<StartAfter>{}</StartAfter>", xml_escape(sa)));
    }
    xml.push_str(&format!(
        "<IsTruncated>{}</IsTruncated>",
        if result.is_truncated { "true" } else { "false" }
    ));
    if let Some(next) = &result.next_continuation_token {
        xml.push_str(&format!(
            "<NextContinuationToken>{}</NextContinuationToken>",
            xml_escape(next)
        ));
    }

    for obj in &result.objects {
        xml.push_str("<Contents>");
        xml.push_str(&format!("<Key>{}</Key>", xml_escape(&obj.key)));
        xml.push_str(&format!(
            "<LastModified>{}</LastModified>",
            obj.last_modified
                .to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
        xml.push_str(&format!("<ETag>{}</ETag>", xml_escape(&obj.quoted_etag())));
        xml.push_str(&format!("<Size>{}</Size>", obj.size_bytes));
        xml.push_str("<StorageClass>STANDARD</StorageClass>");
        xml.push_str("</Contents>");
    }

    for prefix in &result.common_prefixes {
        xml.push_str("<CommonPrefixes><Prefix>");
        xml.push_str(&xml_escape(prefix));
        xml.push_str("</Prefix></CommonPrefixes>");
    }

    xml.push_str("</ListBucketResult>");
    xml
}

pub fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
