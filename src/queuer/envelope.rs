//! Metadata envelope published for every eligible write.
//!
//! Serialized field names are consumed by the indexing side and must stay
//! stable: `account`, `container`, `object`, `content-type`,
//! `content-length`, `etag`, `metadata`, `op`, `http_method`, `uri`,
//! `timestamp`. Optional fields are omitted, never sent as `null`.

use axum::http::{HeaderMap, Method, header};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use super::request::{RequestContext, ResponseContext};

/// Request header prefix carrying user object metadata.
pub const OBJECT_META_PREFIX: &str = "x-object-meta-";

/// Methods that produce an envelope.
pub const INDEXED_METHODS: [Method; 3] = [Method::PUT, Method::POST, Method::DELETE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn from_method(method: &Method) -> Option<Self> {
        match method.as_str() {
            "PUT" => Some(Self::Create),
            "POST" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("no account/container address in path `{0}`")]
    MissingAddress(String),
    #[error("method {0} does not map to a queue operation")]
    UnsupportedMethod(Method),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub account: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(rename = "content-type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(rename = "content-length", skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub op: Operation,
    pub http_method: String,
    pub uri: String,
    pub timestamp: DateTime<Utc>,
}

/// Build the envelope for a completed request.
///
/// Malformed optional headers are dropped silently. The only failures are a
/// path without an account (or an object without a container) and a method
/// outside [`INDEXED_METHODS`]; both mean the caller routed a request here
/// that it should not have.
pub fn build(
    request: &RequestContext,
    response: &ResponseContext,
) -> Result<Envelope, EnvelopeError> {
    let target = request
        .target()
        .ok_or_else(|| EnvelopeError::MissingAddress(request.path.clone()))?;
    let op = Operation::from_method(&request.method)
        .ok_or_else(|| EnvelopeError::UnsupportedMethod(request.method.clone()))?;

    let (content_type, content_length, etag) = if op == Operation::Delete {
        (None, None, None)
    } else {
        content_descriptors(request, response)
    };

    Ok(Envelope {
        account: target.account,
        container: target.container,
        object: target.object,
        content_type,
        content_length,
        etag,
        metadata: object_metadata(&request.headers),
        op,
        http_method: request.method.to_string(),
        uri: request.path.clone(),
        timestamp: Utc::now(),
    })
}

/// Stored values recorded by the storage layer win over request headers.
fn content_descriptors(
    request: &RequestContext,
    response: &ResponseContext,
) -> (Option<String>, Option<u64>, Option<String>) {
    let stored = response.stored.as_ref();

    let content_type = stored
        .and_then(|s| s.content_type.clone())
        .or_else(|| request.header(header::CONTENT_TYPE).map(str::to_string));

    let content_length = stored
        .and_then(|s| u64::try_from(s.size_bytes).ok())
        .or_else(|| {
            request
                .header(header::CONTENT_LENGTH)
                .and_then(|v| v.parse::<u64>().ok())
        });

    let etag = stored
        .and_then(|s| s.etag.clone())
        .or_else(|| response.header(header::ETAG).map(str::to_string))
        .map(|e| e.trim_matches('"').to_string())
        .filter(|e| !e.is_empty());

    (content_type, content_length, etag)
}

/// Collect `x-object-meta-*` headers, prefix stripped, keys lowercased.
///
/// Repeated headers resolve to the last value seen.
pub fn object_metadata(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    for (name, value) in headers {
        let Some(key) = name.as_str().strip_prefix(OBJECT_META_PREFIX) else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        let Ok(value) = value.to_str() else {
            continue;
        };
        metadata.insert(key.to_ascii_lowercase(), value.trim().to_string());
    }
    metadata
}
