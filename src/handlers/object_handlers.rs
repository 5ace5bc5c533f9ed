//! HTTP handlers for object operations under `/v1/{account}/{container}/{*object}`.
//! Streams object bodies to avoid buffering in memory and delegates storage
//! concerns to `StorageService`.
//!
//! Mutating handlers attach a [`StoredObject`] extension to their response so
//! the metadata queuer can describe what was actually written.

use crate::{
    errors::AppError,
    handlers::{insert_metadata_headers, metadata_updates},
    models::{metadata::MetadataTable, object::Object},
    queuer::StoredObject,
    services::storage_service::StorageService,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use futures::StreamExt;
use std::{collections::HashMap, io};
use tokio_util::io::ReaderStream;

/// PUT `/v1/{account}/{container}/{*object}` — upload (overwrite) an object.
pub async fn upload_object(
    State(service): State<StorageService>,
    Path((account, container, key)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let metadata = metadata_updates(&headers, MetadataTable::Object);

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let object = service
        .upload_object_stream(&account, &container, &key, content_type, &metadata, stream)
        .await?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::CREATED;
    if let Some(value) = quoted_etag(&object) {
        response.headers_mut().insert(header::ETAG, value);
    }
    response.extensions_mut().insert(stored(&object));
    Ok(response)
}

/// GET `/v1/{account}/{container}/{*object}` — stream the object back.
pub async fn get_object(
    State(service): State<StorageService>,
    Path((account, container, key)): Path<(String, String, String)>,
) -> Result<Response, AppError> {
    let (object, metadata, file) = service
        .get_object_reader(&account, &container, &key)
        .await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &object, &metadata);
    Ok(response)
}

/// HEAD `/v1/{account}/{container}/{*object}` — same headers as GET but no body.
pub async fn head_object(
    State(service): State<StorageService>,
    Path((account, container, key)): Path<(String, String, String)>,
) -> Result<Response, AppError> {
    let (object, metadata) = service
        .get_object_metadata(&account, &container, &key)
        .await?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &object, &metadata);
    Ok(response)
}

/// POST `/v1/{account}/{container}/{*object}` — replace object metadata.
pub async fn post_object(
    State(service): State<StorageService>,
    Path((account, container, key)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let metadata = metadata_updates(&headers, MetadataTable::Object);
    let object = service
        .post_object_metadata(&account, &container, &key, &metadata)
        .await?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::ACCEPTED;
    response.extensions_mut().insert(stored(&object));
    Ok(response)
}

/// DELETE `/v1/{account}/{container}/{*object}` — soft-delete object.
pub async fn delete_object(
    State(service): State<StorageService>,
    Path((account, container, key)): Path<(String, String, String)>,
) -> Result<Response, AppError> {
    service.delete_object(&account, &container, &key).await?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    Ok(response)
}

fn stored(object: &Object) -> StoredObject {
    StoredObject {
        content_type: object.content_type.clone(),
        size_bytes: object.size_bytes,
        etag: object.etag.clone(),
    }
}

fn quoted_etag(object: &Object) -> Option<HeaderValue> {
    object
        .etag
        .as_ref()
        .and_then(|etag| HeaderValue::from_str(&format!("\"{}\"", etag)).ok())
}

fn set_object_headers(
    headers: &mut HeaderMap,
    object: &Object,
    metadata: &HashMap<String, String>,
) {
    let content_type = object
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(object.size_bytes.max(0)),
    );

    if let Some(value) = quoted_etag(object) {
        headers.insert(header::ETAG, value);
    }

    if let Ok(value) = HeaderValue::from_str(&object.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    insert_metadata_headers(headers, MetadataTable::Object, metadata);
}
