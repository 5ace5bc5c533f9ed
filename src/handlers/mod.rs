//! HTTP handlers for the `/v1` storage API plus health and info endpoints.

pub mod health_handlers;
pub mod info_handlers;
pub mod object_handlers;
pub mod scope_handlers;

use crate::models::metadata::MetadataTable;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

/// Pull `x-{kind}-meta-*` updates out of request headers.
///
/// `x-remove-{kind}-meta-{key}` removes `key`, as does an empty value.
/// Headers with non-UTF-8 values are ignored.
pub(crate) fn metadata_updates(headers: &HeaderMap, table: MetadataTable) -> Vec<(String, String)> {
    let prefix = table.header_prefix();
    let remove_prefix = format!("x-remove-{}", &prefix["x-".len()..]);

    let mut updates = Vec::new();
    for (name, value) in headers {
        let name = name.as_str();
        if let Some(key) = name.strip_prefix(prefix).filter(|k| !k.is_empty()) {
            if let Ok(value) = value.to_str() {
                updates.push((key.to_string(), value.trim().to_string()));
            }
        } else if let Some(key) = name.strip_prefix(remove_prefix.as_str()).filter(|k| !k.is_empty()) {
            updates.push((key.to_string(), String::new()));
        }
    }
    updates
}

/// Echo stored metadata back as `x-{kind}-meta-*` response headers.
pub(crate) fn insert_metadata_headers(
    headers: &mut HeaderMap,
    table: MetadataTable,
    metadata: &HashMap<String, String>,
) {
    for (key, value) in metadata {
        let name = format!("{}{}", table.header_prefix(), key);
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
}
