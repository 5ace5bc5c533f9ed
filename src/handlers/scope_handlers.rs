//! HTTP handlers for account and container operations.
//!
//! Metadata travels in `X-Account-Meta-*` / `X-Container-Meta-*` headers.
//! Setting `X-Container-Meta-Search-Enabled: true` is how a container opts
//! into metadata queueing; sending it empty opts back out.

use crate::{
    errors::AppError,
    handlers::{insert_metadata_headers, metadata_updates},
    models::metadata::MetadataTable,
    services::storage_service::StorageService,
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

fn created_or_accepted(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::ACCEPTED
    }
}

/// PUT `/v1/{account}` — create account (202 if it already exists).
pub async fn put_account(
    State(service): State<StorageService>,
    Path(account): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let metadata = metadata_updates(&headers, MetadataTable::Account);
    let created = service.put_account(&account, &metadata).await?;
    Ok(created_or_accepted(created))
}

/// POST `/v1/{account}` — update account metadata.
pub async fn post_account(
    State(service): State<StorageService>,
    Path(account): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let metadata = metadata_updates(&headers, MetadataTable::Account);
    service.post_account_metadata(&account, &metadata).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// HEAD `/v1/{account}` — account metadata as headers.
pub async fn head_account(
    State(service): State<StorageService>,
    Path(account): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let metadata = service.account_metadata(&account).await?;
    let mut headers = HeaderMap::new();
    insert_metadata_headers(&mut headers, MetadataTable::Account, &metadata);
    Ok((StatusCode::NO_CONTENT, headers))
}

/// DELETE `/v1/{account}` — delete an account without containers.
pub async fn delete_account(
    State(service): State<StorageService>,
    Path(account): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_account(&account).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT `/v1/{account}/{container}` — create container (202 if it exists).
pub async fn put_container(
    State(service): State<StorageService>,
    Path((account, container)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let metadata = metadata_updates(&headers, MetadataTable::Container);
    let created = service
        .put_container(&account, &container, &metadata)
        .await?;
    Ok(created_or_accepted(created))
}

/// POST `/v1/{account}/{container}` — update container metadata.
pub async fn post_container(
    State(service): State<StorageService>,
    Path((account, container)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let metadata = metadata_updates(&headers, MetadataTable::Container);
    service
        .post_container_metadata(&account, &container, &metadata)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// HEAD `/v1/{account}/{container}` — container metadata as headers.
pub async fn head_container(
    State(service): State<StorageService>,
    Path((account, container)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let metadata = service.container_metadata(&account, &container).await?;
    let mut headers = HeaderMap::new();
    insert_metadata_headers(&mut headers, MetadataTable::Container, &metadata);
    Ok((StatusCode::NO_CONTENT, headers))
}

/// DELETE `/v1/{account}/{container}` — delete an empty container.
pub async fn delete_container(
    State(service): State<StorageService>,
    Path((account, container)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_container(&account, &container).await?;
    Ok(StatusCode::NO_CONTENT)
}
