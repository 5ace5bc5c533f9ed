//! Capability discovery.
//!
//! - GET /info -> what the metadata queuer watches, so clients know which
//!   header opts a container or account in.

use crate::queuer::QueuerInfo;
use axum::{Json, response::IntoResponse};
use serde::Serialize;

#[derive(Serialize)]
struct InfoResponse {
    metadata_queuer: QueuerInfo,
}

/// `GET /info`
pub async fn info() -> impl IntoResponse {
    Json(InfoResponse {
        metadata_queuer: QueuerInfo::current(),
    })
}
