//! Defines routes for the account/container/object storage API.
//!
//! ## Structure
//! - **Probes and discovery**
//!   - `GET /healthz`, `GET /readyz`, `GET /info`
//!
//! - **Account-level endpoints** (`X-Account-Meta-*`)
//!   - `PUT | POST | HEAD | DELETE /v1/{account}`
//!
//! - **Container-level endpoints** (`X-Container-Meta-*`)
//!   - `PUT | POST | HEAD | DELETE /v1/{account}/{container}`
//!
//! - **Object-level endpoints** (`X-Object-Meta-*`)
//!   - `PUT | GET | HEAD | POST | DELETE /v1/{account}/{container}/{*object}`
//!
//! The wildcard `*object` allows nested names like `photos/2025/img.jpg`.
//! Everything under `/v1` runs behind the metadata queuer layer.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        info_handlers::info,
        object_handlers::{delete_object, get_object, head_object, post_object, upload_object},
        scope_handlers::{
            delete_account, delete_container, head_account, head_container, post_account,
            post_container, put_account, put_container,
        },
    },
    queuer::{Queuer, middleware::enqueue_metadata},
    services::storage_service::StorageService,
};
use axum::{
    Router, middleware,
    routing::{get, put},
};
use std::sync::Arc;

/// Build the full router.
///
/// The router carries shared state (`StorageService`) to all handlers; the
/// queuer is handed to its layer separately.
pub fn routes(queuer: Arc<Queuer>) -> Router<StorageService> {
    let storage_api = Router::new()
        .route(
            "/v1/{account}",
            put(put_account)
                .post(post_account)
                .head(head_account)
                .delete(delete_account),
        )
        .route(
            "/v1/{account}/{container}",
            put(put_container)
                .post(post_container)
                .head(head_container)
                .delete(delete_container),
        )
        .route(
            "/v1/{account}/{container}/{*object}",
            put(upload_object)
                .get(get_object)
                .head(head_object)
                .post(post_object)
                .delete(delete_object),
        )
        .layer(middleware::from_fn_with_state(queuer, enqueue_metadata));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/info", get(info))
        .merge(storage_api)
}
