//! Axum layer running the queuer after each storage handler.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::{INDEXED_METHODS, Queuer, RequestContext, ResponseContext};

/// `axum::middleware::from_fn_with_state` hook.
///
/// The response is always returned untouched; the queuer only sees copies of
/// the request head and the response head.
pub async fn enqueue_metadata(
    State(queuer): State<Arc<Queuer>>,
    request: Request,
    next: Next,
) -> Response {
    if !INDEXED_METHODS.contains(request.method()) {
        return next.run(request).await;
    }

    let context = RequestContext::new(
        request.method().clone(),
        request.uri().path(),
        request.headers().clone(),
    );
    let response = next.run(request).await;

    let completed = ResponseContext::from_response(&response);
    queuer.process_completed_operation(&context, &completed).await;

    response
}
