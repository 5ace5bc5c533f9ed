//! Metadata queuer.
//!
//! Watches completed write requests on the storage API and, for scopes that
//! opted in, publishes an [`Envelope`] describing the write to a message
//! queue for downstream indexing. The queuer only observes: nothing it does
//! changes the response the storage client receives.
//!
//! Pipeline per request: [`EligibilityResolver`] → [`envelope::build`] →
//! [`EnvelopePublisher`].

pub mod amqp;
pub mod envelope;
pub mod middleware;
pub mod publisher;
pub mod request;
pub mod scope;

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

pub use envelope::{Envelope, INDEXED_METHODS, OBJECT_META_PREFIX};
pub use publisher::{EnvelopePublisher, PublishOutcome};
pub use request::{RequestContext, ResponseContext, StoredObject};
pub use scope::{EligibilityResolver, OPT_IN_KEY, ScopeMetadataStore};

pub struct Queuer {
    resolver: EligibilityResolver,
    publisher: Arc<dyn EnvelopePublisher>,
}

impl Queuer {
    pub fn new(
        store: Arc<dyn ScopeMetadataStore>,
        publisher: Arc<dyn EnvelopePublisher>,
    ) -> Self {
        Self {
            resolver: EligibilityResolver::new(store),
            publisher,
        }
    }

    /// Entry point for the hosting pipeline, called once the storage layer
    /// has answered.
    ///
    /// Returns nothing on purpose: skipped requests, construction errors and
    /// publish failures all end here as log lines.
    pub async fn process_completed_operation(
        &self,
        request: &RequestContext,
        response: &ResponseContext,
    ) {
        let Some(target) = self.indexable_target(request, response) else {
            return;
        };

        let scope = target.scope();
        if !self.resolver.is_eligible(&scope).await {
            debug!(
                "queuer: {} {} not indexable: `{}` not set on {:?} {}",
                request.method,
                request.path,
                OPT_IN_KEY,
                scope.kind(),
                scope
            );
            return;
        }

        let envelope = match envelope::build(request, response) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!("queuer: cannot build envelope for {}: {}", request.path, err);
                return;
            }
        };

        match self.publisher.publish(&envelope).await {
            PublishOutcome::Delivered => {
                info!("queuer: {} {} sent to queue", request.method, request.path)
            }
            PublishOutcome::NotDelivered(reason) => error!(
                "queuer: {} {} failed to send: {}",
                request.method, request.path, reason
            ),
        }
    }

    /// Cheap request-only checks that run before any metadata lookup.
    fn indexable_target(
        &self,
        request: &RequestContext,
        response: &ResponseContext,
    ) -> Option<request::Target> {
        let reason = if !INDEXED_METHODS.contains(&request.method) {
            "invalid method"
        } else if !response.status.is_success() {
            "storage operation did not succeed"
        } else {
            match request.target() {
                Some(target) => return Some(target),
                None => "not a storage path",
            }
        };

        debug!(
            "queuer: {} {} not indexable: {}",
            request.method, request.path, reason
        );
        None
    }
}

/// Capabilities advertised on `GET /info`.
#[derive(Debug, Serialize)]
pub struct QueuerInfo {
    pub methods: Vec<String>,
    pub indexed_headers: Vec<String>,
    pub enabling_header: String,
}

impl QueuerInfo {
    pub fn current() -> Self {
        Self {
            methods: INDEXED_METHODS.iter().map(|m| m.to_string()).collect(),
            indexed_headers: vec![
                "content-type".into(),
                "content-length".into(),
                format!("{}*", OBJECT_META_PREFIX),
            ],
            enabling_header: format!("x-(account|container)-meta-{}", OPT_IN_KEY),
        }
    }
}
