//! Scope opt-in lookup.
//!
//! Indexing is enabled per account or per container by setting the
//! `search-enabled` metadata entry (`X-Account-Meta-Search-Enabled` /
//! `X-Container-Meta-Search-Enabled`). Each operation is checked against the
//! scope at its own level: object and container requests against the
//! container, account requests against the account. Flags are never
//! inherited.

use async_trait::async_trait;
use std::{collections::HashMap, fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, warn};

/// Metadata key (prefix stripped) holding the opt-in flag.
pub const OPT_IN_KEY: &str = "search-enabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Account,
    Container,
}

/// An account or a container within an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub account: String,
    pub container: Option<String>,
}

impl Scope {
    pub fn account(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            container: None,
        }
    }

    pub fn container(account: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            container: Some(container.into()),
        }
    }

    pub fn kind(&self) -> ScopeKind {
        if self.container.is_some() {
            ScopeKind::Container
        } else {
            ScopeKind::Account
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.container {
            Some(container) => write!(f, "{}/{}", self.account, container),
            None => write!(f, "{}", self.account),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScopeStoreError {
    #[error("scope metadata backend error: {0}")]
    Backend(String),
}

/// Read access to account and container metadata.
///
/// Keys are lowercase with the `x-{account,container}-meta-` prefix removed.
/// `Ok(None)` means the scope does not exist.
#[async_trait]
pub trait ScopeMetadataStore: Send + Sync {
    async fn scope_metadata(
        &self,
        scope: &Scope,
    ) -> Result<Option<HashMap<String, String>>, ScopeStoreError>;
}

/// Decides whether a scope has opted into metadata queueing.
#[derive(Clone)]
pub struct EligibilityResolver {
    store: Arc<dyn ScopeMetadataStore>,
}

impl EligibilityResolver {
    pub fn new(store: Arc<dyn ScopeMetadataStore>) -> Self {
        Self { store }
    }

    /// `true` only when the scope exists and its flag is set to a non-empty
    /// value. Lookup failures resolve to `false`.
    pub async fn is_eligible(&self, scope: &Scope) -> bool {
        match self.store.scope_metadata(scope).await {
            Ok(Some(meta)) => is_opted_in(meta.get(OPT_IN_KEY).map(String::as_str)),
            Ok(None) => {
                debug!(%scope, "queuer: scope not found");
                false
            }
            Err(err) => {
                warn!(%scope, error = %err, "queuer: scope metadata unavailable");
                false
            }
        }
    }
}

/// Tri-state flag: absent and empty are both "off".
fn is_opted_in(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scope metadata held in memory; scopes absent from the map do not exist.
    #[derive(Default)]
    pub(crate) struct MemoryScopeStore {
        scopes: Mutex<HashMap<Scope, HashMap<String, String>>>,
    }

    impl MemoryScopeStore {
        pub(crate) fn insert(&self, scope: Scope, entries: &[(&str, &str)]) {
            let meta = entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.scopes.lock().unwrap().insert(scope, meta);
        }
    }

    #[async_trait]
    impl ScopeMetadataStore for MemoryScopeStore {
        async fn scope_metadata(
            &self,
            scope: &Scope,
        ) -> Result<Option<HashMap<String, String>>, ScopeStoreError> {
            Ok(self.scopes.lock().unwrap().get(scope).cloned())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ScopeMetadataStore for BrokenStore {
        async fn scope_metadata(
            &self,
            _scope: &Scope,
        ) -> Result<Option<HashMap<String, String>>, ScopeStoreError> {
            Err(ScopeStoreError::Backend("disk I/O error".into()))
        }
    }

    fn resolver(store: MemoryScopeStore) -> EligibilityResolver {
        EligibilityResolver::new(Arc::new(store))
    }

    #[tokio::test]
    async fn missing_flag_is_ineligible() {
        let store = MemoryScopeStore::default();
        store.insert(Scope::account("A"), &[("color", "blue")]);
        store.insert(Scope::container("A", "C"), &[]);
        let resolver = resolver(store);

        assert!(!resolver.is_eligible(&Scope::account("A")).await);
        assert!(!resolver.is_eligible(&Scope::container("A", "C")).await);
    }

    #[tokio::test]
    async fn non_empty_flag_is_eligible_and_empty_clears_it() {
        let store = Arc::new(MemoryScopeStore::default());
        let resolver = EligibilityResolver::new(store.clone());
        let scope = Scope::container("A", "C");

        for value in ["True", "1", "yes"] {
            store.insert(scope.clone(), &[(OPT_IN_KEY, value)]);
            assert!(resolver.is_eligible(&scope).await, "value {value:?}");
        }

        store.insert(scope.clone(), &[(OPT_IN_KEY, "")]);
        assert!(!resolver.is_eligible(&scope).await);

        store.insert(scope.clone(), &[(OPT_IN_KEY, "   ")]);
        assert!(!resolver.is_eligible(&scope).await);
    }

    #[tokio::test]
    async fn levels_do_not_inherit() {
        let store = MemoryScopeStore::default();
        store.insert(Scope::account("A"), &[(OPT_IN_KEY, "true")]);
        store.insert(Scope::container("A", "C"), &[]);
        store.insert(Scope::account("B"), &[]);
        store.insert(Scope::container("B", "D"), &[(OPT_IN_KEY, "true")]);
        let resolver = resolver(store);

        assert!(resolver.is_eligible(&Scope::account("A")).await);
        assert!(!resolver.is_eligible(&Scope::container("A", "C")).await);
        assert!(!resolver.is_eligible(&Scope::account("B")).await);
        assert!(resolver.is_eligible(&Scope::container("B", "D")).await);
    }

    #[tokio::test]
    async fn unknown_scope_is_ineligible() {
        let resolver = resolver(MemoryScopeStore::default());
        assert!(!resolver.is_eligible(&Scope::container("nope", "none")).await);
    }

    #[tokio::test]
    async fn backend_failure_is_ineligible() {
        let resolver = EligibilityResolver::new(Arc::new(BrokenStore));
        assert!(!resolver.is_eligible(&Scope::account("A")).await);
    }

    #[test]
    fn scope_display_and_kind() {
        assert_eq!(Scope::account("A").to_string(), "A");
        assert_eq!(Scope::container("A", "C").to_string(), "A/C");
        assert_eq!(Scope::account("A").kind(), ScopeKind::Account);
        assert_eq!(Scope::container("A", "C").kind(), ScopeKind::Container);
    }
}
