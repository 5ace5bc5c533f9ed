//! Read-only views of a storage request and its completed response.
//!
//! The hosting pipeline builds a [`RequestContext`] before handing the request
//! to the storage layer and a [`ResponseContext`] once the storage layer has
//! answered. Neither is mutated afterwards.

use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::Response;

use super::scope::Scope;

/// Path segment every storage route lives under.
pub const API_VERSION: &str = "v1";

/// Account / container / object addressed by a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub account: String,
    pub container: Option<String>,
    pub object: Option<String>,
}

impl Target {
    /// Split `/v1/{account}[/{container}[/{object}]]`.
    ///
    /// Everything after the container segment belongs to the object name,
    /// slashes included. Empty trailing segments are treated as absent, so
    /// `/v1/a/c/` addresses the container `c`.
    pub fn parse(path: &str) -> Option<Self> {
        let mut segments = path.strip_prefix('/')?.splitn(4, '/');
        if segments.next()? != API_VERSION {
            return None;
        }

        let account = decode_segment(segments.next())?;
        let container = decode_segment(segments.next());
        let object = decode_segment(segments.next());

        if object.is_some() && container.is_none() {
            return None;
        }

        Some(Self {
            account,
            container,
            object,
        })
    }

    /// The scope whose opt-in flag governs this target.
    ///
    /// Objects and containers resolve to their container, accounts to
    /// themselves. There is no fallback from container to account.
    pub fn scope(&self) -> Scope {
        match &self.container {
            Some(container) => Scope::container(&self.account, container),
            None => Scope::account(&self.account),
        }
    }
}

fn decode_segment(segment: Option<&str>) -> Option<String> {
    let raw = segment.filter(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(raw).ok()?;
    Some(decoded.into_owned())
}

/// Description of an object the storage layer just persisted.
///
/// Storage handlers attach it to their response as an extension so the
/// envelope carries the stored size and etag rather than client claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub etag: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
        }
    }

    pub fn target(&self) -> Option<Target> {
        Target::parse(&self.path)
    }

    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        header_str(&self.headers, name)
    }
}

#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub stored: Option<StoredObject>,
}

impl ResponseContext {
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            status,
            headers,
            stored: None,
        }
    }

    /// Snapshot status, headers and any [`StoredObject`] extension.
    pub fn from_response<B>(response: &Response<B>) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            stored: response.extensions().get::<StoredObject>().cloned(),
        }
    }

    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        header_str(&self.headers, name)
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_path_with_nested_key() {
        let target = Target::parse("/v1/AUTH_test/photos/2025/img.jpg").unwrap();
        assert_eq!(target.account, "AUTH_test");
        assert_eq!(target.container.as_deref(), Some("photos"));
        assert_eq!(target.object.as_deref(), Some("2025/img.jpg"));
        assert_eq!(target.scope(), Scope::container("AUTH_test", "photos"));
    }

    #[test]
    fn parses_account_and_container_paths() {
        let account = Target::parse("/v1/A").unwrap();
        assert_eq!(account.container, None);
        assert_eq!(account.scope(), Scope::account("A"));

        let container = Target::parse("/v1/A/C/").unwrap();
        assert_eq!(container.container.as_deref(), Some("C"));
        assert_eq!(container.object, None);
    }

    #[test]
    fn decodes_percent_encoded_segments() {
        let target = Target::parse("/v1/A/C/my%20file.txt").unwrap();
        assert_eq!(target.object.as_deref(), Some("my file.txt"));
    }

    #[test]
    fn rejects_paths_outside_the_api() {
        assert_eq!(Target::parse("/healthz"), None);
        assert_eq!(Target::parse("/v1"), None);
        assert_eq!(Target::parse("/v1/"), None);
        assert_eq!(Target::parse("/v2/A/C"), None);
        assert_eq!(Target::parse("v1/A/C"), None);
        assert_eq!(Target::parse("/v1/A//obj"), None);
    }
}
