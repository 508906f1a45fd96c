//! Application state for Axum handlers.

use boxoffice_core::BoxOffice;
use boxoffice_core::store::Store;
use boxoffice_core::types::RedemptionToken;
use std::sync::Arc;

/// State shared across all HTTP handlers.
///
/// Generic over the storage backend so the same router serves
/// `PostgreSQL` in production and the in-memory store in tests.
pub struct AppState<S: Store> {
    /// The engine.
    pub engine: BoxOffice<S>,
    public_base_url: Arc<str>,
}

impl<S: Store> AppState<S> {
    /// Create a new application state.
    ///
    /// `public_base_url` is the externally visible origin used to build
    /// verification links, without a trailing slash.
    #[must_use]
    pub fn new(engine: BoxOffice<S>, public_base_url: &str) -> Self {
        Self {
            engine,
            public_base_url: Arc::from(public_base_url.trim_end_matches('/')),
        }
    }

    /// Link a door scanner opens to look up `token`.
    #[must_use]
    pub fn verification_url(&self, token: &RedemptionToken) -> String {
        format!("{}/api/purchases/scan/{token}", self.public_base_url)
    }
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            public_base_url: Arc::clone(&self.public_base_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_testing::InMemoryStore;

    #[test]
    fn test_verification_url_has_no_double_slash() {
        let engine = BoxOffice::new(Arc::new(InMemoryStore::new()));
        let state = AppState::new(engine, "https://tickets.example.com/");
        assert_eq!(
            state.verification_url(&RedemptionToken::new("abc123")),
            "https://tickets.example.com/api/purchases/scan/abc123"
        );
    }
}
