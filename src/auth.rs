//! Authentication collaborators for the realtime connection.
//!
//! The connection manager never stores credentials itself; it asks an
//! [`AuthProvider`] for the current bearer token once per `connect()` call
//! and appends it to the connection URL. Providers swallow storage failures
//! so a connection attempt can still proceed unauthenticated.

use async_trait::async_trait;
use dashmap::DashMap;
/// Secret string types that redact values in debug output for security.
pub use secrecy::{ExposeSecret, SecretString};

/// Storage key under which the dashboard persists its session token.
pub const DEFAULT_TOKEN_KEY: &str = "aula.auth.token";

/// Token source injected into [`crate::connection::ConnectionManager`].
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The current bearer token, or `None` when the user has none or the
    /// backing store could not be read. Read failures are swallowed and
    /// logged here, never raised to the connection manager.
    async fn token(&self) -> Option<SecretString>;

    /// Invoked by the connection manager when building the authenticated URL
    /// or opening the socket fails. Hook for triggering logout or a token
    /// refresh in the surrounding application.
    fn on_auth_error(&self) {}
}

/// Fixed-token provider for tests and server-to-server use.
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    #[must_use]
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn token(&self) -> Option<SecretString> {
        Some(self.token.clone())
    }
}

/// Key-value storage the dashboard persists its session token in.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the value persisted under `key`.
    async fn read(&self, key: &str) -> std::io::Result<Option<String>>;
}

/// In-memory [`TokenStore`], used in tests and by embedders that manage
/// persistence themselves.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: DashMap<String, String>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&self, key: K, token: V) {
        self.entries.insert(key.into(), token.into());
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn read(&self, key: &str) -> std::io::Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }
}

/// [`AuthProvider`] reading a persisted token under a configurable key.
pub struct StoredTokenProvider<S: TokenStore> {
    store: S,
    key: String,
}

impl<S: TokenStore> StoredTokenProvider<S> {
    /// Provider reading from [`DEFAULT_TOKEN_KEY`].
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_key(store, DEFAULT_TOKEN_KEY)
    }

    #[must_use]
    pub fn with_key<K: Into<String>>(store: S, key: K) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

#[async_trait]
impl<S: TokenStore> AuthProvider for StoredTokenProvider<S> {
    async fn token(&self) -> Option<SecretString> {
        match self.store.read(&self.key).await {
            Ok(token) => token.map(SecretString::from),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(key = %self.key, error = %e, "token store read failed");
                #[cfg(not(feature = "tracing"))]
                let _: &std::io::Error = &e;
                None
            }
        }
    }

    fn on_auth_error(&self) {
        #[cfg(feature = "tracing")]
        tracing::warn!(key = %self.key, "authentication rejected, stored token may be stale");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;

    #[async_trait]
    impl TokenStore for FailingStore {
        async fn read(&self, _key: &str) -> std::io::Result<Option<String>> {
            Err(std::io::Error::other("disk unavailable"))
        }
    }

    #[tokio::test]
    async fn stored_provider_reads_persisted_token() {
        let store = MemoryTokenStore::new();
        store.insert(DEFAULT_TOKEN_KEY, "tok-123");

        let provider = StoredTokenProvider::new(store);
        let token = provider.token().await.expect("token should be present");
        assert_eq!(token.expose_secret(), "tok-123");
    }

    #[tokio::test]
    async fn stored_provider_honors_custom_key() {
        let store = MemoryTokenStore::new();
        store.insert("school-7.token", "tok-school");
        store.insert(DEFAULT_TOKEN_KEY, "tok-default");

        let provider = StoredTokenProvider::with_key(store, "school-7.token");
        let token = provider.token().await.expect("token should be present");
        assert_eq!(token.expose_secret(), "tok-school");
    }

    #[tokio::test]
    async fn missing_token_yields_none() {
        let provider = StoredTokenProvider::new(MemoryTokenStore::new());
        assert!(provider.token().await.is_none());
    }

    #[tokio::test]
    async fn store_failure_is_swallowed() {
        let provider = StoredTokenProvider::new(FailingStore);
        assert!(provider.token().await.is_none());
    }

    #[tokio::test]
    async fn static_provider_always_returns_its_token() {
        let provider = StaticTokenProvider::new("fixed");
        let token = provider.token().await.expect("token should be present");
        assert_eq!(token.expose_secret(), "fixed");
    }
}
