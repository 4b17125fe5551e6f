//! Fingerprint-keyed registry of cache store instances.
//!
//! The cache strategy deduplicates clients: two registrations for the same
//! `host:port` must share one live connection. The registry is an explicit
//! object owned by the broker -- not a module-level static -- so its
//! lifetime is tied to the broker and tests never leak state into each
//! other.

use std::collections::HashMap;
use std::sync::Arc;

use berth_core::fingerprint::Fingerprint;
use berth_stores::cache::{CacheEndpoint, CacheStore};
use berth_stores::error::StoreError;

/// Registry mapping endpoint fingerprints to shared cache stores.
#[derive(Default)]
pub struct CacheRegistry {
    entries: tokio::sync::Mutex<HashMap<Fingerprint, Arc<CacheStore>>>,
}

impl CacheRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or insert the store for `endpoint`, without connecting.
    /// Returns the store and whether this call created it.
    async fn entry(&self, endpoint: CacheEndpoint) -> (Arc<CacheStore>, bool) {
        let fingerprint = endpoint.fingerprint();
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.get(&fingerprint) {
            return (Arc::clone(existing), false);
        }
        let store = Arc::new(CacheStore::new(endpoint));
        entries.insert(fingerprint, Arc::clone(&store));
        (store, true)
    }

    /// Return the shared store for `endpoint`, creating and connecting it
    /// on first request.
    ///
    /// Repeated calls with the same fingerprint return the identical
    /// instance. The store's own single-flight lock guarantees at most one
    /// live connection per fingerprint even when a second caller arrives
    /// while the first connect is still in flight.
    ///
    /// # Errors
    ///
    /// Propagates the connect error; a store that failed its first connect
    /// is evicted so a later registration can retry.
    pub async fn obtain(&self, endpoint: CacheEndpoint) -> Result<Arc<CacheStore>, StoreError> {
        let (store, created) = self.entry(endpoint).await;
        if created {
            if let Err(err) = store.connect().await {
                self.entries
                    .lock()
                    .await
                    .remove(store.fingerprint());
                return Err(err);
            }
            tracing::info!(fingerprint = %store.fingerprint(), "cache store registered");
        }
        Ok(store)
    }

    /// Number of registered fingerprints.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Quit every registered store and clear the registry. Tolerates
    /// stores that never connected.
    pub async fn shutdown_all(&self) {
        let stores: Vec<Arc<CacheStore>> =
            self.entries.lock().await.drain().map(|(_, s)| s).collect();
        for store in stores {
            store.quit().await;
        }
    }
}
