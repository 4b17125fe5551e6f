//! Store registration and the uniform acquire/release/shutdown contract.
//!
//! Surrounding code talks to one [`Broker`]. Each store is registered
//! under a key (the name route handlers later look it up by) with a
//! [`StoreConfig`] naming its kind; the broker dispatches to the matching
//! client strategy and hands back a [`Store`] exposing the same three
//! operations regardless of kind.
//!
//! Registration is idempotent per endpoint fingerprint for the cache kind
//! only -- the cache registry shares one live connection per `host:port`.
//! Relational and document registrations create one independent instance
//! per call, each performing its own failover check.

use std::collections::HashMap;
use std::sync::Arc;

use berth_core::descriptor::EndpointDescriptor;
use berth_stores::cache::{CacheEndpoint, CacheStore};
use berth_stores::document::{DocumentEndpoint, DocumentStore};
use berth_stores::error::StoreError;
use berth_stores::relational::{RelationalLease, RelationalStore};

use crate::config::{BrokerConfig, ConfigError};
use crate::registry::CacheRegistry;

/// Errors surfaced by broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// A client strategy failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The category of external stateful service being brokered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Relational database behind a bounded pool.
    Relational,
    /// Redis-compatible cache behind one persistent connection.
    Cache,
    /// Document store behind a connect-retry client.
    Document,
}

/// Per-kind registration configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// Register a relational store for this descriptor.
    Relational(EndpointDescriptor),
    /// Register (or share) a cache store for this endpoint.
    Cache(CacheEndpoint),
    /// Register a document store for this endpoint.
    Document(DocumentEndpoint),
}

impl StoreConfig {
    /// The store kind this configuration selects.
    pub const fn kind(&self) -> StoreKind {
        match self {
            Self::Relational(_) => StoreKind::Relational,
            Self::Cache(_) => StoreKind::Cache,
            Self::Document(_) => StoreKind::Document,
        }
    }
}

/// A handle lent to one caller between acquire and release.
pub enum Lease {
    /// An exclusively-owned relational connection.
    Relational(RelationalLease),
    /// The shared cache client; sequential callers share it.
    Cache(Arc<CacheStore>),
    /// The shared document client.
    Document(Arc<DocumentStore>),
}

/// A registered store exposing the uniform broker contract.
#[derive(Clone)]
pub enum Store {
    /// Relational pool client.
    Relational(Arc<RelationalStore>),
    /// Persistent cache client.
    Cache(Arc<CacheStore>),
    /// Polling document client.
    Document(Arc<DocumentStore>),
}

impl Store {
    /// The kind of this store.
    pub const fn kind(&self) -> StoreKind {
        match self {
            Self::Relational(_) => StoreKind::Relational,
            Self::Cache(_) => StoreKind::Cache,
            Self::Document(_) => StoreKind::Document,
        }
    }

    /// Acquire a handle for one unit of work, waiting on the store's
    /// readiness gate if it has not finished its first connect.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotReady`] for a cache store that was quit,
    /// or the classified strategy error.
    pub async fn acquire(&self) -> Result<Lease, StoreError> {
        match self {
            Self::Relational(store) => Ok(Lease::Relational(store.acquire().await?)),
            Self::Cache(store) => {
                if store.is_connected().await {
                    Ok(Lease::Cache(Arc::clone(store)))
                } else {
                    Err(StoreError::NotReady)
                }
            }
            Self::Document(store) => {
                // Park on the gate; the lease is only handed out once the
                // underlying client exists.
                let _client = store.client().await?;
                Ok(Lease::Document(Arc::clone(store)))
            }
        }
    }

    /// Return a lease. Fire-and-forget: internal errors are logged, never
    /// propagated.
    ///
    /// Relational leases rejoin their originating pool (or are closed if
    /// they were direct fallbacks); cache and document leases are shared
    /// clients with nothing to return.
    pub async fn release(&self, lease: Lease) {
        match (self, lease) {
            (Self::Relational(store), Lease::Relational(lease)) => store.release(lease).await,
            (_, Lease::Relational(lease)) => {
                // Released to the wrong store. A pooled connection still
                // rejoins the pool it came from; it is never adopted here.
                tracing::warn!("relational lease released through a non-relational store");
                lease.dispose().await;
            }
            (_, Lease::Cache(_) | Lease::Document(_)) => {}
        }
    }

    /// Shut the store down. Tolerates a store that never connected.
    pub async fn shutdown(&self) {
        match self {
            Self::Relational(store) => store.close().await,
            Self::Cache(store) => store.quit().await,
            Self::Document(store) => store.close().await,
        }
    }
}

/// The single entry point surrounding code calls.
#[derive(Default)]
pub struct Broker {
    cache_registry: CacheRegistry,
    stores: tokio::sync::Mutex<HashMap<String, Store>>,
}

impl Broker {
    /// Create a broker with no registered stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store under `key` and return its handle.
    ///
    /// Cache registrations with an already-seen fingerprint return the
    /// shared existing instance; relational and document registrations
    /// always create a fresh one. Registering a new store under an
    /// existing key replaces the entry (the previous store keeps running
    /// for handles already held).
    ///
    /// # Errors
    ///
    /// Returns the connect error for the cache kind, which connects
    /// eagerly. Relational stores connect lazily on first acquire and
    /// document stores retry in the background, so those registrations do
    /// not fail on unreachable hosts.
    pub async fn register(&self, key: &str, config: StoreConfig) -> Result<Store, BrokerError> {
        let kind = config.kind();
        let store = match config {
            StoreConfig::Relational(descriptor) => {
                Store::Relational(Arc::new(RelationalStore::new(descriptor)))
            }
            StoreConfig::Cache(endpoint) => {
                Store::Cache(self.cache_registry.obtain(endpoint).await?)
            }
            StoreConfig::Document(endpoint) => {
                let store = Arc::new(DocumentStore::new(&endpoint));
                store.connect().await;
                Store::Document(store)
            }
        };
        self.stores
            .lock()
            .await
            .insert(key.to_owned(), store.clone());
        tracing::info!(key, kind = ?kind, "store registered");
        Ok(store)
    }

    /// Register every store present in `config`, under the keys
    /// `relational`, `cache`, and `document`.
    ///
    /// # Errors
    ///
    /// Propagates the first registration failure.
    pub async fn register_from_config(&self, config: &BrokerConfig) -> Result<(), BrokerError> {
        if let Some(relational) = &config.relational {
            self.register("relational", StoreConfig::Relational(relational.descriptor()))
                .await?;
        }
        if let Some(cache) = &config.cache {
            self.register("cache", StoreConfig::Cache(cache.endpoint()))
                .await?;
        }
        if let Some(document) = &config.document {
            self.register("document", StoreConfig::Document(document.endpoint()))
                .await?;
        }
        Ok(())
    }

    /// Look up a registered store by key.
    pub async fn store(&self, key: &str) -> Option<Store> {
        self.stores.lock().await.get(key).cloned()
    }

    /// Number of registered store keys.
    pub async fn len(&self) -> usize {
        self.stores.lock().await.len()
    }

    /// Whether no stores are registered.
    pub async fn is_empty(&self) -> bool {
        self.stores.lock().await.is_empty()
    }

    /// The cache-instance registry owned by this broker.
    pub const fn cache_registry(&self) -> &CacheRegistry {
        &self.cache_registry
    }

    /// Shut down every registered store and clear the broker. A store
    /// that never connected shuts down as a no-op; the call resolves once
    /// every close has completed.
    pub async fn shutdown_all(&self) {
        let stores: Vec<(String, Store)> =
            self.stores.lock().await.drain().collect();
        for (key, store) in stores {
            store.shutdown().await;
            tracing::info!(key, "store shut down");
        }
        self.cache_registry.shutdown_all().await;
    }
}
