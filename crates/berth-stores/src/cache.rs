//! Persistent cache store client (single long-lived connection).
//!
//! The cache strategy holds exactly one [`fred`] client per endpoint
//! fingerprint. The connection is re-created whenever it is older than the
//! refresh interval, both on explicit [`CacheStore::connect`] calls and on
//! a background timer that sweeps at the same interval -- this guards
//! against silently dead idle connections without a liveness probe. A
//! fresh connection makes both paths a no-op, and a single-flight lock
//! serializes them so two connections for one fingerprint can never be
//! live at once.
//!
//! [`CacheStore::quit`] cancels the sweep and closes the connection;
//! afterwards every operation fails with [`StoreError::NotReady`].

use std::sync::Arc;
use std::time::Duration;

use fred::prelude::*;
use fred::types::Expiration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use berth_core::fingerprint::Fingerprint;

use crate::error::StoreError;

/// How long a connection stays fresh before the next sweep replaces it.
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(44_444);

/// TTL applied by `set` when the caller does not supply one.
const DEFAULT_TTL_SECS: i64 = 86_400;

/// How to reach the cache store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEndpoint {
    /// Cache host address.
    pub host: String,
    /// Cache TCP port.
    pub port: u16,
    /// Optional password.
    pub password: Option<String>,
}

impl CacheEndpoint {
    /// Create an endpoint with no password.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_owned(),
            port,
            password: None,
        }
    }

    /// The identity key for this endpoint.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(&self.host, self.port)
    }

    /// Render the `redis://` connection URL.
    pub fn connection_url(&self) -> String {
        self.password.as_ref().map_or_else(
            || format!("redis://{}:{}", self.host, self.port),
            |password| format!("redis://:{password}@{}:{}", self.host, self.port),
        )
    }
}

/// Whether a connection stamped at `last_refreshed_at` is due for
/// replacement.
fn is_stale(last_refreshed_at: Option<Instant>, interval: Duration) -> bool {
    last_refreshed_at.is_none_or(|at| at.elapsed() >= interval)
}

#[derive(Default)]
struct CacheInner {
    client: Option<Client>,
    last_refreshed_at: Option<Instant>,
    refresh_task: Option<JoinHandle<()>>,
}

/// Single-connection client for the cache store.
///
/// Obtain instances through the broker's cache registry so that one
/// fingerprint maps to one shared store.
pub struct CacheStore {
    endpoint: CacheEndpoint,
    fingerprint: Fingerprint,
    refresh_interval: Duration,
    inner: tokio::sync::Mutex<CacheInner>,
}

impl CacheStore {
    /// Create a store for `endpoint` with the default refresh interval.
    /// No I/O happens until [`CacheStore::connect`].
    pub fn new(endpoint: CacheEndpoint) -> Self {
        Self::with_refresh_interval(endpoint, DEFAULT_REFRESH_INTERVAL)
    }

    /// Create a store with an explicit refresh interval.
    pub fn with_refresh_interval(endpoint: CacheEndpoint, refresh_interval: Duration) -> Self {
        let fingerprint = endpoint.fingerprint();
        Self {
            endpoint,
            fingerprint,
            refresh_interval,
            inner: tokio::sync::Mutex::new(CacheInner::default()),
        }
    }

    /// The identity key of this store.
    pub const fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Connect, replacing a stale connection; a fresh one is left alone.
    ///
    /// Serialized under the store's single-flight lock: the refresh sweep
    /// and explicit callers can never race two connections into existence
    /// for the same fingerprint. The first successful call also starts the
    /// background sweep.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] if the driver cannot connect, or
    /// [`StoreError::Config`] if the connection URL does not parse.
    pub async fn connect(self: &Arc<Self>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.client.is_some() && !is_stale(inner.last_refreshed_at, self.refresh_interval) {
            return Ok(());
        }

        if let Some(old) = inner.client.take() {
            if let Err(err) = old.quit().await {
                tracing::warn!(
                    fingerprint = %self.fingerprint,
                    error = %err,
                    "failed to quit stale cache connection"
                );
            }
        }

        let config = Config::from_url(&self.endpoint.connection_url())
            .map_err(|err| StoreError::Config(format!("invalid cache URL: {err}")))?;
        let client = Builder::from_config(config).build()?;
        client.init().await?;

        inner.client = Some(client);
        inner.last_refreshed_at = Some(Instant::now());
        tracing::info!(fingerprint = %self.fingerprint, "cache connection established");

        if inner.refresh_task.is_none() {
            inner.refresh_task = Some(self.spawn_refresh());
        }
        Ok(())
    }

    /// Spawn the background sweep that re-runs `connect` every refresh
    /// interval. The sweep holds only a weak reference, so a store dropped
    /// without `quit` does not keep itself alive; `quit` aborts it
    /// eagerly.
    fn spawn_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        let refresh_interval = self.refresh_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            // The first tick completes immediately; skip it, the
            // connection was just stamped.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else { break };
                if let Err(err) = store.connect().await {
                    tracing::warn!(
                        fingerprint = %store.fingerprint,
                        error = %err,
                        "cache refresh sweep failed to reconnect"
                    );
                }
            }
        })
    }

    async fn client(&self) -> Result<Client, StoreError> {
        self.inner
            .lock()
            .await
            .client
            .clone()
            .ok_or(StoreError::NotReady)
    }

    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotReady`] if no connection has ever been
    /// established (or the store was quit), or [`StoreError::Cache`] for
    /// driver errors, verbatim.
    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let client = self.client().await?;
        Ok(client.get(key).await?)
    }

    /// Write a value with a TTL (default one day).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotReady`] with no live connection, or
    /// [`StoreError::Cache`] for driver errors, verbatim.
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let client = self.client().await?;
        let ttl_secs = ttl.map_or(DEFAULT_TTL_SECS, |ttl| {
            i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
        });
        let _: () = client
            .set(key, value, Some(Expiration::EX(ttl_secs)), None, false)
            .await?;
        Ok(())
    }

    /// Delete a key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotReady`] with no live connection, or
    /// [`StoreError::Cache`] for driver errors, verbatim.
    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let client = self.client().await?;
        let _: u32 = client.del(key).await?;
        Ok(())
    }

    /// When the current connection was established, if one exists.
    pub async fn last_refreshed_at(&self) -> Option<Instant> {
        self.inner.lock().await.last_refreshed_at
    }

    /// Whether a connection is currently live.
    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.client.is_some()
    }

    /// Cancel the refresh sweep and close the connection. Subsequent
    /// operations fail with [`StoreError::NotReady`]. Idempotent; never
    /// fails visibly.
    pub async fn quit(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(task) = inner.refresh_task.take() {
            task.abort();
        }
        if let Some(client) = inner.client.take() {
            if let Err(err) = client.quit().await {
                tracing::warn!(
                    fingerprint = %self.fingerprint,
                    error = %err,
                    "failed to quit cache connection"
                );
            }
            tracing::info!(fingerprint = %self.fingerprint, "cache connection closed");
        }
        inner.last_refreshed_at = None;
    }
}
