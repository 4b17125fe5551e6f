//! Pooled relational store client with one-shot host failover.
//!
//! The relational strategy owns a bounded [`sqlx`] pool bound to one
//! endpoint descriptor. The pool is created lazily on first use: a
//! throwaway probe connection validates reachability, and a refused probe
//! flips the active host to the secondary (once per store instance,
//! ever -- flipping back requires constructing a new store) before the pool
//! is rebuilt. Callers that arrive before the pool exists park on the
//! readiness gate and are woken by the first successful probe.
//!
//! Checkout failures after the pool exists get one more chance: if the
//! checkout itself is refused, the same one-time flip applies and the
//! caller receives a direct, non-pooled connection so it is not stranded
//! behind a dead pool. Direct connections are closed on release, never
//! returned to the pool.

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, Connection, PgConnection, PgPool, Postgres};

use berth_core::descriptor::EndpointDescriptor;
use berth_core::gate::ReadinessGate;

use crate::error::{StoreError, classify_relational};

/// Which host a store is currently targeting, and whether the one
/// permitted failover flip has been spent.
#[derive(Debug)]
struct HostState {
    active_host: String,
    failed_over: bool,
}

impl HostState {
    fn new(descriptor: &EndpointDescriptor) -> Self {
        Self {
            active_host: descriptor.primary_host().to_owned(),
            failed_over: false,
        }
    }

    /// Spend the one failover flip, switching to `secondary` if present.
    ///
    /// With no secondary the flip degrades to retrying the primary. Returns
    /// whether anything changed; a second call is always a no-op.
    fn flip(&mut self, secondary: Option<&str>) -> bool {
        if self.failed_over {
            return false;
        }
        self.failed_over = true;
        if let Some(secondary) = secondary {
            tracing::warn!(
                from = %self.active_host,
                to = %secondary,
                "relational host unreachable, failing over to secondary"
            );
            self.active_host = secondary.to_owned();
        } else {
            tracing::warn!(
                host = %self.active_host,
                "relational host unreachable and no secondary configured, retrying primary"
            );
        }
        true
    }
}

/// A connection lent to exactly one caller between acquire and release.
pub enum RelationalLease {
    /// A pool member; returning to its originating pool on release.
    Pooled(sqlx::pool::PoolConnection<Postgres>),
    /// A direct fallback connection; closed on release, never pooled.
    Direct(Box<PgConnection>),
}

impl RelationalLease {
    /// Borrow the underlying connection to run queries on.
    pub fn connection(&mut self) -> &mut PgConnection {
        match self {
            Self::Pooled(conn) => conn,
            Self::Direct(conn) => conn,
        }
    }

    /// Dispose of the lease: pooled connections go back to the pool they
    /// came from, direct connections are closed outright. Close failures
    /// are logged, never propagated.
    pub async fn dispose(self) {
        match self {
            Self::Pooled(conn) => drop(conn),
            Self::Direct(conn) => {
                if let Err(err) = (*conn).close().await {
                    tracing::warn!(error = %err, "failed to close direct relational connection");
                }
            }
        }
    }
}

/// Pooled client for the relational store.
pub struct RelationalStore {
    descriptor: EndpointDescriptor,
    gate: ReadinessGate<PgPool>,
    state: tokio::sync::Mutex<HostState>,
}

impl RelationalStore {
    /// Create a store for `descriptor`. No I/O happens until the pool is
    /// first needed.
    pub fn new(descriptor: EndpointDescriptor) -> Self {
        let state = tokio::sync::Mutex::new(HostState::new(&descriptor));
        Self {
            descriptor,
            gate: ReadinessGate::new(),
            state,
        }
    }

    fn connect_options(&self, host: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(host)
            .port(self.descriptor.port())
            .username(self.descriptor.user())
            .password(self.descriptor.credential())
            .database(self.descriptor.database())
    }

    fn build_pool(&self, host: &str) -> PgPool {
        PgPoolOptions::new()
            .max_connections(self.descriptor.max_concurrency())
            .connect_lazy_with(self.connect_options(host))
    }

    /// Open a throwaway probe connection and release it immediately. The
    /// probe exists purely to validate reachability of the active host.
    async fn probe(pool: &PgPool, host: &str) -> Result<(), StoreError> {
        match pool.acquire().await {
            Ok(conn) => {
                drop(conn);
                Ok(())
            }
            Err(err) => Err(classify_relational(err, host)),
        }
    }

    /// Create the pool against the active host and open the readiness gate
    /// after the first successful probe.
    ///
    /// A refused probe flips the active host (once) and rebuilds the pool;
    /// with no secondary configured the rebuild retries the primary. Any
    /// other probe error -- auth failure, unknown database -- propagates
    /// unchanged and never flips.
    ///
    /// # Errors
    ///
    /// Returns the classified probe error if neither attempt succeeds; the
    /// gate stays closed so a later call can try again.
    pub async fn create_pool(&self) -> Result<(), StoreError> {
        if self.gate.is_open() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        // Double-checked: another caller may have finished while we waited
        // for the failover lock.
        if self.gate.is_open() {
            return Ok(());
        }

        let pool = self.build_pool(&state.active_host);
        match Self::probe(&pool, &state.active_host).await {
            Ok(()) => {
                tracing::info!(
                    host = %state.active_host,
                    max_connections = self.descriptor.max_concurrency(),
                    "relational pool ready"
                );
                self.gate.open(pool);
                Ok(())
            }
            Err(err) if err.is_unreachable() => {
                pool.close().await;
                state.flip(self.descriptor.secondary_host());
                let pool = self.build_pool(&state.active_host);
                if let Err(err) = Self::probe(&pool, &state.active_host).await {
                    pool.close().await;
                    return Err(err);
                }
                tracing::info!(
                    host = %state.active_host,
                    max_connections = self.descriptor.max_concurrency(),
                    "relational pool ready after failover"
                );
                self.gate.open(pool);
                Ok(())
            }
            Err(err) => {
                pool.close().await;
                Err(err)
            }
        }
    }

    /// Point the gate at a fresh pool for `active_host` and close the
    /// superseded pool so its connections are released deterministically.
    async fn replace_pool(&self, active_host: &str) {
        let stale = self.gate.try_get();
        self.gate.open(self.build_pool(active_host));
        if let Some(stale) = stale {
            stale.close().await;
        }
    }

    /// Check out a connection, creating the pool first if necessary.
    ///
    /// Callers beyond the pool's `max_concurrency` bound queue inside the
    /// pool itself, not on the readiness gate. A refused checkout spends
    /// the one-time failover flip and falls back to a direct, non-pooled
    /// connection so the caller is not blocked behind a dead pool.
    ///
    /// # Errors
    ///
    /// Returns the classified driver error for anything other than a
    /// recoverable refused checkout.
    pub async fn acquire(&self) -> Result<RelationalLease, StoreError> {
        if !self.gate.is_open() {
            self.create_pool().await?;
        }
        let pool = self.gate.wait().await?;
        let checkout_host = self.active_host().await;
        match pool.acquire().await {
            Ok(conn) => Ok(RelationalLease::Pooled(conn)),
            Err(err) => {
                let classified = classify_relational(err, &checkout_host);
                if !classified.is_unreachable() {
                    return Err(classified);
                }
                let mut state = self.state.lock().await;
                if state.flip(self.descriptor.secondary_host()) {
                    // Future checkouts should target the new host.
                    self.replace_pool(&state.active_host).await;
                }
                let host = state.active_host.clone();
                let conn = self
                    .connect_options(&host)
                    .connect()
                    .await
                    .map_err(|err| classify_relational(err, &host))?;
                tracing::warn!(host = %host, "pool checkout refused, caller given a direct connection");
                Ok(RelationalLease::Direct(Box::new(conn)))
            }
        }
    }

    /// Return a lease. Pooled connections rejoin their pool; direct
    /// fallback connections are closed. Never fails visibly.
    pub async fn release(&self, lease: RelationalLease) {
        lease.dispose().await;
    }

    /// The host currently targeted by this store. Starts as the primary
    /// and flips at most once.
    pub async fn active_host(&self) -> String {
        self.state.lock().await.active_host.clone()
    }

    /// Whether the one-time failover flip has been spent.
    pub async fn has_failed_over(&self) -> bool {
        self.state.lock().await.failed_over
    }

    /// The descriptor this store was built from.
    pub const fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    /// Close the pool if one was ever created. A store that never
    /// connected closes as a no-op.
    pub async fn close(&self) {
        if let Some(pool) = self.gate.try_get() {
            pool.close().await;
            tracing::info!("relational pool closed");
        }
    }
}
