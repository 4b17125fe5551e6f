//! Immutable endpoint descriptors.
//!
//! An [`EndpointDescriptor`] describes how to reach a store: the primary
//! host, an optional secondary host used for one-shot failover, credentials,
//! and a pool-size hint. Descriptors carry no behavior and never change
//! after construction; the mutable "which host is currently active" state
//! belongs to the client strategies, not to the descriptor.

use std::thread;

/// Lower bound on the derived pool-size hint.
const MIN_CONCURRENCY: u32 = 3;

/// Default pool-size hint: twice the available CPU cores plus one, never
/// below [`MIN_CONCURRENCY`].
fn default_max_concurrency() -> u32 {
    let cores = thread::available_parallelism()
        .map_or(1, std::num::NonZeroUsize::get);
    let cores = u32::try_from(cores).unwrap_or(u32::MAX);
    cores
        .saturating_mul(2)
        .saturating_add(1)
        .max(MIN_CONCURRENCY)
}

/// Immutable description of how to reach a store.
///
/// `secondary_host` may be absent, in which case failover degrades to
/// retrying the primary host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    primary_host: String,
    secondary_host: Option<String>,
    port: u16,
    user: String,
    credential: String,
    database: String,
    max_concurrency: u32,
}

impl EndpointDescriptor {
    /// Create a descriptor for `primary_host:port` with empty credentials
    /// and the CPU-derived pool-size default.
    pub fn new(primary_host: &str, port: u16) -> Self {
        Self {
            primary_host: primary_host.to_owned(),
            secondary_host: None,
            port,
            user: String::new(),
            credential: String::new(),
            database: String::new(),
            max_concurrency: default_max_concurrency(),
        }
    }

    /// Set the secondary (failover) host.
    #[must_use]
    pub fn with_secondary_host(mut self, host: &str) -> Self {
        self.secondary_host = Some(host.to_owned());
        self
    }

    /// Set the user name.
    #[must_use]
    pub fn with_user(mut self, user: &str) -> Self {
        self.user = user.to_owned();
        self
    }

    /// Set the credential (password).
    #[must_use]
    pub fn with_credential(mut self, credential: &str) -> Self {
        self.credential = credential.to_owned();
        self
    }

    /// Set the database / namespace name.
    #[must_use]
    pub fn with_database(mut self, database: &str) -> Self {
        self.database = database.to_owned();
        self
    }

    /// Set the pool-size hint. Values below the floor of 3 are raised to it.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: u32) -> Self {
        self.max_concurrency = max.max(MIN_CONCURRENCY);
        self
    }

    /// The primary host address.
    pub fn primary_host(&self) -> &str {
        &self.primary_host
    }

    /// The secondary host address, if one is configured.
    pub fn secondary_host(&self) -> Option<&str> {
        self.secondary_host.as_deref()
    }

    /// The TCP port shared by the primary and secondary hosts.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// The user name.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The credential (password).
    pub fn credential(&self) -> &str {
        &self.credential
    }

    /// The database / namespace name.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// The pool-size hint.
    pub const fn max_concurrency(&self) -> u32 {
        self.max_concurrency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_concurrency_respects_floor() {
        let descriptor = EndpointDescriptor::new("db.internal", 5432);
        assert!(descriptor.max_concurrency() >= MIN_CONCURRENCY);
    }

    #[test]
    fn explicit_concurrency_below_floor_is_raised() {
        let descriptor =
            EndpointDescriptor::new("db.internal", 5432).with_max_concurrency(1);
        assert_eq!(descriptor.max_concurrency(), MIN_CONCURRENCY);
    }

    #[test]
    fn builder_sets_all_fields() {
        let descriptor = EndpointDescriptor::new("10.0.0.1", 5432)
            .with_secondary_host("10.0.0.2")
            .with_user("app")
            .with_credential("secret")
            .with_database("orders")
            .with_max_concurrency(8);

        assert_eq!(descriptor.primary_host(), "10.0.0.1");
        assert_eq!(descriptor.secondary_host(), Some("10.0.0.2"));
        assert_eq!(descriptor.port(), 5432);
        assert_eq!(descriptor.user(), "app");
        assert_eq!(descriptor.credential(), "secret");
        assert_eq!(descriptor.database(), "orders");
        assert_eq!(descriptor.max_concurrency(), 8);
    }

    #[test]
    fn secondary_host_defaults_to_none() {
        let descriptor = EndpointDescriptor::new("db.internal", 5432);
        assert_eq!(descriptor.secondary_host(), None);
    }
}
