//! Broker facade for the berth connection broker.
//!
//! The facade is the single entry point the surrounding application calls:
//! it registers stores by kind, hands back a uniform
//! acquire/release/shutdown handle per store, and tears everything down at
//! process shutdown.
//!
//! ```text
//! caller --> Broker --> (Relational | Cache | Document) client
//!                           |
//!                           +-- readiness gate if not yet connected
//!                           +-- native driver handle
//! ```
//!
//! # Modules
//!
//! - [`broker`] -- store registration, the uniform [`broker::Store`]
//!   handle, and `shutdown_all`
//! - [`registry`] -- the fingerprint-keyed cache-instance registry
//! - [`config`] -- YAML + environment configuration loading

pub mod broker;
pub mod config;
pub mod registry;

// Re-export primary types for convenience.
pub use broker::{Broker, BrokerError, Lease, Store, StoreConfig, StoreKind};
pub use config::{BrokerConfig, ConfigError};
pub use registry::CacheRegistry;
