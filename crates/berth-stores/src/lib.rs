//! Client strategies for the berth connection broker.
//!
//! Each external store kind gets its own acquisition strategy, matched to
//! how the underlying service behaves:
//!
//! ```text
//! caller
//!   |
//!   +-- RelationalStore  -- bounded sqlx pool, one-shot host failover,
//!   |                       direct-connection fallback
//!   +-- CacheStore       -- single long-lived fred client, interval
//!   |                       refresh, fingerprint identity
//!   +-- DocumentStore    -- mongodb client retried on a fixed delay
//!                           until the first connect succeeds
//! ```
//!
//! All three resolve callers through the readiness gate from `berth-core`:
//! a caller asking for a handle before the first connect completes is
//! parked and woken once the handle exists. Failover and readiness are the
//! only locally-recovered conditions; every other error surfaces to the
//! caller unchanged, wrapped in [`StoreError`] without reinterpretation.
//!
//! # Modules
//!
//! - [`relational`] -- pooled relational store client
//! - [`cache`] -- persistent cache store client
//! - [`document`] -- polling document store client
//! - [`error`] -- shared error taxonomy

pub mod cache;
pub mod document;
pub mod error;
pub mod relational;

// Re-export primary types for convenience.
pub use cache::{CacheEndpoint, CacheStore};
pub use document::{DocumentCollection, DocumentDb, DocumentEndpoint, DocumentStore};
pub use error::StoreError;
pub use relational::{RelationalLease, RelationalStore};
