//! Core types for the berth connection broker.
//!
//! Berth brokers pooled connections to external stateful services: a
//! relational database, a Redis-compatible cache, and a document store.
//! This crate holds the driver-free leaf types shared by every client
//! strategy:
//!
//! - [`descriptor`] -- immutable endpoint descriptors (hosts, credentials,
//!   pool sizing)
//! - [`gate`] -- the readiness gate callers wait on until a store's first
//!   connection succeeds
//! - [`fingerprint`] -- stable `host:port` keys used to deduplicate
//!   singleton client instances
//!
//! The client strategies themselves live in `berth-stores`; the facade that
//! selects between them lives in `berth-broker`.

pub mod descriptor;
pub mod fingerprint;
pub mod gate;

// Re-export primary types for convenience.
pub use descriptor::EndpointDescriptor;
pub use fingerprint::Fingerprint;
pub use gate::{GateError, ReadinessGate};
