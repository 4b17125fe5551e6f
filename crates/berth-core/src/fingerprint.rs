//! Stable `host:port` fingerprints for client-instance dedup.
//!
//! The cache strategy keeps one live client per endpoint, process-wide.
//! A [`Fingerprint`] is the registry key: two requests for the same host
//! and port (case and whitespace insensitive on the host) must produce
//! equal fingerprints so they resolve to the same shared instance.

use std::fmt;

/// A stable key derived from host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derive the fingerprint for `host:port`.
    pub fn new(host: &str, port: u16) -> Self {
        Self(format!("{}:{port}", host.trim().to_ascii_lowercase()))
    }

    /// The normalized `host:port` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
