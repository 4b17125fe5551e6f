//! Error taxonomy for the client strategies.
//!
//! The broker recovers from exactly two conditions: a refused connection to
//! the primary host (one-shot failover) and not-yet-ready stores (callers
//! park on the readiness gate). Everything else is passed through to the
//! caller verbatim via the native-error variants below -- no retry, no
//! reinterpretation, no extra wrapping.

use berth_core::gate::GateError;

/// Errors surfaced by the relational, cache, and document clients.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The host refused the connection. This is the only condition that
    /// triggers the one-time failover flip to the secondary host.
    #[error("host unreachable: {host}")]
    Unreachable {
        /// The host that refused the connection.
        host: String,
    },

    /// Credentials were rejected. Never retried, never a failover trigger.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// The descriptor or connection options are invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A cache operation was attempted before any connection was
    /// established, or after `quit()`.
    #[error("store is not ready: no live connection")]
    NotReady,

    /// A document handle was requested before readiness was awaited. This
    /// is a caller bug, not a transient condition; await `client()` first.
    #[error("document store used before its client connected")]
    NotConnected,

    /// The readiness gate closed or a deadline-bounded wait ran out.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// A relational driver error, passed through verbatim.
    #[error("relational error: {0}")]
    Relational(#[from] sqlx::Error),

    /// A cache driver error, passed through verbatim.
    #[error("cache error: {0}")]
    Cache(#[from] fred::error::Error),

    /// A document driver error, passed through verbatim.
    #[error("document error: {0}")]
    Document(#[from] mongodb::error::Error),
}

impl StoreError {
    /// Whether this error is the connection-refused class that triggers
    /// failover.
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

/// SQLSTATE class 28 covers authorization failures (28000 invalid
/// authorization specification, 28P01 invalid password).
fn is_auth_sqlstate(code: &str) -> bool {
    code.starts_with("28")
}

/// Classify a relational driver error into the broker taxonomy.
///
/// A refused TCP connection becomes [`StoreError::Unreachable`] (the
/// failover trigger); an authorization SQLSTATE becomes
/// [`StoreError::AuthFailure`]; invalid connection options become
/// [`StoreError::Config`]; anything else passes through verbatim.
pub fn classify_relational(err: sqlx::Error, host: &str) -> StoreError {
    match &err {
        sqlx::Error::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            StoreError::Unreachable {
                host: host.to_owned(),
            }
        }
        sqlx::Error::Database(db) => {
            if db.code().is_some_and(|code| is_auth_sqlstate(&code)) {
                return StoreError::AuthFailure(db.message().to_owned());
            }
            StoreError::Relational(err)
        }
        sqlx::Error::Configuration(_) => StoreError::Config(err.to_string()),
        _ => StoreError::Relational(err),
    }
}
