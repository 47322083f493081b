//! Error taxonomy for the shell core
//!
//! Every fallible core operation returns `Result<_, ShellError>`. Failures of
//! caller-supplied routines (reloads, surface factories) arrive as
//! `anyhow::Error` and are carried through unchanged so the full cause chain
//! is still available to `logging::except`.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::display::DisplayIdentity;

/// Errors produced by the concurrency and lifecycle core
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// A reload or deferred wait exceeded its bound
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A timeout of zero or below was requested
    #[error("invalid timeout {0}ms, timeout has to be > 0")]
    InvalidTimeout(i64),

    /// The cancellation signal fired before the work started
    #[error("aborted before start")]
    Aborted,

    /// A surface factory failed for one display
    #[error("failed to construct surface for display {identity}")]
    ConstructionFailure {
        identity: String,
        #[source]
        source: anyhow::Error,
    },

    /// A surface factory completed without producing a surface
    #[error("surface factory produced nothing for display {0}")]
    EmptySurface(String),

    /// No compositor counterpart exists for a display
    #[error("could not map display {0} to any compositor monitor")]
    IdentityMismatch(String),

    /// A deferred completion handle was rejected by its producer
    #[error("deferred completion rejected")]
    Rejected(#[source] Rejection),

    /// A caller-supplied routine failed
    #[error(transparent)]
    Task(#[from] anyhow::Error),
}

/// Failure a deferred completion handle was rejected with.
///
/// Shared between every waiter; the cause chain of the original error stays
/// reachable through `source()`.
#[derive(Debug, Clone)]
pub struct Rejection(Arc<anyhow::Error>);

impl Rejection {
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    pub fn msg(message: &str) -> Self {
        Self::new(anyhow::anyhow!(message.to_string()))
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StdError for Rejection {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        StdError::source(&**self.0)
    }
}

impl ShellError {
    pub fn construction_failure(identity: &DisplayIdentity, source: anyhow::Error) -> Self {
        Self::ConstructionFailure {
            identity: identity.to_string(),
            source,
        }
    }

    pub fn empty_surface(identity: &DisplayIdentity) -> Self {
        Self::EmptySurface(identity.to_string())
    }

    pub fn identity_mismatch(identity: &DisplayIdentity) -> Self {
        Self::IdentityMismatch(identity.to_string())
    }

    /// Whether this failure is a timeout; callers decide if that is fatal
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Convert a millisecond timeout into a `Duration`, rejecting zero and below
pub fn timeout_from_millis(millis: i64) -> Result<Duration, ShellError> {
    if millis <= 0 {
        return Err(ShellError::InvalidTimeout(millis));
    }
    Ok(Duration::from_millis(millis as u64))
}
