//! Error types for lease operations

use std::time::Duration;

/// Outcomes a caller is expected to branch on.
///
/// Neither variant is fatal to the rotator: an unknown namespace is a
/// configuration problem on the caller's side, and an exhausted namespace
/// clears itself once the soonest cooldown elapses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unknown namespace: {0}")]
    UnknownNamespace(String),

    #[error("no available proxy in namespace {namespace} (retry after {}ms)", retry_after.as_millis())]
    NoAvailableResource {
        namespace: String,
        retry_after: Duration,
    },
}

impl Error {
    /// Metrics label for the failure kind.
    pub fn label(&self) -> &'static str {
        match self {
            Error::UnknownNamespace(_) => "unknown_namespace",
            Error::NoAvailableResource { .. } => "no_available_resource",
        }
    }
}

/// Result alias for rotator operations.
pub type Result<T> = std::result::Result<T, Error>;
