//! Error types for ChartSync
//!
//! This module defines the recoverable error conditions surfaced by the
//! public API. We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! ## Error policy
//!
//! Only conditions a caller can reasonably react to are represented here:
//! acquisition timeouts, a rejected write-to-read downgrade, and worker
//! startup failure. Caller bugs (unbalanced unlock calls, write-unlock from a
//! thread that does not own the lock, removing a listener that was registered
//! twice) are programming errors and panic instead, in the style of
//! `RefCell`: they indicate a bug at the call site, not a runtime condition
//! to recover from.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for ChartSync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Recoverable error conditions for ChartSync operations
#[derive(Debug, Error)]
pub enum Error {
    /// A timed lock acquisition did not succeed within the given window.
    ///
    /// Retry, back off, or abandon at the caller's discretion. The lock
    /// state is unchanged: no stamp is held after this error.
    #[error("could not acquire {operation} lock within {timeout:?}")]
    AcquireTimeout {
        /// Which acquisition timed out ("read" or "write")
        operation: &'static str,
        /// The timeout that elapsed
        timeout: Duration,
    },

    /// A write-to-read downgrade was rejected.
    ///
    /// Downgrading is only legal while the write lock is held exactly once
    /// by the calling thread; nested write holds must be released first.
    #[error("write-to-read downgrade rejected: {0}")]
    DowngradeRejected(&'static str),

    /// The background worker thread could not be spawned.
    #[error("failed to spawn event-processor worker: {0}")]
    WorkerSpawn(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_names_operation() {
        let err = Error::AcquireTimeout {
            operation: "write",
            timeout: Duration::from_millis(50),
        };
        let msg = err.to_string();
        assert!(msg.contains("write"));
        assert!(msg.contains("50ms"));
    }

    #[test]
    fn test_downgrade_display() {
        let err = Error::DowngradeRejected("nested write holds outstanding");
        assert!(err.to_string().contains("downgrade rejected"));
    }
}
