//! Error types for cancel-sleep.
//!
//! Cancellation is the only failure an awaitable produces on its own. The
//! reason travels with the error so callers can tell a context deadline from
//! an explicit cancel.

use serde::Serialize;
use thiserror::Error;

/// Why a context or awaitable was canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// `cancel()` was called on the context or the awaitable.
    Canceled,
    /// The context timeout elapsed.
    DeadlineExceeded,
    /// The awaitable was dropped before it settled.
    Dropped,
}

impl CancelReason {
    /// Returns the reason as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Canceled => "context canceled",
            Self::DeadlineExceeded => "context deadline exceeded",
            Self::Dropped => "awaitable dropped before completion",
        }
    }

    /// Returns true if the reason originates from a context.
    #[must_use]
    pub const fn is_context(self) -> bool {
        matches!(self, Self::Canceled | Self::DeadlineExceeded)
    }
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for cancel-sleep operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The operation ended because it was canceled.
    #[error("operation canceled: {0}")]
    Canceled(CancelReason),

    /// A second context was attached to an awaitable that already has one.
    #[error("a cancellation context is already attached")]
    ContextAlreadyAttached,
}

impl Error {
    /// Returns true if this error is a cancellation.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub const fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            Self::Canceled(reason) => Some(*reason),
            Self::ContextAlreadyAttached => None,
        }
    }
}

impl From<CancelReason> for Error {
    fn from(reason: CancelReason) -> Self {
        Self::Canceled(reason)
    }
}

/// Result type alias for cancel-sleep operations.
pub type Result<T> = std::result::Result<T, Error>;
