//! Unified error types for the Webby core.
//!
//! Every failure on the dispatch path is recovered locally and funneled into
//! the robot's error channel as a [`BotError`]. Registration-time mistakes
//! are returned directly to the caller.

use std::any::Any;

use thiserror::Error;

/// Boxed error type accepted from user code (callbacks, middleware, adapters).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Adapter Errors
// =============================================================================

/// Errors that can occur while an adapter delivers or runs.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// The adapter does not implement this operation.
    #[error("operation '{0}' is not supported by this adapter")]
    NotSupported(&'static str),

    /// The adapter has already been closed.
    #[error("adapter is closed")]
    Closed,

    /// Internal adapter error.
    #[error("adapter error: {0}")]
    Internal(String),
}

impl AdapterError {
    /// Creates an internal adapter error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

// =============================================================================
// Bot Errors
// =============================================================================

/// Errors reported by the robot, either returned at registration time or
/// delivered to error handlers during dispatch.
#[derive(Debug, Error)]
pub enum BotError {
    /// A listener or middleware was registered with missing or malformed parts.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A listener pattern could not be compiled.
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A listener callback failed.
    #[error("listener {} failed: {source}", .listener.as_deref().unwrap_or("<anonymous>"))]
    ListenerCallback {
        /// The listener id, if one was configured.
        listener: Option<String>,
        /// The error returned by the callback.
        source: BoxError,
    },

    /// A middleware function failed; the pipeline was treated as blocked.
    #[error("middleware failed: {0}")]
    Middleware(BoxError),

    /// The adapter failed to deliver a message.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// User code panicked; the panic was caught.
    #[error("panicked: {0}")]
    Panicked(String),

    /// A failure outside of any dispatch, with no associated response.
    #[error("uncaught error: {0}")]
    Uncaught(String),
}

impl BotError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Builds a [`BotError::Panicked`] from a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for robot operations.
pub type BotResult<T> = Result<T, BotError>;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_stringified() {
        let err = BotError::from_panic(Box::new("boom"));
        assert_eq!(err.to_string(), "panicked: boom");

        let err = BotError::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(err.to_string(), "panicked: owned boom");

        let err = BotError::from_panic(Box::new(42_u8));
        assert_eq!(err.to_string(), "panicked: unknown panic payload");
    }

    #[test]
    fn listener_errors_name_the_listener() {
        let err = BotError::ListenerCallback {
            listener: Some("ping".into()),
            source: "nope".into(),
        };
        assert_eq!(err.to_string(), "listener ping failed: nope");

        let err = BotError::ListenerCallback {
            listener: None,
            source: "nope".into(),
        };
        assert_eq!(err.to_string(), "listener <anonymous> failed: nope");
    }
}
