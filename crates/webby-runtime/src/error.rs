//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while running a robot.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The robot or its adapter failed.
    #[error("Robot error: {0}")]
    Bot(#[from] webby_core::BotError),

    /// Installing a signal handler failed.
    #[error("Failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
