//! Webby Runtime - process-level glue for the Webby chat bot.
//!
//! This crate provides:
//! - Layered configuration loading (`webby.toml`, `WEBBY_*` variables)
//! - Logging setup from configuration
//! - [`WebbyRuntime`], which builds a robot from configuration and runs it
//!   until Ctrl+C, SIGTERM or a custom shutdown future
//!
//! ```ignore
//! use webby_runtime::WebbyRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = WebbyRuntime::new();
//!     let robot = runtime.robot(MyAdapter::new());
//!     scripts::load(&robot)?;
//!     runtime.run(&robot).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, LoggingConfig, WebbyConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RuntimeBuilder, WebbyRuntime};

// Re-export tracing for use by scripts and adapters
pub use tracing;
pub use tracing_subscriber;

/// Logging macros and span helpers.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
