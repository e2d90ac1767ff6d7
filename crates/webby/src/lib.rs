//! # Webby
//!
//! A chat bot framework. Scripts register listeners on a [`Robot`], adapters
//! feed it messages from a chat service, and three middleware pipelines let
//! you observe or rewrite what flows through.
//!
//! ## Architecture
//!
//! ```text
//! Adapter ──▶ receive middleware ──▶ listeners ──▶ listener middleware ──▶ callback
//!    ▲                                                                        │
//!    └─────────── adapter method ◀── response middleware ◀── Response::send ◀─┘
//! ```
//!
//! - **Adapter**: connects to a chat service and calls [`Robot::receive`]
//! - **Listeners**: a matcher plus a callback, run in registration order
//! - **Middleware**: ordered steps with cleanups that run in reverse
//! - **Brain**: user records and key/value data with save events
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use webby::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = WebbyRuntime::new();
//!     let robot = runtime.robot(ShellAdapter::new());
//!
//!     robot.respond(Regex::new(r"(?i)ping")?, |res: Response| async move {
//!         res.reply(["PONG"]).await;
//!     })?;
//!
//!     runtime.run(&robot).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use webby_core as core;
pub use webby_runtime as runtime;

pub use webby_core::Robot;

/// Commonly used types for writing scripts and adapters.
///
/// ```rust,ignore
/// use webby::prelude::*;
/// ```
pub mod prelude {
    pub use webby_core::prelude::*;
    pub use webby_runtime::WebbyRuntime;
}
