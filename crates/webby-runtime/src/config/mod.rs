//! Configuration module for the Webby runtime.
//!
//! Loads [`WebbyConfig`] from TOML/YAML files and `WEBBY_*` environment
//! variables, then validates it.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SpanEventConfig, WebbyConfig,
};
pub use validation::validate_config;
pub use webby_core::{BrainConfig, RobotConfig};
