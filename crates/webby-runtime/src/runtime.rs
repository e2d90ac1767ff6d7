//! Process lifecycle for a robot.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use webby_runtime::WebbyRuntime;
//!
//! // Loads webby.toml from the current directory and WEBBY_* variables
//! let runtime = WebbyRuntime::new();
//! let robot = runtime.robot(MyAdapter::new());
//!
//! robot.hear(Regex::new("ping")?, |res: Response| async move {
//!     res.send(["pong"]).await;
//! });
//!
//! runtime.run(&robot).await?;
//! ```

use std::future::Future;

use tokio::signal;
use tracing::{debug, info};
use webby_core::{Adapter, Robot};

use crate::config::{ConfigLoader, ConfigResult, WebbyConfig};
use crate::error::RuntimeResult;
use crate::logging;

/// Loads configuration, sets up logging and drives a [`Robot`] until shutdown.
///
/// # Custom Configuration
///
/// ```rust,ignore
/// let runtime = WebbyRuntime::builder()
///     .config_file("config/webby.toml")
///     .profile("production")
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct WebbyRuntime {
    config: WebbyConfig,
}

impl WebbyRuntime {
    /// Creates a runtime, searching the current directory for configuration.
    ///
    /// Falls back to defaults when the configuration cannot be loaded.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                WebbyConfig::default()
            });

        Self::from_config(&config)
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    ///
    /// Installs the global log subscriber unless one is already set.
    pub fn from_config(config: &WebbyConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            robot = %config.robot.name,
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
        }
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &WebbyConfig {
        &self.config
    }

    /// Builds a robot from the configured identity and brain settings.
    pub fn robot(&self, adapter: impl Adapter) -> Robot {
        Robot::new(self.config.robot.clone(), adapter)
    }

    /// Runs the robot until Ctrl+C or SIGTERM.
    pub async fn run(&self, robot: &Robot) -> RuntimeResult<()> {
        let shutdown = shutdown_signal()?;
        info!("Webby is now running. Press Ctrl+C to stop.");
        self.run_until(robot, shutdown).await
    }

    /// Runs the robot until `shutdown` resolves.
    ///
    /// The adapter's `run` may return early when it drives its work from
    /// spawned tasks; the robot keeps serving until `shutdown`. An adapter
    /// error ends the run immediately. The robot is shut down either way.
    pub async fn run_until<F>(&self, robot: &Robot, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        info!(robot = %robot.name(), adapter = robot.adapter().name(), "Starting robot");

        let run = robot.run();
        tokio::pin!(run);
        tokio::pin!(shutdown);

        let mut adapter_returned = false;
        let result = loop {
            tokio::select! {
                res = &mut run, if !adapter_returned => match res {
                    Ok(()) => {
                        debug!("Adapter returned, waiting for shutdown");
                        adapter_returned = true;
                    }
                    Err(err) => break Err(err.into()),
                },
                () = &mut shutdown => break Ok(()),
            }
        };

        robot.shutdown().await;
        info!(robot = %robot.name(), "Robot stopped");

        result
    }
}

impl Default for WebbyRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
///
/// Handlers are registered before returning so registration errors surface
/// to the caller.
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        Ok(async move {
            tokio::select! {
                _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            }
        })
    }

    #[cfg(not(unix))]
    {
        Ok(async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for Ctrl+C, shutting down");
                return;
            }
            info!("Received Ctrl+C, shutting down");
        })
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`WebbyRuntime`] with custom configuration.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder searching the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Layers a programmatic configuration under files and environment.
    pub fn merge(mut self, config: WebbyConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads the configuration and builds the runtime.
    pub fn build(self) -> ConfigResult<WebbyRuntime> {
        let config = self.config_loader.load()?;
        Ok(WebbyRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
