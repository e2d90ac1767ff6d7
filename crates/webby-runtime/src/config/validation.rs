//! Configuration validation utilities.

use webby_core::RobotConfig;

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, WebbyConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &WebbyConfig) -> ConfigResult<()> {
    validate_robot_config(&config.robot)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates the robot's identity and brain settings.
fn validate_robot_config(robot: &RobotConfig) -> ConfigResult<()> {
    if robot.name.trim().is_empty() {
        return Err(ConfigError::missing_field("robot.name"));
    }

    if let Some(alias) = &robot.alias {
        if alias.trim().is_empty() {
            return Err(ConfigError::validation("Robot alias cannot be empty"));
        }
        if alias.eq_ignore_ascii_case(&robot.name) {
            return Err(ConfigError::validation(format!(
                "Robot alias '{alias}' must differ from its name"
            )));
        }
    }

    if robot.brain.auto_save && robot.brain.save_interval_secs == 0 {
        return Err(ConfigError::validation(
            "Brain save interval must be greater than 0 when auto save is enabled",
        ));
    }

    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.filters.keys().any(|target| target.trim().is_empty()) {
        return Err(ConfigError::validation("Log filter targets cannot be empty"));
    }

    Ok(())
}
