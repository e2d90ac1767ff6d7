//! Robot configuration.
//!
//! These types live in the core so a robot can be built without the runtime
//! crate. The runtime embeds [`RobotConfig`] in its root configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for a single robot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotConfig {
    /// The name the robot answers to.
    #[serde(default = "default_name")]
    pub name: String,

    /// An alternative name the robot also answers to.
    #[serde(default)]
    pub alias: Option<String>,

    /// Brain settings.
    #[serde(default)]
    pub brain: BrainConfig,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            alias: None,
            brain: BrainConfig::default(),
        }
    }
}

impl RobotConfig {
    /// Creates a config with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

fn default_name() -> String {
    "Webby".to_string()
}

/// Brain persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrainConfig {
    /// Whether the brain periodically emits save events.
    #[serde(default = "default_auto_save")]
    pub auto_save: bool,

    /// Seconds between save events.
    #[serde(default = "default_save_interval_secs")]
    pub save_interval_secs: u64,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            auto_save: default_auto_save(),
            save_interval_secs: default_save_interval_secs(),
        }
    }
}

impl BrainConfig {
    /// Returns the save interval as a [`Duration`].
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }
}

fn default_auto_save() -> bool {
    true
}

fn default_save_interval_secs() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RobotConfig::default();
        assert_eq!(config.name, "Webby");
        assert_eq!(config.alias, None);
        assert!(config.brain.auto_save);
        assert_eq!(config.brain.save_interval(), Duration::from_secs(5));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: RobotConfig = serde_json::from_str(r#"{"alias": "Megan"}"#).unwrap();
        assert_eq!(config.name, "Webby");
        assert_eq!(config.alias.as_deref(), Some("Megan"));
        assert_eq!(config.brain, BrainConfig::default());
    }
}
