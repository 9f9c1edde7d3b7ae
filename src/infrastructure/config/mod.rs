//! Configuration management

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::application::errors::ConfigError;
use crate::plugins::{ManagerSettings, Privileges, RuntimeSettings};

/// Bot configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub runtime: RuntimeConfig,
    pub plugins: PluginConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    pub name: String,
    /// Sender id of the bot itself; its messages are never commands
    pub id: String,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RuntimeConfig {
    pub queue_capacity: usize,
    pub worker_capacity: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PluginConfig {
    pub disabled: Vec<String>,
    /// Program hosting process-mode plugins; the running binary by default
    pub process_host: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SecurityConfig {
    pub admins: Vec<String>,
    pub moderators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "courier-bot".to_string(),
            id: "courier".to_string(),
            prefix: "!".to_string(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            worker_capacity: 32,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to write config: {}", e)))
    }

    /// Defaults overridden by the environment
    pub fn load_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Apply `BOT_NAME`, `BOT_PREFIX` and `BOT_LOG`
    pub fn apply_env(&mut self) {
        if let Ok(name) = std::env::var("BOT_NAME") {
            self.bot.name = name;
        }
        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            self.bot.prefix = prefix;
        }
        if let Ok(level) = std::env::var("BOT_LOG") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue("bot.name must not be empty".to_string()));
        }
        if self.runtime.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "runtime.queue-capacity must be positive".to_string(),
            ));
        }
        if self.runtime.worker_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "runtime.worker-capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn privileges(&self) -> Privileges {
        Privileges::new(
            self.security.admins.iter().cloned(),
            self.security.moderators.iter().cloned(),
        )
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            queue_capacity: self.runtime.queue_capacity,
            prefix: self.bot.prefix.clone(),
            manager: ManagerSettings {
                worker_capacity: self.runtime.worker_capacity,
                process_host: self.plugins.process_host.clone(),
                disabled: self.plugins.disabled.clone(),
                privileges: Arc::new(self.privileges()),
            },
        }
    }
}
