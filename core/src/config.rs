/// Configuration management for goalrt.
/// Handles discovery, parsing, environment overrides and validation of
/// .goalrt/config.toml
use crate::debugger::Channel;
use crate::errors::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "GOALRT_CONFIG";

/// Config file looked up in the working directory
pub const LOCAL_CONFIG: &str = ".goalrt/config.toml";

/// Top-level configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalrtConfig {
    /// Debugger and bridge settings
    #[serde(default)]
    pub debugger: DebuggerConfig,

    /// Agent runner settings
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebuggerConfig {
    /// How long a controller waits for an announced entity to register
    #[serde(default = "default_registration_timeout_ms")]
    pub registration_timeout_ms: u64,

    /// How long a requester waits for a query reply
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,

    /// Pause set of newly created debuggers
    #[serde(default = "default_pause_channels")]
    pub default_pause_channels: Vec<Channel>,
}

impl DebuggerConfig {
    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            registration_timeout_ms: default_registration_timeout_ms(),
            reply_timeout_ms: default_reply_timeout_ms(),
            default_pause_channels: default_pause_channels(),
        }
    }
}

fn default_registration_timeout_ms() -> u64 {
    10_000
}

fn default_reply_timeout_ms() -> u64 {
    5_000
}

fn default_pause_channels() -> Vec<Channel> {
    vec![
        Channel::ActionExecutedBuiltin,
        Channel::ActionExecutedUserspec,
        Channel::ActionExecutedMessaging,
        Channel::GoalAchieved,
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Upper bound on reasoning cycles per agent (0 = unbounded)
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u64,

    /// Sleep between cycles
    #[serde(default)]
    pub cycle_delay_ms: u64,

    /// Entries kept for why/why-not explanations
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl RuntimeConfig {
    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
            cycle_delay_ms: 0,
            history_limit: default_history_limit(),
        }
    }
}

fn default_max_cycles() -> u64 {
    100
}

fn default_history_limit() -> usize {
    100
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Configuration manager
pub struct ConfigManager {
    config: GoalrtConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from `config_path`, else `$GOALRT_CONFIG`, else
    /// `.goalrt/config.toml`, else defaults. Environment overrides are applied
    /// and the result validated.
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        let path = Self::discover(config_path);
        let config = match &path {
            Some(path) => {
                info!("Loading config from {:?}", path);
                Self::read(path)?
            }
            None => {
                debug!("No config file found, using defaults");
                GoalrtConfig::default()
            }
        };

        let mut manager = ConfigManager {
            config,
            config_path: path,
        };
        manager.load_from_env();
        manager.validate()?;
        Ok(manager)
    }

    pub fn from_config(config: GoalrtConfig) -> Self {
        Self {
            config,
            config_path: None,
        }
    }

    fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            debug!("Found {} environment variable: {}", CONFIG_ENV, path);
            return Some(PathBuf::from(path));
        }
        let local = PathBuf::from(LOCAL_CONFIG);
        local.exists().then_some(local)
    }

    fn read(path: &Path) -> ConfigResult<GoalrtConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Get configuration reference
    pub fn config(&self) -> &GoalrtConfig {
        &self.config
    }

    /// Get mutable configuration reference
    pub fn config_mut(&mut self) -> &mut GoalrtConfig {
        &mut self.config
    }

    /// The file the configuration came from, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        let debugger = &self.config.debugger;
        if debugger.registration_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "debugger.registration_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if debugger.reply_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "debugger.reply_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if let Some(hidden) = debugger.default_pause_channels.iter().find(|c| c.is_hidden()) {
            return Err(ConfigError::Invalid(format!(
                "{} is hidden and cannot be a pause channel",
                hidden
            )));
        }
        if self.config.runtime.max_cycles == 0 {
            warn!("runtime.max_cycles is 0, agents run until nothing is enabled");
        }
        debug!("Configuration validation passed");
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn load_from_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("GOALRT_LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(timeout) = lookup("GOALRT_REPLY_TIMEOUT_MS") {
            match timeout.parse() {
                Ok(ms) => self.config.debugger.reply_timeout_ms = ms,
                Err(_) => warn!("Ignoring GOALRT_REPLY_TIMEOUT_MS={}", timeout),
            }
        }
    }
}
