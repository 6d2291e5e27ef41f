//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::application::errors::ConfigError;

/// Bot configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub path: PathConfig,
    pub wheel: WheelConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    pub name: String,
    /// User allowed to shut down and restart the bot
    pub master: Option<String>,
    /// Users allowed to reload cogs
    pub admins: Vec<String>,
    /// Users whose messages are dropped outright
    pub banned: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PathConfig {
    /// Directory scanned for cog units
    pub cogs: PathBuf,
    /// Directory holding persisted guild records
    pub guilds: PathBuf,
    /// Directory holding per-cog config files
    pub config: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WheelConfig {
    /// Import units that appear while running
    pub import: bool,
    /// Reload units whose file changed
    pub reload: bool,
    pub interval_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "cogwheel".to_string(),
            master: None,
            admins: Vec::new(),
            banned: Vec::new(),
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            cogs: PathBuf::from("./cogs"),
            guilds: PathBuf::from("./data/guilds"),
            config: PathBuf::from("./config"),
        }
    }
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            import: true,
            reload: true,
            interval_secs: 5,
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    /// Write the configuration out as YAML, for `init-config`
    pub fn save(&self, path: impl Into<PathBuf>) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        std::fs::write(path.into(), content)
            .map_err(|e| ConfigError::Parse(format!("Failed to write config: {}", e)))
    }

    /// Environment variables override the file
    pub fn apply_env(mut self) -> Self {
        if let Ok(master) = std::env::var("BOT_MASTER") {
            self.bot.master = Some(master);
        }
        if let Ok(cogs) = std::env::var("BOT_COGS_DIR") {
            self.path.cogs = PathBuf::from(cogs);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrips_through_yaml() {
        let config = Config::default();
        let raw = serde_yaml::to_string(&config).unwrap();
        let back: Config = serde_yaml::from_str(&raw).unwrap();
        assert_eq!(back.bot.name, "cogwheel");
        assert_eq!(back.wheel.interval_secs, 5);
        assert!(back.wheel.import);
    }

    #[test]
    fn test_partial_file_gets_defaults() {
        let config: Config =
            serde_yaml::from_str("bot:\n  master: \"42\"\nwheel:\n  interval-secs: 30\n").unwrap();
        assert_eq!(config.bot.master.as_deref(), Some("42"));
        assert_eq!(config.wheel.interval_secs, 30);
        assert_eq!(config.path.cogs, PathBuf::from("./cogs"));
        assert!(config.wheel.reload);
    }
}
