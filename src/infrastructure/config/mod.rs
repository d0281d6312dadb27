//! Configuration management
//!
//! `config.yaml` carries the two bootstrap documents (network identity and
//! database connection) plus plugin, sandbox and store settings. Failing to
//! read or validate it is the one error that stops the bot from starting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::application::errors::ConfigError;

/// Bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bot: BotConfig,
    pub network: NetworkConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub plugins: PluginConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    pub name: String,
}

/// Chat network identity
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub nick: String,
    /// Joined at start-up in addition to the persisted channel list
    #[serde(default)]
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PluginConfig {
    pub directory: PathBuf,
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

/// Resource limits applied to every plugin engine
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SandboxConfig {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
    pub max_expr_depth: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoreConfig {
    pub directory: PathBuf,
}

fn default_port() -> u16 {
    6667
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 64,
            max_string_size: 64 * 1024,
            max_array_size: 10_000,
            max_map_size: 10_000,
            max_expr_depth: 64,
        }
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./plugins"),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./config"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                name: "syer-bot".to_string(),
            },
            network: NetworkConfig {
                server: "irc.libera.chat".to_string(),
                port: default_port(),
                nick: "syer".to_string(),
                channels: Vec::new(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("syer-bot.db"),
            },
            plugins: PluginConfig::default(),
            store: StoreConfig::default(),
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
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    /// Apply `SYER_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(server) = lookup("SYER_SERVER") {
            self.network.server = server;
        }
        if let Some(nick) = lookup("SYER_NICK") {
            self.network.nick = nick;
        }
        if let Some(path) = lookup("SYER_DATABASE") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("SYER_PLUGINS") {
            self.plugins.directory = PathBuf::from(dir);
        }
    }

    /// Check the bootstrap fields
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.server.trim().is_empty() {
            return Err(ConfigError::MissingField("network.server".to_string()));
        }
        if self.network.nick.trim().is_empty() {
            return Err(ConfigError::MissingField("network.nick".to_string()));
        }
        if self.network.nick.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidValue(format!(
                "network.nick '{}' contains whitespace",
                self.network.nick
            )));
        }
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("database.path".to_string()));
        }
        if self.plugins.sandbox.max_operations == 0 {
            return Err(ConfigError::InvalidValue(
                "plugins.sandbox.max-operations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r##"
bot:
  name: test-bot
network:
  server: irc.example.net
  nick: tester
  channels: ["#general"]
database:
  path: data/test.db
"##;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.network.port, 6667);
        assert_eq!(config.network.channels, vec!["#general"]);
        assert_eq!(config.plugins.directory, PathBuf::from("./plugins"));
        assert_eq!(config.plugins.sandbox, SandboxConfig::default());
        assert_eq!(config.store.directory, PathBuf::from("./config"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sandbox_limits_are_kebab_case() {
        let yaml = format!(
            "{}plugins:\n  directory: scripts\n  sandbox:\n    max-operations: 500\n",
            MINIMAL
        );
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.plugins.directory, PathBuf::from("scripts"));
        assert_eq!(config.plugins.sandbox.max_operations, 500);
        assert_eq!(config.plugins.sandbox.max_call_levels, 64);
    }

    #[test]
    fn missing_bootstrap_section_fails_to_parse() {
        let yaml = "bot:\n  name: x\nnetwork:\n  server: s\n  nick: n\n";
        assert!(matches!(Config::from_yaml(yaml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn empty_identity_is_rejected() {
        let mut config = Config::default();
        config.network.nick = " ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::MissingField(_))));

        let mut config = Config::default();
        config.network.nick = "two words".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn overrides_replace_fields() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "SYER_NICK" => Some("other".to_string()),
            "SYER_PLUGINS" => Some("/srv/plugins".to_string()),
            _ => None,
        });
        assert_eq!(config.network.nick, "other");
        assert_eq!(config.plugins.directory, PathBuf::from("/srv/plugins"));
        assert_eq!(config.network.server, "irc.libera.chat");
    }

    #[test]
    fn default_config_round_trips_through_yaml() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.network.nick, "syer");
        assert!(parsed.validate().is_ok());
    }
}
