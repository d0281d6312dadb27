//! Application layer errors

use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors raised while turning plugin sources into descriptors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// A registration call was missing a required field or carried a bad one.
    /// Only the offending descriptor is discarded.
    #[error("Malformed registration in {plugin}: {reason}")]
    MalformedRegistration { plugin: String, reason: String },

    /// The unit failed to compile or threw while running.
    /// Nothing the unit registered is kept.
    #[error("Failed to load plugin {plugin}: {reason}")]
    LoadFailure { plugin: String, reason: String },

    #[error("Plugin directory error: {0}")]
    Directory(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PluginError {
    pub fn malformed(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        PluginError::MalformedRegistration {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    pub fn load_failure(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        PluginError::LoadFailure {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }
}

/// A matched, authorized handler reported an error.
///
/// The message is what ends up after `Error: ` on the chat target.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        HandlerError(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Chat transport failures (identity lookups and outbound lines)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Failed to send to {target}: {reason}")]
    Send { target: String, reason: String },

    #[error("Identity lookup for {nick} failed: {reason}")]
    Identity { nick: String, reason: String },

    #[error("Channel operation on {channel} failed: {reason}")]
    Channel { channel: String, reason: String },
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Unsupported value: {0}")]
    Unsupported(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
