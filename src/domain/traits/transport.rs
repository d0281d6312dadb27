use async_trait::async_trait;

use crate::application::errors::TransportError;

/// Transport trait - abstraction over the chat network connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Join a channel
    async fn join(&self, channel: &str) -> Result<(), TransportError>;

    /// Leave a channel
    async fn part(&self, channel: &str) -> Result<(), TransportError>;

    /// Send one line to a channel or nick
    async fn say(&self, target: &str, line: &str) -> Result<(), TransportError>;

    /// Resolve the account a nick is identified as.
    /// `Ok(None)` means the nick is not identified.
    async fn verified_identity(&self, nick: &str) -> Result<Option<String>, TransportError>;
}
