//! Console adapter for development/testing
//!
//! Reads synthetic chat events from stdin and prints outbound lines.
//!
//! ```text
//! alice #general !hello     channel message from alice in #general
//! alice !hello              private message from alice
//! :join alice #general      alice joins #general
//! :reload                   reload plugins
//! :quit                     stop the bot
//! ```

use async_trait::async_trait;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::application::errors::TransportError;
use crate::domain::entities::{ChatEvent, ControlRequest};
use crate::domain::traits::Transport;

/// One parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Event(ChatEvent),
    Control(ControlRequest),
    Quit,
    Empty,
    Invalid(String),
}

fn is_channel(name: &str) -> bool {
    name.starts_with('#') || name.starts_with('&')
}

pub fn parse_line(line: &str) -> ConsoleInput {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleInput::Empty;
    }

    if let Some(command) = line.strip_prefix(':') {
        let mut parts = command.split_whitespace();
        return match (parts.next(), parts.next(), parts.next()) {
            (Some("quit"), None, _) => ConsoleInput::Quit,
            (Some("reload"), None, _) => ConsoleInput::Control(ControlRequest::Reload),
            (Some("join"), Some(nick), Some(channel)) if is_channel(channel) => {
                ConsoleInput::Event(ChatEvent::join(channel, nick))
            }
            (Some("join"), _, _) => ConsoleInput::Invalid("usage: :join <nick> <#channel>".into()),
            _ => ConsoleInput::Invalid(format!("unknown console command ':{}'", command)),
        };
    }

    let (nick, rest) = match line.split_once(char::is_whitespace) {
        Some((nick, rest)) => (nick, rest.trim_start()),
        None => return ConsoleInput::Invalid("usage: <nick> [#channel] <text>".into()),
    };

    match rest.split_once(char::is_whitespace) {
        Some((channel, text)) if is_channel(channel) => {
            ConsoleInput::Event(ChatEvent::message(nick, channel, text.trim_start()))
        }
        _ if is_channel(rest) => ConsoleInput::Invalid(format!("nothing to say in {}", rest)),
        _ => ConsoleInput::Event(ChatEvent::private_message(nick, rest)),
    }
}

/// Console bot adapter for local development
pub struct ConsoleAdapter {
    nick: String,
    joined: Mutex<Vec<String>>,
}

impl ConsoleAdapter {
    pub fn new(nick: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            joined: Mutex::new(Vec::new()),
        }
    }

    pub fn joined(&self) -> Vec<String> {
        self.joined
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Read stdin until EOF or `:quit`, forwarding events and control
    /// requests. Returning drops both senders, which stops the bot loop.
    pub async fn read_input(
        events: mpsc::Sender<ChatEvent>,
        control: mpsc::UnboundedSender<ControlRequest>,
    ) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to read console input: {}", e);
                    break;
                }
            };

            match parse_line(&line) {
                ConsoleInput::Event(event) => {
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                ConsoleInput::Control(request) => {
                    if control.send(request).is_err() {
                        break;
                    }
                }
                ConsoleInput::Quit => break,
                ConsoleInput::Empty => {}
                ConsoleInput::Invalid(reason) => eprintln!("{}", reason),
            }
        }
    }
}

#[async_trait]
impl Transport for ConsoleAdapter {
    async fn join(&self, channel: &str) -> Result<(), TransportError> {
        let mut joined = self.joined.lock().unwrap_or_else(PoisonError::into_inner);
        if !joined.iter().any(|c| c == channel) {
            joined.push(channel.to_string());
        }
        println!("* {} joined {}", self.nick, channel);
        Ok(())
    }

    async fn part(&self, channel: &str) -> Result<(), TransportError> {
        {
            let mut joined = self.joined.lock().unwrap_or_else(PoisonError::into_inner);
            let before = joined.len();
            joined.retain(|c| c != channel);
            if joined.len() == before {
                return Err(TransportError::Channel {
                    channel: channel.to_string(),
                    reason: "not joined".to_string(),
                });
            }
        }
        println!("* {} left {}", self.nick, channel);
        Ok(())
    }

    async fn say(&self, target: &str, line: &str) -> Result<(), TransportError> {
        writeln!(std::io::stdout().lock(), "[{}] <{}> {}", target, self.nick, line).map_err(
            |e| TransportError::Send {
                target: target.to_string(),
                reason: e.to_string(),
            },
        )
    }

    /// Console users are who they say they are
    async fn verified_identity(&self, nick: &str) -> Result<Option<String>, TransportError> {
        Ok(Some(nick.to_string()))
    }
}
