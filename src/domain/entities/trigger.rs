//! Per-invocation values handed to handlers

use std::sync::{Arc, Mutex, PoisonError};

use super::event::ChatEvent;

/// Information about where and why a command was executed.
/// Built fresh for every invocation and owned by it.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub is_channel: bool,
    pub args: Vec<String>,
    pub sender: String,
    pub target: String,
    pub message: String,
    pub raw: serde_json::Value,
}

impl Trigger {
    pub fn new(event: &ChatEvent, args: Vec<String>) -> Self {
        Self {
            is_channel: event.is_channel(),
            args,
            sender: event.sender.clone(),
            target: event.target.clone(),
            message: event.body().to_string(),
            raw: event.meta.clone(),
        }
    }
}

/// Context for join handlers
#[derive(Debug, Clone)]
pub struct JoinTrigger {
    pub channel: String,
    pub nick: String,
    pub raw: serde_json::Value,
}

impl JoinTrigger {
    pub fn new(event: &ChatEvent) -> Self {
        Self {
            channel: event.target.clone(),
            nick: event.sender.clone(),
            raw: event.meta.clone(),
        }
    }
}

/// Reply helper: addresses the sender in channels, leaves PM lines alone
#[derive(Debug, Clone)]
pub struct Reply {
    sender: String,
    is_channel: bool,
}

impl Reply {
    pub fn new(sender: impl Into<String>, is_channel: bool) -> Self {
        Self {
            sender: sender.into(),
            is_channel,
        }
    }

    pub fn for_trigger(trigger: &Trigger) -> Self {
        Self::new(trigger.sender.clone(), trigger.is_channel)
    }

    pub fn line(&self, line: &str) -> String {
        if self.is_channel {
            format!("{}: {}", self.sender, line)
        } else {
            line.to_string()
        }
    }

    pub fn lines<S: AsRef<str>>(&self, lines: &[S]) -> Vec<String> {
        lines.iter().map(|l| self.line(l.as_ref())).collect()
    }
}

/// Transport operation requested by a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportAction {
    Say { target: String, line: String },
    Join(String),
    Part(String),
}

/// Transport capability given to handlers.
///
/// Calls are queued and performed by the dispatcher once the handler
/// returns, in the order they were made and before the returned lines.
#[derive(Debug, Clone, Default)]
pub struct BotHandle {
    actions: Arc<Mutex<Vec<TransportAction>>>,
}

impl BotHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(&self, target: impl Into<String>, line: impl Into<String>) {
        self.push(TransportAction::Say {
            target: target.into(),
            line: line.into(),
        });
    }

    pub fn join(&self, channel: impl Into<String>) {
        self.push(TransportAction::Join(channel.into()));
    }

    pub fn part(&self, channel: impl Into<String>) {
        self.push(TransportAction::Part(channel.into()));
    }

    /// Drain everything queued so far
    pub fn take_actions(&self) -> Vec<TransportAction> {
        let mut actions = self.actions.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *actions)
    }

    fn push(&self, action: TransportAction) {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
    }
}
