//! Command matchers
//!
//! A [`CommandSpec`] is what a plugin declares; [`Matcher::compile`] turns it
//! into a value that answers two questions for a line of chat text: does it
//! invoke the command (`test`), and what are its arguments (`extract`).
//! Matchers hold no mutable state and are shared across dispatch tasks.

use regex_lite::Regex;
use std::fmt;

/// Declared command specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    /// Text starts with the key, followed by a word boundary
    Prefix(String),
    /// Key occurs anywhere in the text
    Contains(String),
    /// Whole (trimmed) text equals the key
    Exact(String),
    /// Raw regular expression
    Regex(String),
}

impl CommandSpec {
    /// Build a spec from the type name used in plugin payloads
    pub fn from_parts(kind: &str, key: impl Into<String>) -> Result<Self, String> {
        let key = key.into();
        match kind.to_ascii_lowercase().as_str() {
            "prefix" => Ok(CommandSpec::Prefix(key)),
            "contains" => Ok(CommandSpec::Contains(key)),
            "exact" => Ok(CommandSpec::Exact(key)),
            "regex" => Ok(CommandSpec::Regex(key)),
            other => Err(format!("unknown command type '{}'", other)),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            CommandSpec::Prefix(_) => "prefix",
            CommandSpec::Contains(_) => "contains",
            CommandSpec::Exact(_) => "exact",
            CommandSpec::Regex(_) => "regex",
        }
    }

    pub fn key(&self) -> &str {
        match self {
            CommandSpec::Prefix(k)
            | CommandSpec::Contains(k)
            | CommandSpec::Exact(k)
            | CommandSpec::Regex(k) => k,
        }
    }
}

/// Compiled matcher
#[derive(Clone)]
pub enum Matcher {
    Prefix(String),
    Contains(String),
    Exact(String),
    Regex(Regex),
}

impl Matcher {
    /// Compile a spec. Fails on an empty key or an invalid pattern.
    pub fn compile(spec: &CommandSpec) -> Result<Self, String> {
        if spec.key().is_empty() {
            return Err(format!("{} command with an empty key", spec.kind()));
        }

        Ok(match spec {
            CommandSpec::Prefix(key) => Matcher::Prefix(key.clone()),
            CommandSpec::Contains(key) => Matcher::Contains(key.clone()),
            CommandSpec::Exact(key) => Matcher::Exact(key.clone()),
            CommandSpec::Regex(pattern) => Matcher::Regex(
                Regex::new(pattern).map_err(|e| format!("invalid pattern '{}': {}", pattern, e))?,
            ),
        })
    }

    /// Does this text invoke the command?
    pub fn test(&self, text: &str) -> bool {
        match self {
            Matcher::Prefix(key) => prefix_rest(key, text).is_some(),
            Matcher::Contains(key) => text.contains(key.as_str()),
            Matcher::Exact(key) => text.trim() == key,
            Matcher::Regex(re) => re.is_match(text),
        }
    }

    /// Arguments carried by the text; empty when the text does not match
    pub fn extract(&self, text: &str) -> Vec<String> {
        match self {
            Matcher::Prefix(key) => prefix_rest(key, text).map(tokens).unwrap_or_default(),
            Matcher::Contains(key) => text
                .find(key.as_str())
                .map(|at| tokens(&text[at + key.len()..]))
                .unwrap_or_default(),
            Matcher::Exact(_) => Vec::new(),
            Matcher::Regex(re) => re
                .captures(text)
                .map(|caps| {
                    caps.iter()
                        .skip(1)
                        .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Prefix(key) => write!(f, "Prefix({:?})", key),
            Matcher::Contains(key) => write!(f, "Contains({:?})", key),
            Matcher::Exact(key) => write!(f, "Exact({:?})", key),
            Matcher::Regex(re) => write!(f, "Regex({:?})", re.as_str()),
        }
    }
}

/// Remainder after a prefix key, if the key is there and ends on a word boundary.
///
/// A boundary exists when nothing follows the key, or when the key's last
/// character and the next character are not both word characters.
fn prefix_rest<'a>(key: &str, text: &'a str) -> Option<&'a str> {
    let rest = text.strip_prefix(key)?;
    let key_ends_in_word = key.chars().last().is_some_and(is_word_char);
    let rest_starts_with_word = rest.chars().next().is_some_and(is_word_char);
    if key_ends_in_word && rest_starts_with_word {
        None
    } else {
        Some(rest)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}
