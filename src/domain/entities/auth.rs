//! Authorization data: bans, admins, channel groups, permission groups
//!
//! The state is a plain value. Persisted form is one JSON document per
//! collection, in the shapes the bot has always stored them:
//!
//! - `banned`, `admin`: `{ "<nick or account>": true }`
//! - `groups`, `perm`: `{ "<group>": ["<channel or account>", ...] }`
//! - `channel`: `["#channel", ...]`

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationState {
    /// Raw sender nicks
    pub banned: BTreeSet<String>,
    /// Verified identities
    pub admins: BTreeSet<String>,
    /// Channel group -> channel names
    pub channel_groups: BTreeMap<String, BTreeSet<String>>,
    /// Permission group -> verified identities
    pub permissions: BTreeMap<String, BTreeSet<String>>,
    /// Channels joined at start-up
    pub channels: Vec<String>,
}

impl AuthorizationState {
    pub fn is_banned(&self, sender: &str) -> bool {
        self.banned.contains(sender)
    }

    pub fn is_admin(&self, identity: &str) -> bool {
        self.admins.contains(identity)
    }

    pub fn has_permission(&self, group: &str, identity: &str) -> bool {
        self.permissions
            .get(group)
            .is_some_and(|members| members.contains(identity))
    }

    pub fn in_channel_group(&self, group: &str, channel: &str) -> bool {
        self.channel_groups
            .get(group)
            .is_some_and(|channels| channels.contains(channel))
    }

    pub fn flags_from_document(doc: &Value) -> BTreeSet<String> {
        doc.as_object()
            .map(|map| {
                map.iter()
                    .filter(|(_, v)| v.as_bool() == Some(true))
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn groups_from_document(doc: &Value) -> BTreeMap<String, BTreeSet<String>> {
        doc.as_object()
            .map(|map| {
                map.iter()
                    .map(|(group, members)| (group.clone(), string_set(members)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn channels_from_document(doc: &Value) -> Vec<String> {
        let mut channels = Vec::new();
        for channel in string_set_ordered(doc) {
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }
        channels
    }

    pub fn flags_document(flags: &BTreeSet<String>) -> Value {
        Value::Object(
            flags
                .iter()
                .map(|k| (k.clone(), Value::Bool(true)))
                .collect::<Map<String, Value>>(),
        )
    }

    pub fn groups_document(groups: &BTreeMap<String, BTreeSet<String>>) -> Value {
        Value::Object(
            groups
                .iter()
                .map(|(group, members)| {
                    let members = members.iter().cloned().map(Value::String).collect();
                    (group.clone(), Value::Array(members))
                })
                .collect::<Map<String, Value>>(),
        )
    }

    pub fn channels_document(channels: &[String]) -> Value {
        Value::Array(channels.iter().cloned().map(Value::String).collect())
    }
}

fn string_set(value: &Value) -> BTreeSet<String> {
    string_set_ordered(value).into_iter().collect()
}

fn string_set_ordered(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
