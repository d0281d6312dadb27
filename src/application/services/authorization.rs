//! Authorization gate
//!
//! Predicates are plain reads over the current [`AuthorizationState`] and can
//! be called from any number of dispatch branches at once. Administrative
//! mutations are serialized by a writer lock, persisted to the config store,
//! and only then published. A branch that read the previous state may act on
//! it for the event it is handling.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

use crate::application::errors::{StorageError, TransportError};
use crate::domain::entities::AuthorizationState;
use crate::domain::traits::{ConfigStore, Transport};

/// Store documents backing the authorization state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDocument {
    Banned,
    Admin,
    Groups,
    Perm,
    Channel,
}

impl AuthDocument {
    pub fn name(&self) -> &'static str {
        match self {
            AuthDocument::Banned => "banned",
            AuthDocument::Admin => "admin",
            AuthDocument::Groups => "groups",
            AuthDocument::Perm => "perm",
            AuthDocument::Channel => "channel",
        }
    }

    /// Document for a store name, if it backs the authorization state
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "banned" => Some(AuthDocument::Banned),
            "admin" => Some(AuthDocument::Admin),
            "groups" => Some(AuthDocument::Groups),
            "perm" => Some(AuthDocument::Perm),
            "channel" => Some(AuthDocument::Channel),
            _ => None,
        }
    }

    fn render(&self, state: &AuthorizationState) -> serde_json::Value {
        match self {
            AuthDocument::Banned => AuthorizationState::flags_document(&state.banned),
            AuthDocument::Admin => AuthorizationState::flags_document(&state.admins),
            AuthDocument::Groups => AuthorizationState::groups_document(&state.channel_groups),
            AuthDocument::Perm => AuthorizationState::groups_document(&state.permissions),
            AuthDocument::Channel => AuthorizationState::channels_document(&state.channels),
        }
    }
}

pub struct AuthGate {
    store: Arc<dyn ConfigStore>,
    state: RwLock<AuthorizationState>,
    writer: Mutex<()>,
}

impl AuthGate {
    /// Read every authorization document from the store
    pub fn load(store: Arc<dyn ConfigStore>) -> Self {
        let state = read_state(store.as_ref());
        tracing::debug!(
            banned = state.banned.len(),
            admins = state.admins.len(),
            groups = state.channel_groups.len(),
            permissions = state.permissions.len(),
            "Authorization state loaded"
        );
        Self {
            store,
            state: RwLock::new(state),
            writer: Mutex::new(()),
        }
    }

    /// Re-read the store, dropping anything not persisted
    pub fn refresh(&self) {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.reread();
    }

    /// Overwrite a whole document in the store, then re-read the state.
    /// Serialized with the other mutations.
    pub fn replace_document(
        &self,
        document: AuthDocument,
        value: serde_json::Value,
    ) -> Result<(), StorageError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.set(document.name(), value)?;
        self.reread();
        tracing::debug!(document = document.name(), "Authorization document replaced");
        Ok(())
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> AuthorizationState {
        self.read().clone()
    }

    pub fn is_banned(&self, sender: &str) -> bool {
        self.read().is_banned(sender)
    }

    /// Admin check for an identity that has already been verified
    pub fn is_admin_identity(&self, identity: &str) -> bool {
        self.read().is_admin(identity)
    }

    /// Admin check for a raw sender. The nick is resolved through the
    /// transport first; an unidentified sender is never an admin.
    pub async fn is_admin(
        &self,
        transport: &dyn Transport,
        sender: &str,
    ) -> Result<bool, TransportError> {
        let identity = transport.verified_identity(sender).await?;
        Ok(identity.is_some_and(|id| self.is_admin_identity(&id)))
    }

    pub fn has_permission(&self, group: &str, identity: &str) -> bool {
        self.read().has_permission(group, identity)
    }

    pub fn in_channel_group(&self, group: &str, channel: &str) -> bool {
        self.read().in_channel_group(group, channel)
    }

    pub fn group_channels(&self, group: &str) -> Vec<String> {
        self.read()
            .channel_groups
            .get(group)
            .map(|channels| channels.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Channels to join at start-up
    pub fn channels(&self) -> Vec<String> {
        self.read().channels.clone()
    }

    pub fn ban(&self, sender: &str) -> Result<bool, StorageError> {
        self.update(AuthDocument::Banned, |s| s.banned.insert(sender.to_string()))
    }

    pub fn unban(&self, sender: &str) -> Result<bool, StorageError> {
        self.update(AuthDocument::Banned, |s| s.banned.remove(sender))
    }

    pub fn add_admin(&self, identity: &str) -> Result<bool, StorageError> {
        self.update(AuthDocument::Admin, |s| s.admins.insert(identity.to_string()))
    }

    pub fn remove_admin(&self, identity: &str) -> Result<bool, StorageError> {
        self.update(AuthDocument::Admin, |s| s.admins.remove(identity))
    }

    pub fn add_channel_to_group(&self, group: &str, channel: &str) -> Result<bool, StorageError> {
        self.update(AuthDocument::Groups, |s| {
            s.channel_groups
                .entry(group.to_string())
                .or_default()
                .insert(channel.to_string())
        })
    }

    pub fn remove_channel_from_group(
        &self,
        group: &str,
        channel: &str,
    ) -> Result<bool, StorageError> {
        self.update(AuthDocument::Groups, |s| {
            s.channel_groups
                .get_mut(group)
                .is_some_and(|channels| channels.remove(channel))
        })
    }

    pub fn remove_group(&self, group: &str) -> Result<bool, StorageError> {
        self.update(AuthDocument::Groups, |s| s.channel_groups.remove(group).is_some())
    }

    /// Create an empty permission group
    pub fn add_permission_group(&self, group: &str) -> Result<bool, StorageError> {
        self.update(AuthDocument::Perm, |s| {
            if s.permissions.contains_key(group) {
                return false;
            }
            s.permissions.insert(group.to_string(), BTreeSet::new());
            true
        })
    }

    pub fn remove_permission_group(&self, group: &str) -> Result<bool, StorageError> {
        self.update(AuthDocument::Perm, |s| s.permissions.remove(group).is_some())
    }

    pub fn grant(&self, group: &str, identity: &str) -> Result<bool, StorageError> {
        self.update(AuthDocument::Perm, |s| {
            s.permissions
                .entry(group.to_string())
                .or_default()
                .insert(identity.to_string())
        })
    }

    pub fn revoke(&self, group: &str, identity: &str) -> Result<bool, StorageError> {
        self.update(AuthDocument::Perm, |s| {
            s.permissions
                .get_mut(group)
                .is_some_and(|members| members.remove(identity))
        })
    }

    pub fn add_channel(&self, channel: &str) -> Result<bool, StorageError> {
        self.update(AuthDocument::Channel, |s| {
            if s.channels.iter().any(|c| c == channel) {
                return false;
            }
            s.channels.push(channel.to_string());
            true
        })
    }

    pub fn remove_channel(&self, channel: &str) -> Result<bool, StorageError> {
        self.update(AuthDocument::Channel, |s| {
            let before = s.channels.len();
            s.channels.retain(|c| c != channel);
            s.channels.len() != before
        })
    }

    fn reread(&self) {
        let state = read_state(self.store.as_ref());
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn read(&self) -> RwLockReadGuard<'_, AuthorizationState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` to a copy of the state. If it reports a change, the
    /// affected document is persisted and the copy becomes current.
    fn update<F>(&self, document: AuthDocument, change: F) -> Result<bool, StorageError>
    where
        F: FnOnce(&mut AuthorizationState) -> bool,
    {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = self.snapshot();
        if !change(&mut next) {
            return Ok(false);
        }

        self.store.set(document.name(), document.render(&next))?;
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
        tracing::debug!(document = document.name(), "Authorization state updated");
        Ok(true)
    }
}

fn read_state(store: &dyn ConfigStore) -> AuthorizationState {
    AuthorizationState {
        banned: AuthorizationState::flags_from_document(&store.get(AuthDocument::Banned.name())),
        admins: AuthorizationState::flags_from_document(&store.get(AuthDocument::Admin.name())),
        channel_groups: AuthorizationState::groups_from_document(
            &store.get(AuthDocument::Groups.name()),
        ),
        permissions: AuthorizationState::groups_from_document(
            &store.get(AuthDocument::Perm.name()),
        ),
        channels: AuthorizationState::channels_from_document(
            &store.get(AuthDocument::Channel.name()),
        ),
    }
}
