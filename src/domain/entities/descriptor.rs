//! Command and join descriptors
//!
//! A descriptor is the normalized, immutable form of a plugin's
//! registration call. Registrations carry optional fields; [`build`]
//! applies defaults and rejects incomplete payloads.
//!
//! [`build`]: CommandRegistration::build

use std::fmt;
use std::sync::Arc;

use super::event::Place;
use super::matcher::{CommandSpec, Matcher};
use crate::application::errors::PluginError;
use crate::domain::traits::{CommandHandler, JoinHandler};

/// Which channels a command may fire in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRestriction {
    All,
    /// Channel must belong to at least one of these channel groups
    Groups(Vec<String>),
}

/// A registered command
pub struct CommandDescriptor {
    pub plugin: String,
    pub name: String,
    pub spec: CommandSpec,
    pub matcher: Matcher,
    pub places: Vec<Place>,
    pub channels: ChannelRestriction,
    pub permission: Option<String>,
    pub admin_only: bool,
    pub help: Option<String>,
    pub example: Option<String>,
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandDescriptor {
    pub fn allows(&self, place: Place) -> bool {
        self.places.contains(&place)
    }

    /// Whether the dispatcher has to look up the sender's verified identity
    pub fn needs_identity(&self) -> bool {
        self.permission.is_some() || self.admin_only
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("plugin", &self.plugin)
            .field("name", &self.name)
            .field("matcher", &self.matcher)
            .field("places", &self.places)
            .field("channels", &self.channels)
            .field("permission", &self.permission)
            .field("admin_only", &self.admin_only)
            .finish_non_exhaustive()
    }
}

/// A registered join handler
pub struct JoinDescriptor {
    pub plugin: String,
    pub admin_only: bool,
    pub handler: Arc<dyn JoinHandler>,
}

impl fmt::Debug for JoinDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinDescriptor")
            .field("plugin", &self.plugin)
            .field("admin_only", &self.admin_only)
            .finish_non_exhaustive()
    }
}

/// Either kind of descriptor, as fanned out by the dispatcher
#[derive(Debug, Clone)]
pub enum Descriptor {
    Command(Arc<CommandDescriptor>),
    Join(Arc<JoinDescriptor>),
}

impl Descriptor {
    pub fn plugin(&self) -> &str {
        match self {
            Descriptor::Command(d) => &d.plugin,
            Descriptor::Join(d) => &d.plugin,
        }
    }

    /// Name used in logs
    pub fn label(&self) -> &str {
        match self {
            Descriptor::Command(d) => &d.name,
            Descriptor::Join(_) => "join",
        }
    }
}

/// Raw command registration as declared by a plugin
#[derive(Default)]
pub struct CommandRegistration {
    pub name: Option<String>,
    pub command: Option<CommandSpec>,
    pub places: Option<Vec<Place>>,
    pub channels: Option<ChannelRestriction>,
    pub permission: Option<String>,
    pub admin_only: Option<bool>,
    pub help: Option<String>,
    pub example: Option<String>,
    pub handler: Option<Arc<dyn CommandHandler>>,
}

impl CommandRegistration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_command(mut self, spec: CommandSpec) -> Self {
        self.command = Some(spec);
        self
    }

    pub fn with_places(mut self, places: Vec<Place>) -> Self {
        self.places = Some(places);
        self
    }

    pub fn with_channel_groups(mut self, groups: Vec<String>) -> Self {
        self.channels = Some(ChannelRestriction::Groups(groups));
        self
    }

    pub fn with_permission(mut self, group: impl Into<String>) -> Self {
        self.permission = Some(group.into());
        self
    }

    pub fn admin_only(mut self) -> Self {
        self.admin_only = Some(true);
        self
    }

    pub fn with_help(mut self, text: impl Into<String>, example: Option<String>) -> Self {
        self.help = Some(text.into());
        self.example = example;
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn CommandHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Normalize into a descriptor owned by `plugin`
    pub fn build(self, plugin: &str) -> Result<CommandDescriptor, PluginError> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| PluginError::malformed(plugin, "command registered without a name"))?;
        let spec = self.command.ok_or_else(|| {
            PluginError::malformed(plugin, format!("command '{}' has no matcher", name))
        })?;
        let handler = self.handler.ok_or_else(|| {
            PluginError::malformed(plugin, format!("command '{}' has no handler", name))
        })?;
        let matcher = Matcher::compile(&spec)
            .map_err(|e| PluginError::malformed(plugin, format!("command '{}': {}", name, e)))?;

        Ok(CommandDescriptor {
            plugin: plugin.to_string(),
            name,
            spec,
            matcher,
            places: self.places.unwrap_or_else(Place::all),
            channels: self.channels.unwrap_or(ChannelRestriction::All),
            permission: self.permission,
            admin_only: self.admin_only.unwrap_or(false),
            help: self.help,
            example: self.example,
            handler,
        })
    }
}

/// Raw join registration as declared by a plugin
#[derive(Default)]
pub struct JoinRegistration {
    pub admin_only: Option<bool>,
    pub handler: Option<Arc<dyn JoinHandler>>,
}

impl JoinRegistration {
    pub fn new(handler: Arc<dyn JoinHandler>) -> Self {
        Self {
            admin_only: None,
            handler: Some(handler),
        }
    }

    pub fn admin_only(mut self) -> Self {
        self.admin_only = Some(true);
        self
    }

    pub fn build(self, plugin: &str) -> Result<JoinDescriptor, PluginError> {
        let handler = self
            .handler
            .ok_or_else(|| PluginError::malformed(plugin, "join registered without a handler"))?;

        Ok(JoinDescriptor {
            plugin: plugin.to_string(),
            admin_only: self.admin_only.unwrap_or(false),
            handler,
        })
    }
}
