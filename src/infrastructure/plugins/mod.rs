//! Plugin system for syer-bot
//!
//! Plugins are Rhai scripts. Each script runs once in its own sandboxed
//! engine and registers commands, join handlers and HTTP routes through the
//! capability functions installed into that engine. The resulting
//! [`Registry`] is published through a [`RegistrySlot`] and replaced as a
//! whole on every reload.

pub mod capability;
pub mod loader;
pub mod registry;
pub mod sandbox;
pub mod script_handler;

use std::sync::Arc;

use crate::application::errors::PluginError;

pub use capability::HostCapabilities;
pub use loader::{LoadReport, PluginLoader};
pub use registry::{HttpMethod, Registry, RegistrySlot, Route};

/// Loader plus the slot it publishes into
pub struct PluginRuntime {
    loader: Arc<PluginLoader>,
    slot: Arc<RegistrySlot>,
}

impl PluginRuntime {
    pub fn new(loader: PluginLoader, slot: Arc<RegistrySlot>) -> Self {
        Self {
            loader: Arc::new(loader),
            slot,
        }
    }

    pub fn slot(&self) -> &Arc<RegistrySlot> {
        &self.slot
    }

    /// Load the plugin directory and swap the result in.
    ///
    /// Dispatches already holding a snapshot finish against the old
    /// registry. If the directory cannot be read the current registry stays.
    pub async fn reload(&self) -> Result<LoadReport, PluginError> {
        let loader = self.loader.clone();
        let (registry, report) = tokio::task::spawn_blocking(move || loader.load_all())
            .await
            .map_err(|e| PluginError::Internal(format!("plugin load task failed: {}", e)))??;

        self.slot.replace(registry);
        Ok(report)
    }
}
