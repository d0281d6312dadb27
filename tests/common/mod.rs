//! Shared test harness: a recording transport and a fully wired runtime
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use tempfile::TempDir;
use tokio::sync::mpsc;

use syer_bot::application::errors::TransportError;
use syer_bot::application::messaging::Dispatcher;
use syer_bot::application::services::AuthGate;
use syer_bot::domain::entities::ControlRequest;
use syer_bot::domain::traits::{ConfigStore, Transport};
use syer_bot::infrastructure::config::SandboxConfig;
use syer_bot::infrastructure::database::Database;
use syer_bot::infrastructure::plugins::{
    HostCapabilities, LoadReport, PluginLoader, PluginRuntime, RegistrySlot,
};
use syer_bot::infrastructure::storage::MemoryStore;

static INIT: Once = Once::new();

pub fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Transport that records everything and resolves identities from a table
#[derive(Default)]
pub struct RecordingTransport {
    said: Mutex<Vec<(String, String)>>,
    joined: Mutex<Vec<String>>,
    parted: Mutex<Vec<String>>,
    identities: Mutex<HashMap<String, String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identify(&self, nick: &str, account: &str) {
        self.identities
            .lock()
            .unwrap()
            .insert(nick.to_string(), account.to_string());
    }

    /// Every line sent, in order
    pub fn said(&self) -> Vec<(String, String)> {
        self.said.lock().unwrap().clone()
    }

    /// Lines sent to one target, sorted (branch order is not fixed)
    pub fn lines_to(&self, target: &str) -> Vec<String> {
        let mut lines: Vec<String> = self
            .said()
            .into_iter()
            .filter(|(t, _)| t == target)
            .map(|(_, line)| line)
            .collect();
        lines.sort();
        lines
    }

    pub fn joined(&self) -> Vec<String> {
        self.joined.lock().unwrap().clone()
    }

    pub fn parted(&self) -> Vec<String> {
        self.parted.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.said.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn join(&self, channel: &str) -> Result<(), TransportError> {
        self.joined.lock().unwrap().push(channel.to_string());
        Ok(())
    }

    async fn part(&self, channel: &str) -> Result<(), TransportError> {
        self.parted.lock().unwrap().push(channel.to_string());
        Ok(())
    }

    async fn say(&self, target: &str, line: &str) -> Result<(), TransportError> {
        self.said
            .lock()
            .unwrap()
            .push((target.to_string(), line.to_string()));
        Ok(())
    }

    async fn verified_identity(&self, nick: &str) -> Result<Option<String>, TransportError> {
        Ok(self.identities.lock().unwrap().get(nick).cloned())
    }
}

/// Plugins in a scratch directory, wired to an in-memory store and database
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<MemoryStore>,
    pub auth: Arc<AuthGate>,
    pub slot: Arc<RegistrySlot>,
    pub runtime: PluginRuntime,
    pub dispatcher: Dispatcher,
    pub transport: Arc<RecordingTransport>,
    pub control: mpsc::UnboundedReceiver<ControlRequest>,
}

impl Harness {
    pub fn new(plugins: &[(&str, &str)]) -> Self {
        Self::with_sandbox(plugins, SandboxConfig::default())
    }

    pub fn with_sandbox(plugins: &[(&str, &str)], sandbox: SandboxConfig) -> Self {
        ensure_init();
        let dir = tempfile::tempdir().unwrap();
        for (name, source) in plugins {
            std::fs::write(dir.path().join(name), source).unwrap();
        }

        let store = Arc::new(MemoryStore::new());
        let config_store: Arc<dyn ConfigStore> = store.clone();
        let auth = Arc::new(AuthGate::load(config_store.clone()));
        let database = Arc::new(Database::open_in_memory().unwrap());
        let slot = Arc::new(RegistrySlot::default());
        let (control_tx, control) = mpsc::unbounded_channel();

        let host = Arc::new(HostCapabilities::new(
            config_store,
            auth.clone(),
            database,
            slot.clone(),
            control_tx,
        ));
        let loader = PluginLoader::new(dir.path(), sandbox, host);
        let runtime = PluginRuntime::new(loader, slot.clone());

        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = Dispatcher::new(slot.clone(), auth.clone(), transport.clone());

        Self {
            dir,
            store,
            auth,
            slot,
            runtime,
            dispatcher,
            transport,
            control,
        }
    }

    pub async fn load(&self) -> LoadReport {
        self.runtime.reload().await.unwrap()
    }

    pub fn write_plugin(&self, name: &str, source: &str) {
        std::fs::write(self.dir.path().join(name), source).unwrap();
    }
}

/// A command plugin that answers `key` with `line`
pub fn echo_plugin(name: &str, key: &str, line: &str) -> String {
    format!(
        r#"register_command(#{{
    name: "{name}",
    command: #{{ type: "prefix", key: "{key}" }},
    run: |trigger, reply, bot| reply.format("{line}")
}});"#
    )
}
