//! Plugin loader - runs plugin scripts and collects their registrations
//!
//! Plugins are `*.rhai` files directly inside the plugin directory, loaded
//! in file-name order. Each runs in its own engine. A unit that fails to
//! compile or throws contributes nothing; a malformed registration only
//! loses that one descriptor. Neither stops the other units from loading.

use rhai::{Dynamic, FnPtr, Map};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::capability::{Collector, HostCapabilities, RawRoute, Registrations};
use super::registry::{HttpMethod, Registry, Route};
use super::sandbox::{build_engine, error_message};
use super::script_handler::{
    ScriptCommandHandler, ScriptJoinHandler, ScriptRouteHandler, ScriptUnit,
};
use crate::application::errors::PluginError;
use crate::domain::entities::{
    ChannelRestriction, CommandRegistration, CommandSpec, JoinRegistration, Place,
};
use crate::domain::traits::{CommandHandler, JoinHandler};
use crate::infrastructure::config::SandboxConfig;

const PLUGIN_EXTENSION: &str = "rhai";

/// Outcome of one load pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Units that ran to completion
    pub loaded: Vec<String>,
    /// Units that failed to compile or threw
    pub failed: Vec<PluginError>,
    /// Registrations discarded as malformed
    pub discarded: Vec<PluginError>,
    pub commands: usize,
    pub joins: usize,
    pub routes: usize,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.discarded.is_empty()
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} plugins loaded, {} failed, {} commands, {} join handlers, {} routes",
            self.loaded.len(),
            self.failed.len(),
            self.commands,
            self.joins,
            self.routes
        )?;
        if !self.discarded.is_empty() {
            write!(f, ", {} registrations discarded", self.discarded.len())?;
        }
        Ok(())
    }
}

/// Plugin loader
pub struct PluginLoader {
    plugin_dir: PathBuf,
    sandbox: SandboxConfig,
    host: Arc<HostCapabilities>,
}

impl PluginLoader {
    pub fn new(
        plugin_dir: impl Into<PathBuf>,
        sandbox: SandboxConfig,
        host: Arc<HostCapabilities>,
    ) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
            sandbox,
            host,
        }
    }

    /// Plugin files in load order
    pub fn discover(&self) -> Result<Vec<PathBuf>, PluginError> {
        if !self.plugin_dir.exists() {
            tracing::warn!("Plugin directory does not exist: {}", self.plugin_dir.display());
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.plugin_dir).map_err(|e| {
            PluginError::Directory(format!("{}: {}", self.plugin_dir.display(), e))
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(true, |n| n.starts_with('.'));
            let is_plugin = path.extension().and_then(|e| e.to_str()) == Some(PLUGIN_EXTENSION);
            if !hidden && is_plugin {
                paths.push(path);
            }
        }

        paths.sort();
        Ok(paths)
    }

    /// Load every plugin in the directory into a fresh registry
    pub fn load_all(&self) -> Result<(Registry, LoadReport), PluginError> {
        let mut sources = Vec::new();
        let mut unreadable = Vec::new();

        for path in self.discover()? {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            match std::fs::read_to_string(&path) {
                Ok(source) => sources.push((name, source)),
                Err(e) => unreadable.push(PluginError::load_failure(name, e.to_string())),
            }
        }

        let (registry, mut report) = self.load_sources(sources);
        for error in unreadable {
            tracing::error!("{}", error);
            report.failed.push(error);
        }
        Ok((registry, report))
    }

    /// Load named sources in the given order
    pub fn load_sources<I, N, S>(&self, sources: I) -> (Registry, LoadReport)
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: AsRef<str>,
    {
        let mut registry = Registry::new();
        let mut report = LoadReport::default();

        for (name, source) in sources {
            let name = name.into();
            match self.load_unit(&name, source.as_ref(), &mut registry, &mut report.discarded) {
                Ok(()) => report.loaded.push(name),
                Err(e) => {
                    tracing::error!("{}", e);
                    report.failed.push(e);
                }
            }
        }

        report.commands = registry.commands.len();
        report.joins = registry.joins.len();
        report.routes = registry.routes.len();
        tracing::info!("Plugin load finished: {}", report);
        (registry, report)
    }

    fn load_unit(
        &self,
        name: &str,
        source: &str,
        registry: &mut Registry,
        discarded: &mut Vec<PluginError>,
    ) -> Result<(), PluginError> {
        let mut engine = build_engine(&self.sandbox, name);
        let collector = Collector::open(name);
        self.host.install(&mut engine, name, &collector);

        let ast = engine
            .compile(source)
            .map_err(|e| PluginError::load_failure(name, e.to_string()))?;
        let outcome = engine.run_ast(&ast);
        let registrations = collector.close();
        outcome.map_err(|e| PluginError::load_failure(name, error_message(&e)))?;

        let unit = Arc::new(ScriptUnit {
            name: name.to_string(),
            engine,
            ast,
        });
        let Registrations {
            commands,
            joins,
            routes,
        } = registrations;

        for payload in commands {
            match command_registration(&unit, payload).and_then(|r| r.build(name)) {
                Ok(descriptor) => {
                    tracing::debug!(plugin = %name, command = %descriptor.name, "Registered command");
                    registry.commands.push(Arc::new(descriptor));
                }
                Err(e) => discard(e, discarded),
            }
        }

        for payload in joins {
            match join_registration(&unit, payload).and_then(|r| r.build(name)) {
                Ok(descriptor) => registry.joins.push(Arc::new(descriptor)),
                Err(e) => discard(e, discarded),
            }
        }

        for raw in routes {
            match route(&unit, raw) {
                Ok(route) => registry.routes.push(route),
                Err(e) => discard(e, discarded),
            }
        }

        tracing::info!("Loaded plugin: {}", name);
        Ok(())
    }
}

fn discard(error: PluginError, discarded: &mut Vec<PluginError>) {
    tracing::warn!("{}", error);
    discarded.push(error);
}

/// Typed view over a registration map
struct Payload<'a> {
    plugin: &'a str,
    map: Map,
}

impl<'a> Payload<'a> {
    fn take(&mut self, field: &str) -> Option<Dynamic> {
        self.map.remove(field).filter(|v| !v.is_unit())
    }

    fn malformed(&self, reason: String) -> PluginError {
        PluginError::malformed(self.plugin, reason)
    }

    fn string(&mut self, field: &str) -> Result<Option<String>, PluginError> {
        match self.take(field) {
            None => Ok(None),
            Some(value) => value
                .into_string()
                .map(Some)
                .map_err(|found| self.malformed(format!("'{}' must be a string, found {}", field, found))),
        }
    }

    fn boolean(&mut self, field: &str) -> Result<Option<bool>, PluginError> {
        match self.take(field) {
            None => Ok(None),
            Some(value) => value
                .as_bool()
                .map(Some)
                .map_err(|found| self.malformed(format!("'{}' must be a boolean, found {}", field, found))),
        }
    }

    fn strings(&mut self, field: &str) -> Result<Option<Vec<String>>, PluginError> {
        let value = match self.take(field) {
            None => return Ok(None),
            Some(value) => value,
        };
        let items = value
            .into_array()
            .map_err(|found| self.malformed(format!("'{}' must be an array, found {}", field, found)))?;
        items
            .into_iter()
            .map(|item| {
                item.into_string().map_err(|found| {
                    self.malformed(format!("'{}' must only hold strings, found {}", field, found))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn function(&mut self, field: &str) -> Result<Option<FnPtr>, PluginError> {
        match self.take(field) {
            None => Ok(None),
            Some(value) => {
                let found = value.type_name();
                value
                    .try_cast::<FnPtr>()
                    .map(Some)
                    .ok_or_else(|| self.malformed(format!("'{}' must be a function, found {}", field, found)))
            }
        }
    }

    fn command_spec(&mut self) -> Result<Option<CommandSpec>, PluginError> {
        let value = match self.take("command") {
            None => return Ok(None),
            Some(value) => value,
        };
        let found = value.type_name();
        let map = value
            .try_cast::<Map>()
            .ok_or_else(|| self.malformed(format!("'command' must be a map, found {}", found)))?;

        let mut spec = Payload {
            plugin: self.plugin,
            map,
        };
        let kind = spec
            .string("type")?
            .ok_or_else(|| self.malformed("'command' has no type".to_string()))?;
        let key = match kind.to_ascii_lowercase().as_str() {
            "regex" => match spec.string("pattern")? {
                Some(pattern) => Some(pattern),
                None => spec.string("key")?,
            },
            _ => spec.string("key")?,
        }
        .ok_or_else(|| self.malformed(format!("{} command has no key", kind)))?;

        CommandSpec::from_parts(&kind, key)
            .map(Some)
            .map_err(|e| self.malformed(e))
    }

    fn places(&mut self) -> Result<Option<Vec<Place>>, PluginError> {
        match self.strings("places")? {
            None => Ok(None),
            Some(names) => names
                .iter()
                .map(|n| n.parse::<Place>())
                .collect::<Result<Vec<_>, _>>()
                .map(Some)
                .map_err(|e| self.malformed(e)),
        }
    }

    fn channels(&mut self) -> Result<Option<ChannelRestriction>, PluginError> {
        let value = match self.take("channels") {
            None => return Ok(None),
            Some(value) => value,
        };
        if let Ok(all) = value.as_bool() {
            return if all {
                Ok(Some(ChannelRestriction::All))
            } else {
                Err(self.malformed("'channels' must be true or a list of groups".to_string()))
            };
        }

        self.map.insert("channels".into(), value);
        Ok(self.strings("channels")?.map(ChannelRestriction::Groups))
    }
}

fn command_registration(
    unit: &Arc<ScriptUnit>,
    map: Map,
) -> Result<CommandRegistration, PluginError> {
    let mut payload = Payload {
        plugin: &unit.name,
        map,
    };

    Ok(CommandRegistration {
        name: payload.string("name")?,
        command: payload.command_spec()?,
        places: payload.places()?,
        channels: payload.channels()?,
        permission: payload.string("permission")?,
        admin_only: payload.boolean("admin_only")?,
        help: payload.string("help")?,
        example: payload.string("example")?,
        handler: payload.function("run")?.map(|f| {
            Arc::new(ScriptCommandHandler::new(unit.clone(), f))
                as Arc<dyn CommandHandler>
        }),
    })
}

fn join_registration(unit: &Arc<ScriptUnit>, map: Map) -> Result<JoinRegistration, PluginError> {
    let mut payload = Payload {
        plugin: &unit.name,
        map,
    };

    Ok(JoinRegistration {
        admin_only: payload.boolean("admin_only")?,
        handler: payload.function("run")?.map(|f| {
            Arc::new(ScriptJoinHandler::new(unit.clone(), f))
                as Arc<dyn JoinHandler>
        }),
    })
}

fn route(unit: &Arc<ScriptUnit>, raw: RawRoute) -> Result<Route, PluginError> {
    let method = raw
        .method
        .parse::<HttpMethod>()
        .map_err(|e| PluginError::malformed(&unit.name, format!("route {}: {}", raw.path, e)))?;
    if !raw.path.starts_with('/') {
        return Err(PluginError::malformed(
            &unit.name,
            format!("route path '{}' must start with '/'", raw.path),
        ));
    }

    Ok(Route {
        method,
        path: raw.path,
        plugin: unit.name.clone(),
        handler: Arc::new(ScriptRouteHandler::new(unit.clone(), raw.handler)),
    })
}
