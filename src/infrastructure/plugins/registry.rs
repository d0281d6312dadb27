//! Plugin registry - the descriptors and routes of one load pass
//!
//! A [`Registry`] is never modified after it is built. Reloading builds a
//! new one and swaps it into the [`RegistrySlot`]; a dispatch that took a
//! snapshot before the swap keeps iterating the old value.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::entities::{CommandDescriptor, JoinDescriptor};
use crate::domain::traits::RouteHandler;

/// HTTP method a plugin route answers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            other => Err(format!("unsupported method '{}'", other)),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plugin HTTP endpoint
#[derive(Clone)]
pub struct Route {
    pub method: HttpMethod,
    pub path: String,
    pub plugin: String,
    pub handler: Arc<dyn RouteHandler>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("plugin", &self.plugin)
            .finish_non_exhaustive()
    }
}

/// Everything registered by one load pass
#[derive(Debug, Default)]
pub struct Registry {
    pub commands: Vec<Arc<CommandDescriptor>>,
    pub joins: Vec<Arc<JoinDescriptor>>,
    pub routes: Vec<Route>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route for a request; a later registration wins over an earlier one
    pub fn find_route(&self, method: HttpMethod, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .rev()
            .find(|r| r.method == method && r.path == path)
    }

    pub fn len(&self) -> usize {
        self.commands.len() + self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holder of the live registry
#[derive(Default)]
pub struct RegistrySlot {
    current: RwLock<Arc<Registry>>,
}

impl RegistrySlot {
    pub fn new(registry: Registry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    /// The registry as of now. Later replacements do not affect it.
    pub fn snapshot(&self) -> Arc<Registry> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish a new registry, returning the previous one
    pub fn replace(&self, registry: Registry) -> Arc<Registry> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, Arc::new(registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::HandlerError;
    use crate::domain::entities::{CommandRegistration, CommandSpec};
    use crate::domain::traits::FnCommandHandler;

    struct Echo;

    impl RouteHandler for Echo {
        fn handle(&self, request: serde_json::Value) -> Result<serde_json::Value, HandlerError> {
            Ok(request)
        }
    }

    fn command(name: &str) -> Arc<CommandDescriptor> {
        let descriptor = CommandRegistration::new(name)
            .with_command(CommandSpec::Exact(format!("!{}", name)))
            .with_handler(Arc::new(FnCommandHandler::new(|_t, _r, _b| Ok(vec![]))))
            .build("test.rhai")
            .unwrap();
        Arc::new(descriptor)
    }

    #[test]
    fn snapshot_survives_replace() {
        let slot = RegistrySlot::new(Registry {
            commands: vec![command("a")],
            ..Registry::new()
        });

        let before = slot.snapshot();
        let previous = slot.replace(Registry {
            commands: vec![command("b"), command("c")],
            ..Registry::new()
        });

        assert!(Arc::ptr_eq(&before, &previous));
        assert_eq!(before.commands.len(), 1);
        assert_eq!(before.commands[0].name, "a");
        assert_eq!(slot.snapshot().len(), 2);
    }

    #[test]
    fn routes_are_looked_up_by_method_and_path() {
        let route = |method, plugin: &str| Route {
            method,
            path: "/status".to_string(),
            plugin: plugin.to_string(),
            handler: Arc::new(Echo),
        };
        let registry = Registry {
            routes: vec![
                route(HttpMethod::Get, "first"),
                route(HttpMethod::Get, "second"),
            ],
            ..Registry::new()
        };

        assert_eq!(
            registry.find_route(HttpMethod::Get, "/status").map(|r| r.plugin.as_str()),
            Some("second")
        );
        assert!(registry.find_route(HttpMethod::Post, "/status").is_none());
        assert_eq!("post".parse::<HttpMethod>(), Ok(HttpMethod::Post));
        assert!("DELETE".parse::<HttpMethod>().is_err());
    }
}
