//! Capabilities exposed to plugin scripts
//!
//! A plugin engine starts bare (see [`sandbox`](super::sandbox)). This
//! module adds the only host surface a script can reach:
//!
//! - registration: `register_command`, `register_join`, `add_route`
//! - configuration store: `config_get`, `config_set`
//! - authorization administration: bans, admins, channel groups,
//!   permission groups and the persisted channel list
//! - control: `reload_plugins`, `list_commands`
//! - database: `sql_query`, `sql_execute`
//! - logging: `log_info`, `log_warn`, `log_usage`
//!
//! plus the `Trigger`, `JoinTrigger`, `Reply` and `Bot` types handed to
//! handlers.

use rhai::{Array, Dynamic, Engine, EvalAltResult, FnPtr, ImmutableString, Map};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use super::registry::RegistrySlot;
use super::sandbox::script_error;
use crate::application::errors::StorageError;
use crate::application::services::{AuthDocument, AuthGate};
use crate::domain::entities::{BotHandle, ControlRequest, JoinTrigger, Reply, Trigger};
use crate::domain::traits::ConfigStore;
use crate::infrastructure::database::Database;

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// A route declared with `add_route`, not yet validated
pub struct RawRoute {
    pub method: String,
    pub path: String,
    pub handler: FnPtr,
}

/// Registration payloads collected while a unit's top level runs
#[derive(Default)]
pub struct Registrations {
    pub commands: Vec<Map>,
    pub joins: Vec<Map>,
    pub routes: Vec<RawRoute>,
}

/// Sink for registration calls. Closed once the unit has run; later
/// calls (from inside handlers) are ignored.
#[derive(Clone)]
pub struct Collector {
    plugin: Arc<str>,
    inner: Arc<Mutex<Option<Registrations>>>,
}

impl Collector {
    pub fn open(plugin: &str) -> Self {
        Self {
            plugin: Arc::from(plugin),
            inner: Arc::new(Mutex::new(Some(Registrations::default()))),
        }
    }

    /// Stop accepting registrations and hand over what was collected
    pub fn close(&self) -> Registrations {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default()
    }

    fn with(&self, call: &str, f: impl FnOnce(&mut Registrations)) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner.as_mut() {
            Some(registrations) => f(registrations),
            None => tracing::warn!(
                plugin = %self.plugin,
                "{} called after loading finished, ignored",
                call
            ),
        }
    }
}

/// Register the handler-facing types
pub fn register_types(engine: &mut Engine) {
    engine
        .register_type_with_name::<Trigger>("Trigger")
        .register_get("is_channel", |t: &mut Trigger| t.is_channel)
        .register_get("args", |t: &mut Trigger| -> Array {
            t.args.iter().cloned().map(Dynamic::from).collect()
        })
        .register_get("from", |t: &mut Trigger| t.sender.clone())
        .register_get("to", |t: &mut Trigger| t.target.clone())
        .register_get("message", |t: &mut Trigger| t.message.clone())
        .register_get("raw", |t: &mut Trigger| json_to_dynamic(&t.raw));

    engine
        .register_type_with_name::<JoinTrigger>("JoinTrigger")
        .register_get("channel", |t: &mut JoinTrigger| t.channel.clone())
        .register_get("nick", |t: &mut JoinTrigger| t.nick.clone())
        .register_get("raw", |t: &mut JoinTrigger| json_to_dynamic(&t.raw));

    engine
        .register_type_with_name::<Reply>("Reply")
        .register_fn("format", |r: &mut Reply, line: ImmutableString| {
            r.line(line.as_str())
        })
        .register_fn("format", |r: &mut Reply, lines: Array| -> Array {
            let lines: Vec<String> = lines.iter().map(|line| line.to_string()).collect();
            r.lines(&lines).into_iter().map(Dynamic::from).collect()
        });

    engine
        .register_type_with_name::<BotHandle>("Bot")
        .register_fn(
            "say",
            |b: &mut BotHandle, target: ImmutableString, line: ImmutableString| {
                b.say(target.as_str(), line.as_str())
            },
        )
        .register_fn("join", |b: &mut BotHandle, channel: ImmutableString| {
            b.join(channel.as_str())
        })
        .register_fn("part", |b: &mut BotHandle, channel: ImmutableString| {
            b.part(channel.as_str())
        });
}

/// Host services shared by every plugin engine
pub struct HostCapabilities {
    store: Arc<dyn ConfigStore>,
    auth: Arc<AuthGate>,
    database: Arc<Database>,
    registry: Arc<RegistrySlot>,
    control: mpsc::UnboundedSender<ControlRequest>,
}

impl HostCapabilities {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        auth: Arc<AuthGate>,
        database: Arc<Database>,
        registry: Arc<RegistrySlot>,
        control: mpsc::UnboundedSender<ControlRequest>,
    ) -> Self {
        Self {
            store,
            auth,
            database,
            registry,
            control,
        }
    }

    /// Install the whole script-facing surface into `engine`
    pub fn install(self: &Arc<Self>, engine: &mut Engine, plugin: &str, collector: &Collector) {
        register_types(engine);
        install_registration(engine, collector);
        self.install_store(engine);
        self.install_authorization(engine);
        self.install_control(engine);
        self.install_database(engine);
        install_logging(engine, plugin);
    }

    fn install_store(self: &Arc<Self>, engine: &mut Engine) {
        let host = self.clone();
        engine.register_fn("config_get", move |name: ImmutableString| {
            json_to_dynamic(&host.store.get(name.as_str()))
        });

        let host = self.clone();
        engine.register_fn(
            "config_set",
            move |name: ImmutableString, document: Dynamic| -> ScriptResult<()> {
                let document: serde_json::Value = rhai::serde::from_dynamic(&document)?;
                // Authorization documents go through the gate so its state follows
                let written = match AuthDocument::from_name(name.as_str()) {
                    Some(auth) => host.auth.replace_document(auth, document),
                    None => host.store.set(name.as_str(), document),
                };
                written.map_err(storage_error)
            },
        );
    }

    fn install_authorization(self: &Arc<Self>, engine: &mut Engine) {
        let auth = self.auth.clone();
        engine.register_fn("is_banned", move |nick: ImmutableString| auth.is_banned(&nick));
        let auth = self.auth.clone();
        engine.register_fn("ban", move |nick: ImmutableString| {
            auth.ban(&nick).map_err(storage_error)
        });
        let auth = self.auth.clone();
        engine.register_fn("unban", move |nick: ImmutableString| {
            auth.unban(&nick).map_err(storage_error)
        });

        let auth = self.auth.clone();
        engine.register_fn("is_admin", move |identity: ImmutableString| {
            auth.is_admin_identity(&identity)
        });
        let auth = self.auth.clone();
        engine.register_fn("admin_add", move |identity: ImmutableString| {
            auth.add_admin(&identity).map_err(storage_error)
        });
        let auth = self.auth.clone();
        engine.register_fn("admin_remove", move |identity: ImmutableString| {
            auth.remove_admin(&identity).map_err(storage_error)
        });

        let auth = self.auth.clone();
        engine.register_fn(
            "group_add_channel",
            move |group: ImmutableString, channel: ImmutableString| {
                auth.add_channel_to_group(&group, &channel)
                    .map_err(storage_error)
            },
        );
        let auth = self.auth.clone();
        engine.register_fn(
            "group_remove_channel",
            move |group: ImmutableString, channel: ImmutableString| {
                auth.remove_channel_from_group(&group, &channel)
                    .map_err(storage_error)
            },
        );
        let auth = self.auth.clone();
        engine.register_fn("group_remove", move |group: ImmutableString| {
            auth.remove_group(&group).map_err(storage_error)
        });
        let auth = self.auth.clone();
        engine.register_fn("group_channels", move |group: ImmutableString| {
            strings_to_array(auth.group_channels(&group))
        });
        let auth = self.auth.clone();
        engine.register_fn(
            "in_group",
            move |group: ImmutableString, channel: ImmutableString| {
                auth.in_channel_group(&group, &channel)
            },
        );

        let auth = self.auth.clone();
        engine.register_fn("perm_add_group", move |group: ImmutableString| {
            auth.add_permission_group(&group).map_err(storage_error)
        });
        let auth = self.auth.clone();
        engine.register_fn("perm_remove_group", move |group: ImmutableString| {
            auth.remove_permission_group(&group).map_err(storage_error)
        });
        let auth = self.auth.clone();
        engine.register_fn(
            "perm_grant",
            move |group: ImmutableString, identity: ImmutableString| {
                auth.grant(&group, &identity).map_err(storage_error)
            },
        );
        let auth = self.auth.clone();
        engine.register_fn(
            "perm_revoke",
            move |group: ImmutableString, identity: ImmutableString| {
                auth.revoke(&group, &identity).map_err(storage_error)
            },
        );
        let auth = self.auth.clone();
        engine.register_fn(
            "has_permission",
            move |group: ImmutableString, identity: ImmutableString| {
                auth.has_permission(&group, &identity)
            },
        );

        let auth = self.auth.clone();
        engine.register_fn("channels", move || strings_to_array(auth.channels()));
        let host = self.clone();
        engine.register_fn(
            "channel_add",
            move |channel: ImmutableString| -> ScriptResult<bool> {
                let added = host.auth.add_channel(&channel).map_err(storage_error)?;
                host.send_control(ControlRequest::Join(channel.to_string()));
                Ok(added)
            },
        );
        let host = self.clone();
        engine.register_fn(
            "channel_remove",
            move |channel: ImmutableString| -> ScriptResult<bool> {
                let removed = host.auth.remove_channel(&channel).map_err(storage_error)?;
                host.send_control(ControlRequest::Part(channel.to_string()));
                Ok(removed)
            },
        );
    }

    fn install_control(self: &Arc<Self>, engine: &mut Engine) {
        let host = self.clone();
        engine.register_fn("reload_plugins", move || -> ScriptResult<()> {
            host.control
                .send(ControlRequest::Reload)
                .map_err(|_| script_error("bot is not running, reload unavailable"))
        });

        let host = self.clone();
        engine.register_fn("list_commands", move || -> Array {
            host.registry
                .snapshot()
                .commands
                .iter()
                .map(|d| {
                    let mut entry = Map::new();
                    entry.insert("plugin".into(), d.plugin.clone().into());
                    entry.insert("name".into(), d.name.clone().into());
                    entry.insert("type".into(), d.spec.kind().to_string().into());
                    entry.insert("key".into(), d.spec.key().to_string().into());
                    entry.insert("help".into(), optional_string(&d.help));
                    entry.insert("example".into(), optional_string(&d.example));
                    entry.insert(
                        "places".into(),
                        strings_to_array(d.places.iter().map(|p| p.to_string()).collect())
                            .into(),
                    );
                    Dynamic::from_map(entry)
                })
                .collect()
        });
    }

    fn install_database(self: &Arc<Self>, engine: &mut Engine) {
        let host = self.clone();
        engine.register_fn("sql_query", move |sql: ImmutableString| {
            host.sql_query(&sql, Array::new())
        });
        let host = self.clone();
        engine.register_fn("sql_query", move |sql: ImmutableString, params: Array| {
            host.sql_query(&sql, params)
        });
        let host = self.clone();
        engine.register_fn("sql_execute", move |sql: ImmutableString| {
            host.sql_execute(&sql, Array::new())
        });
        let host = self.clone();
        engine.register_fn("sql_execute", move |sql: ImmutableString, params: Array| {
            host.sql_execute(&sql, params)
        });
    }

    fn sql_query(&self, sql: &str, params: Array) -> ScriptResult<Array> {
        let params = sql_params(&params)?;
        let rows = self.database.query(sql, &params).map_err(storage_error)?;
        rows.into_iter()
            .map(|row| rhai::serde::to_dynamic(serde_json::Value::Object(row)))
            .collect()
    }

    fn sql_execute(&self, sql: &str, params: Array) -> ScriptResult<i64> {
        let params = sql_params(&params)?;
        let changed = self.database.execute(sql, &params).map_err(storage_error)?;
        i64::try_from(changed).map_err(|e| script_error(e.to_string()))
    }

    fn send_control(&self, request: ControlRequest) {
        if let Err(e) = self.control.send(request) {
            tracing::warn!("Control request dropped, bot is not running: {:?}", e.0);
        }
    }
}

fn install_registration(engine: &mut Engine, collector: &Collector) {
    let sink = collector.clone();
    engine.register_fn("register_command", move |payload: Map| {
        sink.with("register_command", |r| r.commands.push(payload));
    });

    let sink = collector.clone();
    engine.register_fn("register_join", move |payload: Map| {
        sink.with("register_join", |r| r.joins.push(payload));
    });

    let sink = collector.clone();
    engine.register_fn(
        "add_route",
        move |method: ImmutableString, path: ImmutableString, handler: FnPtr| {
            sink.with("add_route", |r| {
                r.routes.push(RawRoute {
                    method: method.to_string(),
                    path: path.to_string(),
                    handler,
                })
            });
        },
    );
}

fn install_logging(engine: &mut Engine, plugin: &str) {
    let name = plugin.to_string();
    engine.register_fn("log_info", move |message: ImmutableString| {
        tracing::info!(plugin = %name, "{}", message);
    });
    let name = plugin.to_string();
    engine.register_fn("log_warn", move |message: ImmutableString| {
        tracing::warn!(plugin = %name, "{}", message);
    });
    let name = plugin.to_string();
    engine.register_fn("log_usage", move |message: ImmutableString| {
        tracing::info!(target: "usage", plugin = %name, "{}", message);
    });
}

pub(crate) fn json_to_dynamic(value: &serde_json::Value) -> Dynamic {
    rhai::serde::to_dynamic(value).unwrap_or(Dynamic::UNIT)
}

fn sql_params(params: &Array) -> ScriptResult<Vec<serde_json::Value>> {
    params
        .iter()
        .map(|param| rhai::serde::from_dynamic(param))
        .collect()
}

fn strings_to_array(items: Vec<String>) -> Array {
    items.into_iter().map(Dynamic::from).collect()
}

fn optional_string(value: &Option<String>) -> Dynamic {
    value.clone().map(Dynamic::from).unwrap_or(Dynamic::UNIT)
}

fn storage_error(e: StorageError) -> Box<rhai::EvalAltResult> {
    script_error(e.to_string())
}
