//! Plugin loading and host capability tests
//! Run with: cargo test --test plugin_loader_test

mod common;

use serde_json::json;

use common::{echo_plugin, Harness};
use syer_bot::application::errors::PluginError;
use syer_bot::domain::entities::{ChatEvent, ControlRequest};
use syer_bot::domain::traits::ConfigStore;
use syer_bot::infrastructure::config::SandboxConfig;
use syer_bot::infrastructure::plugins::HttpMethod;

fn failed_plugins(errors: &[PluginError]) -> Vec<String> {
    errors
        .iter()
        .map(|e| match e {
            PluginError::LoadFailure { plugin, .. }
            | PluginError::MalformedRegistration { plugin, .. } => plugin.clone(),
            other => panic!("unexpected error {:?}", other),
        })
        .collect()
}

#[tokio::test]
async fn test_broken_plugin_does_not_block_the_rest() {
    let h = Harness::new(&[
        ("a.rhai", &echo_plugin("a", "!a", "a")),
        ("b.rhai", &echo_plugin("b", "!b", "b")),
        ("broken.rhai", "register_command(#{ name: \"x\", "),
        ("c.rhai", &echo_plugin("c", "!c", "c")),
    ]);
    let report = h.load().await;

    assert_eq!(report.loaded, vec!["a.rhai", "b.rhai", "c.rhai"]);
    assert_eq!(failed_plugins(&report.failed), vec!["broken.rhai"]);
    assert_eq!(report.commands, 3);
    assert_eq!(h.slot.snapshot().commands.len(), 3);
}

#[tokio::test]
async fn test_failing_unit_keeps_nothing_it_registered() {
    let plugin = format!("{}\nthrow \"boom\";", echo_plugin("half", "!half", "half"));
    let h = Harness::new(&[("half.rhai", &plugin)]);
    let report = h.load().await;

    assert!(report.loaded.is_empty());
    assert_eq!(
        report.failed,
        vec![PluginError::load_failure("half.rhai", "boom")]
    );
    assert!(h.slot.snapshot().is_empty());
}

#[tokio::test]
async fn test_malformed_registrations_are_discarded_individually() {
    let plugin = r#"
register_command(#{
    name: "good",
    command: #{ type: "exact", key: "!good" },
    run: |trigger, reply, bot| "good"
});
register_command(#{
    command: #{ type: "exact", key: "!nameless" },
    run: |trigger, reply, bot| "nameless"
});
register_command(#{
    name: "badregex",
    command: #{ type: "regex", pattern: "(unclosed" },
    run: |trigger, reply, bot| "bad"
});
register_command(#{
    name: "fuzzy",
    command: #{ type: "fuzzy", key: "!fuzzy" },
    run: |trigger, reply, bot| "fuzzy"
});
register_command(#{
    name: "nohandler",
    command: #{ type: "exact", key: "!nohandler" }
});
register_command(#{
    name: "badplace",
    command: #{ type: "exact", key: "!badplace" },
    places: ["moon"],
    run: |trigger, reply, bot| "moon"
});
register_join(#{ admin_only: true });
"#;
    let h = Harness::new(&[("mixed.rhai", plugin)]);
    let report = h.load().await;

    assert_eq!(report.loaded, vec!["mixed.rhai"]);
    assert!(report.failed.is_empty());
    assert_eq!(report.discarded.len(), 6);
    assert!(report
        .discarded
        .iter()
        .all(|e| matches!(e, PluginError::MalformedRegistration { .. })));
    assert_eq!(report.commands, 1);
    assert_eq!(report.joins, 0);
    assert!(!report.is_clean());

    h.dispatcher
        .dispatch(ChatEvent::message("alice", "#general", "!good"))
        .await;
    assert_eq!(h.transport.lines_to("#general"), vec!["good"]);
}

#[tokio::test]
async fn test_sandbox_blocks_import_and_eval() {
    let h = Harness::new(&[
        ("import.rhai", "import \"secrets\" as s;\nlet x = s::answer;"),
        ("eval.rhai", "let x = eval(\"40 + 2\");"),
    ]);
    let report = h.load().await;

    assert!(report.loaded.is_empty());
    assert_eq!(failed_plugins(&report.failed), vec!["eval.rhai", "import.rhai"]);
    assert!(h.slot.snapshot().is_empty());
}

#[tokio::test]
async fn test_runaway_script_is_stopped() {
    let sandbox = SandboxConfig {
        max_operations: 10_000,
        ..SandboxConfig::default()
    };
    let h = Harness::with_sandbox(
        &[
            ("spin.rhai", "let n = 0;\nloop { n += 1; }"),
            ("fine.rhai", &echo_plugin("fine", "!fine", "fine")),
        ],
        sandbox,
    );
    let report = h.load().await;

    assert_eq!(report.loaded, vec!["fine.rhai"]);
    assert_eq!(failed_plugins(&report.failed), vec!["spin.rhai"]);
}

#[tokio::test]
async fn test_runaway_handler_reports_an_error() {
    let plugin = r#"
register_command(#{
    name: "spin",
    command: #{ type: "exact", key: "!spin" },
    run: |trigger, reply, bot| { loop {} }
});
"#;
    let sandbox = SandboxConfig {
        max_operations: 10_000,
        ..SandboxConfig::default()
    };
    let h = Harness::with_sandbox(&[("spin.rhai", plugin)], sandbox);
    h.load().await;

    let summary = h
        .dispatcher
        .dispatch(ChatEvent::private_message("alice", "!spin"))
        .await;
    assert_eq!(summary.failed, 1);
    let lines = h.transport.lines_to("alice");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("Error: "));
}

#[tokio::test]
async fn test_discovery_skips_hidden_and_foreign_files() {
    let h = Harness::new(&[
        ("visible.rhai", &echo_plugin("visible", "!v", "v")),
        (".hidden.rhai", &echo_plugin("hidden", "!h", "h")),
        ("notes.txt", "not a plugin"),
        ("backup.rhai.bak", &echo_plugin("bak", "!b", "b")),
    ]);
    let report = h.load().await;
    assert_eq!(report.loaded, vec!["visible.rhai"]);
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_missing_directory_loads_nothing() {
    let h = Harness::new(&[("a.rhai", &echo_plugin("a", "!a", "a"))]);
    h.load().await;
    assert_eq!(h.slot.snapshot().len(), 1);

    std::fs::remove_dir_all(h.dir.path()).unwrap();
    let report = h.load().await;
    assert!(report.loaded.is_empty());
    assert!(report.failed.is_empty());
    assert!(h.slot.snapshot().is_empty());
}

#[tokio::test]
async fn test_reload_is_idempotent_and_picks_up_changes() {
    let h = Harness::new(&[("a.rhai", &echo_plugin("a", "!hi", "once"))]);
    let first = h.load().await;
    let second = h.load().await;
    assert_eq!(first, second);

    h.dispatcher
        .dispatch(ChatEvent::private_message("alice", "!hi"))
        .await;
    assert_eq!(h.transport.lines_to("alice"), vec!["once"]);

    h.write_plugin("b.rhai", &echo_plugin("b", "!bye", "later"));
    let third = h.load().await;
    assert_eq!(third.loaded, vec!["a.rhai", "b.rhai"]);
    assert_eq!(third.commands, 2);
}

#[tokio::test]
async fn test_registration_after_load_is_ignored() {
    let plugin = r#"
register_command(#{
    name: "sneaky",
    command: #{ type: "exact", key: "!sneaky" },
    run: |trigger, reply, bot| {
        register_command(#{
            name: "late",
            command: #{ type: "exact", key: "!late" },
            run: |t, r, b| "late"
        });
        "tried"
    }
});
"#;
    let h = Harness::new(&[("sneaky.rhai", plugin)]);
    h.load().await;

    h.dispatcher
        .dispatch(ChatEvent::private_message("alice", "!sneaky"))
        .await;
    let summary = h
        .dispatcher
        .dispatch(ChatEvent::private_message("alice", "!late"))
        .await;

    assert_eq!(summary.matched, 0);
    assert_eq!(h.transport.lines_to("alice"), vec!["tried"]);
    assert_eq!(h.slot.snapshot().commands.len(), 1);
}

#[tokio::test]
async fn test_routes_are_registered_and_served() {
    let a = r#"
add_route("GET", "/status", |request| #{ ok: false });
add_route("post", "/echo", |request| #{ echoed: request.text, plugin: "a" });
add_route("GET", "status", |request| 1);
add_route("DELETE", "/gone", |request| 1);
"#;
    let b = r#"
add_route("GET", "/status", |request| #{ ok: true, who: request.who });
"#;
    let h = Harness::new(&[("a.rhai", a), ("b.rhai", b)]);
    let report = h.load().await;
    assert_eq!(report.routes, 3);
    assert_eq!(report.discarded.len(), 2);

    let registry = h.slot.snapshot();
    let status = registry.find_route(HttpMethod::Get, "/status").unwrap();
    assert_eq!(status.plugin, "b.rhai");
    assert_eq!(
        status.handler.handle(json!({ "who": "ops" })).unwrap(),
        json!({ "ok": true, "who": "ops" })
    );

    let echo = registry.find_route(HttpMethod::Post, "/echo").unwrap();
    assert_eq!(
        echo.handler.handle(json!({ "text": "hi" })).unwrap(),
        json!({ "echoed": "hi", "plugin": "a" })
    );

    assert!(registry.find_route(HttpMethod::Get, "/echo").is_none());
    // Routes alone do not count as descriptors
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_store_round_trip_through_scripts() {
    let plugin = r#"
config_set("counter", #{ hits: 0 });

register_command(#{
    name: "hit",
    command: #{ type: "exact", key: "!hit" },
    run: |trigger, reply, bot| {
        let doc = config_get("counter");
        doc.hits += 1;
        config_set("counter", doc);
        doc.hits
    }
});
"#;
    let h = Harness::new(&[("counter.rhai", plugin)]);
    h.load().await;
    assert_eq!(h.store.get("counter"), json!({ "hits": 0 }));

    for _ in 0..2 {
        h.dispatcher
            .dispatch(ChatEvent::private_message("alice", "!hit"))
            .await;
    }
    assert_eq!(h.transport.lines_to("alice"), vec!["1", "2"]);
    assert_eq!(h.store.get("counter"), json!({ "hits": 2 }));
}

#[tokio::test]
async fn test_sql_facade() {
    let plugin = r#"
sql_execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, nick TEXT, body TEXT)");

register_command(#{
    name: "addnote",
    command: #{ type: "regex", pattern: "^!addnote (.+)$" },
    run: |trigger, reply, bot| {
        sql_execute("INSERT INTO notes (nick, body) VALUES (?1, ?2)", [trigger.from, trigger.args[0]]);
        "saved"
    }
});

register_command(#{
    name: "countnotes",
    command: #{ type: "exact", key: "!countnotes" },
    run: |trigger, reply, bot| {
        let rows = sql_query("SELECT COUNT(*) AS n FROM notes WHERE nick = ?1", [trigger.from]);
        "notes: " + rows[0].n
    }
});
"#;
    let h = Harness::new(&[("notes.rhai", plugin)]);
    let report = h.load().await;
    assert!(report.is_clean());

    for body in ["!addnote first", "!addnote second", "!countnotes"] {
        h.dispatcher
            .dispatch(ChatEvent::private_message("alice", body))
            .await;
    }
    h.dispatcher
        .dispatch(ChatEvent::private_message("bob", "!countnotes"))
        .await;

    assert_eq!(
        h.transport.lines_to("alice"),
        vec!["notes: 2", "saved", "saved"]
    );
    assert_eq!(h.transport.lines_to("bob"), vec!["notes: 0"]);
}

#[tokio::test]
async fn test_sql_error_surfaces_as_handler_error() {
    let plugin = r#"
register_command(#{
    name: "bad",
    command: #{ type: "exact", key: "!bad" },
    run: |trigger, reply, bot| sql_query("SELECT * FROM missing_table")
});
"#;
    let h = Harness::new(&[("bad.rhai", plugin)]);
    h.load().await;

    let summary = h
        .dispatcher
        .dispatch(ChatEvent::private_message("alice", "!bad"))
        .await;
    assert_eq!(summary.failed, 1);
    let lines = h.transport.lines_to("alice");
    assert!(lines[0].starts_with("Error: "));
    assert!(lines[0].contains("missing_table"));
}

#[tokio::test]
async fn test_control_requests_from_scripts() {
    let plugin = r#"
register_command(#{
    name: "reload",
    command: #{ type: "exact", key: "!reload" },
    run: |trigger, reply, bot| { reload_plugins(); "ok" }
});
register_command(#{
    name: "join",
    command: #{ type: "prefix", key: "!join" },
    run: |trigger, reply, bot| { channel_add(trigger.args[0]); "ok" }
});
register_command(#{
    name: "part",
    command: #{ type: "prefix", key: "!part" },
    run: |trigger, reply, bot| { channel_remove(trigger.args[0]); "ok" }
});
"#;
    let mut h = Harness::new(&[("control.rhai", plugin)]);
    h.load().await;

    for body in ["!reload", "!join #rust", "!join #ops", "!part #rust"] {
        h.dispatcher
            .dispatch(ChatEvent::private_message("root", body))
            .await;
    }

    let mut requests = Vec::new();
    while let Ok(request) = h.control.try_recv() {
        requests.push(request);
    }
    assert_eq!(
        requests,
        vec![
            ControlRequest::Reload,
            ControlRequest::Join("#rust".into()),
            ControlRequest::Join("#ops".into()),
            ControlRequest::Part("#rust".into()),
        ]
    );
    assert_eq!(h.auth.channels(), vec!["#ops"]);
    // Dispatching does not reload by itself
    assert_eq!(h.slot.snapshot().commands.len(), 3);
}

#[tokio::test]
async fn test_authorization_functions_share_state_with_the_gate() {
    let plugin = r##"
register_command(#{
    name: "setup",
    command: #{ type: "exact", key: "!setup" },
    run: |trigger, reply, bot| {
        ban("troll");
        admin_add("root_account");
        perm_grant("mods", "alice_account");
        group_add_channel("ops", "#ops");
        [is_banned("troll"), is_admin("root_account"), has_permission("mods", "alice_account"), in_group("ops", "#ops")]
    }
});
"##;
    let h = Harness::new(&[("setup.rhai", plugin)]);
    h.load().await;

    h.dispatcher
        .dispatch(ChatEvent::private_message("root", "!setup"))
        .await;
    assert_eq!(h.transport.lines_to("root"), vec!["true"; 4]);

    assert!(h.auth.is_banned("troll"));
    assert!(h.auth.is_admin_identity("root_account"));
    assert!(h.auth.has_permission("mods", "alice_account"));
    assert!(h.auth.in_channel_group("ops", "#ops"));
}

#[tokio::test]
async fn test_list_commands_sees_the_live_registry() {
    let plugin = r#"
register_command(#{
    name: "help",
    command: #{ type: "exact", key: "!help" },
    help: "List commands",
    run: |trigger, reply, bot| {
        let keys = [];
        for cmd in list_commands() {
            keys.push(cmd.plugin + " " + cmd.key);
        }
        keys
    }
});
"#;
    let h = Harness::new(&[
        ("help.rhai", plugin),
        ("ping.rhai", &echo_plugin("ping", "!ping", "pong")),
    ]);
    h.load().await;

    h.dispatcher
        .dispatch(ChatEvent::private_message("alice", "!help"))
        .await;
    assert_eq!(
        h.transport.lines_to("alice"),
        vec!["help.rhai !help", "ping.rhai !ping"]
    );
}

#[tokio::test]
async fn test_bundled_plugins_load_cleanly() {
    let h = Harness::new(&[]);
    let bundled = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("plugins");
    for entry in std::fs::read_dir(bundled).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        h.write_plugin(&name, &std::fs::read_to_string(&path).unwrap());
    }

    let report = h.load().await;
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(
        report.loaded,
        vec!["admin.rhai", "greet.rhai", "help.rhai", "quotes.rhai"]
    );
    assert_eq!(report.joins, 2);

    h.dispatcher
        .dispatch(ChatEvent::message("alice", "#general", "!hello bob"))
        .await;
    h.dispatcher
        .dispatch(ChatEvent::message("alice", "#general", "!addquote rust is fun"))
        .await;
    h.dispatcher
        .dispatch(ChatEvent::message("alice", "#general", "!quote"))
        .await;
    assert_eq!(
        h.transport.lines_to("#general"),
        vec!["alice: hello bob!", "alice: quote saved", "rust is fun"]
    );
}
