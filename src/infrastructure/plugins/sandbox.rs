//! Rhai engine construction for plugin units
//!
//! Every unit gets its own engine. The engine has no module resolver,
//! no `eval`, and hard limits on operations, recursion and value sizes.
//! The standard Rhai packages have no file, process or network access.

use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult, Position};

use crate::infrastructure::config::SandboxConfig;

/// Build a bare sandboxed engine for the unit `plugin`
pub fn build_engine(config: &SandboxConfig, plugin: &str) -> Engine {
    let mut engine = Engine::new();

    engine.set_module_resolver(DummyModuleResolver::new());
    engine.disable_symbol("eval");

    engine.set_max_operations(config.max_operations);
    engine.set_max_call_levels(config.max_call_levels);
    engine.set_max_string_size(config.max_string_size);
    engine.set_max_array_size(config.max_array_size);
    engine.set_max_map_size(config.max_map_size);
    engine.set_max_expr_depths(config.max_expr_depth, config.max_expr_depth);

    let name = plugin.to_string();
    engine.on_print(move |text| tracing::info!(plugin = %name, "{}", text));
    let name = plugin.to_string();
    engine.on_debug(move |text, _source, pos| {
        tracing::debug!(plugin = %name, position = %pos, "{}", text)
    });

    engine
}

/// Runtime error carrying `message`, as thrown by a script
pub fn script_error(message: impl Into<String>) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        Dynamic::from(message.into()),
        Position::NONE,
    ))
}

/// Message for a script failure. Errors raised inside nested function
/// calls are unwrapped so a `throw "x"` reads as `x`.
pub fn error_message(error: &EvalAltResult) -> String {
    match error {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => error_message(inner),
        EvalAltResult::ErrorRuntime(value, _) => value.to_string(),
        other => other.to_string(),
    }
}
