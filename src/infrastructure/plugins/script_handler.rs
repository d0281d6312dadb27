//! Handlers backed by Rhai functions

use async_trait::async_trait;
use rhai::{Dynamic, Engine, FnPtr, AST};
use std::sync::Arc;

use super::capability::json_to_dynamic;
use super::sandbox::error_message;
use crate::application::errors::HandlerError;
use crate::domain::entities::{BotHandle, JoinTrigger, Reply, Trigger};
use crate::domain::traits::{CommandHandler, HandlerResult, JoinHandler, RouteHandler};

/// A compiled plugin together with the engine it was run in
pub struct ScriptUnit {
    pub name: String,
    pub engine: Engine,
    pub ast: AST,
}

impl ScriptUnit {
    fn call(&self, function: &FnPtr, args: impl rhai::FuncArgs) -> Result<Dynamic, HandlerError> {
        function
            .call::<Dynamic>(&self.engine, &self.ast, args)
            .map_err(|e| HandlerError::new(error_message(&e)))
    }
}

/// Turn a handler's return value into output lines
pub fn output_lines(value: Dynamic) -> Vec<String> {
    if value.is_unit() {
        Vec::new()
    } else if value.is_array() {
        value
            .into_array()
            .map(|items| items.iter().map(|item| item.to_string()).collect())
            .unwrap_or_default()
    } else {
        vec![value.to_string()]
    }
}

pub struct ScriptCommandHandler {
    unit: Arc<ScriptUnit>,
    function: FnPtr,
}

impl ScriptCommandHandler {
    pub fn new(unit: Arc<ScriptUnit>, function: FnPtr) -> Self {
        Self { unit, function }
    }
}

#[async_trait]
impl CommandHandler for ScriptCommandHandler {
    async fn handle(&self, trigger: Trigger, reply: Reply, bot: BotHandle) -> HandlerResult {
        let unit = self.unit.clone();
        let function = self.function.clone();
        tokio::task::spawn_blocking(move || {
            unit.call(&function, (trigger, reply, bot)).map(output_lines)
        })
        .await
        .map_err(|e| HandlerError::new(format!("handler task failed: {}", e)))?
    }
}

pub struct ScriptJoinHandler {
    unit: Arc<ScriptUnit>,
    function: FnPtr,
}

impl ScriptJoinHandler {
    pub fn new(unit: Arc<ScriptUnit>, function: FnPtr) -> Self {
        Self { unit, function }
    }
}

#[async_trait]
impl JoinHandler for ScriptJoinHandler {
    async fn handle(&self, trigger: JoinTrigger, bot: BotHandle) -> HandlerResult {
        let unit = self.unit.clone();
        let function = self.function.clone();
        tokio::task::spawn_blocking(move || unit.call(&function, (trigger, bot)).map(output_lines))
            .await
            .map_err(|e| HandlerError::new(format!("handler task failed: {}", e)))?
    }
}

/// Route handler; the request and response are JSON values
pub struct ScriptRouteHandler {
    unit: Arc<ScriptUnit>,
    function: FnPtr,
}

impl ScriptRouteHandler {
    pub fn new(unit: Arc<ScriptUnit>, function: FnPtr) -> Self {
        Self { unit, function }
    }
}

impl RouteHandler for ScriptRouteHandler {
    fn handle(&self, request: serde_json::Value) -> Result<serde_json::Value, HandlerError> {
        let response = self
            .unit
            .call(&self.function, (json_to_dynamic(&request),))?;
        rhai::serde::from_dynamic(&response).map_err(|e| HandlerError::new(error_message(&e)))
    }
}
