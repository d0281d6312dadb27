use async_trait::async_trait;

use crate::application::errors::HandlerError;
use crate::domain::entities::{BotHandle, JoinTrigger, Reply, Trigger};

/// Handler result: zero, one or many lines to send to the event's target
pub type HandlerResult = Result<Vec<String>, HandlerError>;

/// Handler behind a command descriptor
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, trigger: Trigger, reply: Reply, bot: BotHandle) -> HandlerResult;
}

/// Handler behind a join descriptor
#[async_trait]
pub trait JoinHandler: Send + Sync {
    async fn handle(&self, trigger: JoinTrigger, bot: BotHandle) -> HandlerResult;
}

/// Handler behind a plugin HTTP route.
///
/// The request and response are plain JSON; serving them is up to the
/// HTTP facility that looks routes up in the registry.
pub trait RouteHandler: Send + Sync {
    fn handle(&self, request: serde_json::Value) -> Result<serde_json::Value, HandlerError>;
}

/// Command handler backed by a plain closure
pub struct FnCommandHandler<F>(F);

impl<F> FnCommandHandler<F>
where
    F: Fn(Trigger, Reply, BotHandle) -> HandlerResult + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> CommandHandler for FnCommandHandler<F>
where
    F: Fn(Trigger, Reply, BotHandle) -> HandlerResult + Send + Sync,
{
    async fn handle(&self, trigger: Trigger, reply: Reply, bot: BotHandle) -> HandlerResult {
        (self.0)(trigger, reply, bot)
    }
}

/// Join handler backed by a plain closure
pub struct FnJoinHandler<F>(F);

impl<F> FnJoinHandler<F>
where
    F: Fn(JoinTrigger, BotHandle) -> HandlerResult + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> JoinHandler for FnJoinHandler<F>
where
    F: Fn(JoinTrigger, BotHandle) -> HandlerResult + Send + Sync,
{
    async fn handle(&self, trigger: JoinTrigger, bot: BotHandle) -> HandlerResult {
        (self.0)(trigger, bot)
    }
}
