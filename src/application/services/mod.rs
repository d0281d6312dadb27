//! Application services - Business logic orchestration

pub mod authorization;
pub mod bot_service;

pub use authorization::{AuthDocument, AuthGate};
pub use bot_service::BotService;
