//! Application layer - Use cases and business logic
//!
//! This layer contains:
//! - Services: authorization gate and the bot event loop
//! - Messaging: event dispatch
//! - Errors: error taxonomy shared by every layer

pub mod errors;
pub mod messaging;
pub mod services;
