//! Domain layer - Core types shared by the runtime
//!
//! This layer contains:
//! - Entities: events, descriptors, triggers, authorization state
//! - Traits: Abstractions for the transport, the config store and handlers

pub mod entities;
pub mod traits;
