//! syer-bot - a chat bot driven by sandboxed, reloadable plugin scripts
//!
//! Inbound chat events are fanned out to every registered plugin
//! descriptor. Each branch is matched, authorized, invoked and delivered
//! independently.

pub mod application;
pub mod domain;
pub mod infrastructure;
