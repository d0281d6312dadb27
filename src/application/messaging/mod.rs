//! Event handling - concurrent dispatch of chat events to plugins

pub mod dispatcher;

pub use dispatcher::{DispatchSummary, Dispatcher, SkipReason};
