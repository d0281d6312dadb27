//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Storage: JSON document store
//! - Database: SQLite handle for plugins
//! - Plugins: Rhai sandbox, loader and registry
//! - Adapters: Transport implementations (console)

pub mod adapters;
pub mod config;
pub mod database;
pub mod plugins;
pub mod storage;
