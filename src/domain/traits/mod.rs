//! Domain traits - Abstractions for infrastructure implementations

pub mod handler;
pub mod store;
pub mod transport;

pub use handler::{
    CommandHandler, FnCommandHandler, FnJoinHandler, HandlerResult, JoinHandler, RouteHandler,
};
pub use store::ConfigStore;
pub use transport::Transport;
