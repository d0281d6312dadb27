//! Domain entities - Core objects the dispatcher works on

pub mod auth;
pub mod control;
pub mod descriptor;
pub mod event;
pub mod matcher;
pub mod trigger;

pub use auth::AuthorizationState;
pub use control::ControlRequest;
pub use descriptor::{
    ChannelRestriction, CommandDescriptor, CommandRegistration, Descriptor, JoinDescriptor,
    JoinRegistration,
};
pub use event::{ChatEvent, EventKind, Place};
pub use matcher::{CommandSpec, Matcher};
pub use trigger::{BotHandle, JoinTrigger, Reply, TransportAction, Trigger};
