//! Inbound event handling: normalization and dispatch

pub mod command;
pub mod dispatcher;

pub use command::{normalize, InboundCommand, EVENT_NAMES};
pub use dispatcher::EventDispatcher;
