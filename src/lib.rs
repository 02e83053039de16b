//! Space Session Client - multiplayer session synchronization for the space shooter
//!
//! Keeps a local replica of a hub-hosted match:
//! - persistent hub connection with reconnect and a bounded readiness gate
//! - inbound event normalization into typed store mutations
//! - lobby create / join / leadership / game start coordination
//! - deterministic teardown between sessions

pub mod app;
pub mod config;
pub mod error;
pub mod hub;
pub mod lobby;
pub mod session;
pub mod store;
pub mod sync;
pub mod util;

pub use app::ClientContext;
pub use config::Config;
pub use error::{ConnectionError, InvokeError, LobbyError};
