//! Local replicas of hub-owned state

pub mod lobby;
pub mod session;
pub mod subscription;

pub use lobby::{LobbyState, LobbyStore, PlayerInfo};
pub use session::{
    Entity, PlayerDied, PlayerHit, Projectile, SessionNotification, SessionState, SessionStore,
};
pub use subscription::Subscription;
