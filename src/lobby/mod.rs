//! Lobby formation, leadership and game start

pub mod coordinator;
pub mod flow;

pub use coordinator::LobbyCoordinator;
pub use flow::{
    CreateLobbyForm, CreateLobbyState, FlowEvent, FlowKind, FlowPhase, FlowStatus, JoinLobbyForm,
    JoinLobbyState,
};
