//! Create / join lobby flow state
//!
//! Request scaffolding owned by the coordinator: `Idle -> Requesting ->
//! {Succeeded | Failed}`. A flow that exits for any reason goes back to its
//! initial value.

use serde::Serialize;

use crate::error::LobbyError;

/// Largest lobby the create form accepts
pub const MAX_LOBBY_SIZE: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FlowKind {
    Create,
    Join,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum FlowPhase {
    #[default]
    Idle,
    Requesting,
    Succeeded,
    Failed,
}

/// Phase plus the UI-facing loading / error fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowStatus {
    pub phase: FlowPhase,
    pub loading: bool,
    pub error: Option<String>,
}

impl FlowStatus {
    /// Enter `Requesting`; a second submission while requesting is rejected
    pub fn begin(&mut self) -> Result<(), LobbyError> {
        if self.phase == FlowPhase::Requesting {
            return Err(LobbyError::RequestInFlight);
        }
        self.phase = FlowPhase::Requesting;
        self.loading = true;
        self.error = None;
        Ok(())
    }

    /// `Requesting -> Succeeded`; false in any other phase
    pub fn succeed(&mut self) -> bool {
        if self.phase != FlowPhase::Requesting {
            return false;
        }
        self.phase = FlowPhase::Succeeded;
        self.loading = false;
        true
    }

    /// `Requesting -> Failed`; false in any other phase
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.phase != FlowPhase::Requesting {
            return false;
        }
        self.phase = FlowPhase::Failed;
        self.loading = false;
        self.error = Some(error.into());
        true
    }

    pub fn is_requesting(&self) -> bool {
        self.phase == FlowPhase::Requesting
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateLobbyForm {
    pub lobby_name: String,
    pub player_name: String,
    pub max_players: u32,
}

impl CreateLobbyForm {
    pub fn validate(&self) -> Result<(), LobbyError> {
        require_name("lobby name", &self.lobby_name)?;
        require_name("player name", &self.player_name)?;
        if !(1..=MAX_LOBBY_SIZE).contains(&self.max_players) {
            return Err(LobbyError::InvalidForm(format!(
                "max players must be between 1 and {MAX_LOBBY_SIZE}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinLobbyForm {
    pub lobby_name: String,
    pub player_name: String,
}

impl JoinLobbyForm {
    pub fn validate(&self) -> Result<(), LobbyError> {
        require_name("lobby name", &self.lobby_name)?;
        require_name("player name", &self.player_name)
    }
}

fn require_name(what: &str, value: &str) -> Result<(), LobbyError> {
    if value.trim().is_empty() {
        return Err(LobbyError::InvalidForm(format!("{what} is required")));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreateLobbyState {
    pub lobby_name: String,
    pub player_name: String,
    pub max_players: u32,
    pub status: FlowStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JoinLobbyState {
    pub lobby_name: String,
    pub player_name: String,
    pub status: FlowStatus,
}

/// A flow transition, published to UI consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEvent {
    pub kind: FlowKind,
    pub phase: FlowPhase,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_submission_while_requesting_is_rejected() {
        let mut status = FlowStatus::default();
        status.begin().unwrap();
        assert!(status.loading);
        assert_eq!(status.begin(), Err(LobbyError::RequestInFlight));
    }

    #[test]
    fn failure_keeps_the_error_until_retry() {
        let mut status = FlowStatus::default();
        status.begin().unwrap();
        assert!(status.fail("room is full"));
        assert_eq!(status.phase, FlowPhase::Failed);
        assert_eq!(status.error.as_deref(), Some("room is full"));

        status.begin().unwrap();
        assert_eq!(status.error, None);
    }

    #[test]
    fn late_confirmations_are_ignored() {
        let mut status = FlowStatus::default();
        assert!(!status.succeed());
        assert!(!status.fail("late"));
        assert_eq!(status, FlowStatus::default());
    }

    #[test]
    fn forms_require_names_and_a_sane_size() {
        let form = CreateLobbyForm {
            lobby_name: "Alpha".into(),
            player_name: " ".into(),
            max_players: 4,
        };
        assert!(matches!(form.validate(), Err(LobbyError::InvalidForm(_))));

        let form = CreateLobbyForm {
            player_name: "Bob".into(),
            max_players: 0,
            ..form
        };
        assert!(form.validate().is_err());

        let join = JoinLobbyForm {
            lobby_name: "Alpha".into(),
            player_name: "Bob".into(),
        };
        assert!(join.validate().is_ok());
    }
}
