//! Session teardown
//!
//! Clears both replicas, retires the dispatcher generation and resets the lobby
//! flows. The transport is left alone, so "back to menu" and "disconnect" stay
//! independent steps.

use std::sync::Arc;

use tracing::info;

use crate::lobby::coordinator::LobbyCoordinator;
use crate::store::lobby::LobbyStore;
use crate::store::session::SessionStore;
use crate::sync::dispatcher::EventDispatcher;

#[derive(Clone)]
pub struct SessionTeardown {
    dispatcher: Arc<EventDispatcher>,
    session: SessionStore,
    lobby: LobbyStore,
    coordinator: LobbyCoordinator,
}

impl SessionTeardown {
    pub fn new(
        dispatcher: Arc<EventDispatcher>,
        session: SessionStore,
        lobby: LobbyStore,
        coordinator: LobbyCoordinator,
    ) -> Self {
        Self {
            dispatcher,
            session,
            lobby,
            coordinator,
        }
    }

    /// Return every piece of session state to its initial value; idempotent
    pub fn reset_all(&self) {
        self.dispatcher.retire(|| {
            self.session.reset();
            self.lobby.reset();
        });
        self.coordinator.reset_flows();

        info!(generation = self.dispatcher.generation(), "Session state reset");
    }
}
