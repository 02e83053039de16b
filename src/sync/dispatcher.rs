//! Event dispatcher
//!
//! Installs exactly one handler per inbound event name. Each handler normalizes
//! its payload into an [`InboundCommand`] and applies it to the stores or the
//! lobby coordinator. Handlers are tagged with the generation they were armed
//! for; retiring a generation bumps the counter under the same lock handlers
//! apply under, so a stale handler can never touch a freshly reset store.

use std::cell::Cell;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::hub::connection::{ConnectionManager, EventHandler, HubSubscriber};
use crate::lobby::coordinator::LobbyCoordinator;
use crate::store::lobby::LobbyStore;
use crate::store::session::SessionStore;
use crate::sync::command::{normalize, InboundCommand, EVENT_NAMES};

struct Shared {
    session: SessionStore,
    lobby: LobbyStore,
    coordinator: LobbyCoordinator,
    /// Current generation; reentrant so store listeners may reset the session
    generation: ReentrantMutex<Cell<u64>>,
}

pub struct EventDispatcher {
    shared: Arc<Shared>,
    connection: ConnectionManager,
    /// Generation whose handlers are currently installed
    armed: Mutex<Option<u64>>,
}

impl EventDispatcher {
    pub fn new(
        connection: ConnectionManager,
        session: SessionStore,
        lobby: LobbyStore,
        coordinator: LobbyCoordinator,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                session,
                lobby,
                coordinator,
                generation: ReentrantMutex::new(Cell::new(0)),
            }),
            connection,
            armed: Mutex::new(None),
        }
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.lock().get()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.lock().is_some()
    }

    /// Supersede the current generation
    ///
    /// `clear` runs under the generation lock after the bump, so no handler of
    /// the old generation can apply once it starts. Handlers are removed from
    /// the connection afterwards.
    pub fn retire(&self, clear: impl FnOnce()) {
        {
            let generation = self.shared.generation.lock();
            generation.set(generation.get() + 1);
            debug!(generation = generation.get(), "Dispatcher generation retired");
            clear();
        }

        *self.armed.lock() = None;
        for event in EVENT_NAMES {
            self.connection.off(event);
        }
    }

    /// Normalize and apply one event as the current generation
    pub fn dispatch(&self, event: &'static str, args: Vec<Value>) {
        let generation = self.generation();
        handle_event(&self.shared, generation, event, args);
    }

    fn handler(&self, event: &'static str, generation: u64) -> EventHandler {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Arc::new(move |args: Vec<Value>| {
            if let Some(shared) = shared.upgrade() {
                handle_event(&shared, generation, event, args);
            }
        })
    }
}

impl HubSubscriber for EventDispatcher {
    /// Install handlers for the current generation; a no-op when already armed
    fn arm(&self, connection: &ConnectionManager) {
        let generation = self.generation();
        let mut armed = self.armed.lock();

        if *armed == Some(generation) && EVENT_NAMES.iter().all(|e| connection.has_handler(e)) {
            trace!(generation, "Dispatcher already armed");
            return;
        }

        for event in EVENT_NAMES {
            connection.off(event);
            if let Err(e) = connection.on(event, self.handler(event, generation)) {
                warn!(error = %e, "Failed to register handler");
            }
        }

        *armed = Some(generation);
        debug!(generation, handlers = EVENT_NAMES.len(), "Dispatcher armed");
    }
}

fn handle_event(shared: &Shared, generation: u64, event: &'static str, args: Vec<Value>) {
    let command = match normalize(event, &args) {
        Ok(command) => command,
        Err(e) => {
            warn!(event, error = %e, "Dropping malformed payload");
            return;
        }
    };

    let current = shared.generation.lock();
    if current.get() != generation {
        debug!(event, generation, current = current.get(), "Dropping event from a retired generation");
        return;
    }

    trace!(event, "Applying inbound command");
    apply(shared, command);
}

fn apply(shared: &Shared, command: InboundCommand) {
    let session = &shared.session;

    match command {
        InboundCommand::PlayerPosition(entity) => {
            session.upsert_player(entity);
        }
        InboundCommand::PlayerLeft { id } => {
            session.remove_player(&id);
            let lobby = shared.lobby.snapshot();
            if !lobby.game_started && !lobby.lobby_name.is_empty() {
                shared.coordinator.refresh_roster();
            }
        }
        InboundCommand::PlayerJoined { connection_id } => {
            debug!(%connection_id, "Player joined the lobby");
            shared.coordinator.refresh_roster();
        }
        InboundCommand::BotList(bots) => {
            session.set_bots(bots);
        }
        InboundCommand::BotPosition(entity) => {
            session.upsert_bot(entity);
        }
        InboundCommand::BotDied { id } => {
            session.remove_bot(&id);
        }
        InboundCommand::SpawnBullet(bullet) | InboundCommand::UpdateBullet(bullet) => {
            session.upsert_bullet(bullet);
        }
        InboundCommand::RemoveBullet { id } => {
            session.remove_bullet(&id);
        }
        InboundCommand::SpawnEnemyBullet(bullet) | InboundCommand::UpdateEnemyBullet(bullet) => {
            session.upsert_enemy_bullet(bullet);
        }
        InboundCommand::RemoveEnemyBullet { id } => {
            session.remove_enemy_bullet(&id);
        }
        InboundCommand::Score(score) => {
            session.set_score(score);
        }
        InboundCommand::Paused(paused) => {
            session.set_paused(paused);
        }
        InboundCommand::GameOver => {
            session.set_game_over();
        }
        InboundCommand::PlayerHit { id, health } => session.report_hit(id, health),
        InboundCommand::PlayerDied { id } => session.report_death(id),
        InboundCommand::PlayerList {
            players,
            leader_connection_id,
        } => {
            shared.lobby.replace_roster(players, leader_connection_id);
        }
        InboundCommand::RoomCreated { lobby_name } => {
            shared.coordinator.confirm_active(lobby_name);
        }
        InboundCommand::ServerError { message } => {
            shared.coordinator.reject_active(&message);
        }
        InboundCommand::GameStarted { players, bots } => {
            session.seed(players, bots);
            shared.lobby.set_game_started();
        }
    }
}
