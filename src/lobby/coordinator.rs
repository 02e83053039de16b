//! Lobby coordinator
//!
//! Sequences create / join / leader change / start game on top of the safe
//! invoker, and owns the optimistic flow state. The dispatcher never touches
//! flow state directly; it calls [`LobbyCoordinator::confirm_active`] and
//! [`LobbyCoordinator::reject_active`].

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, InvokeError, LobbyError};
use crate::hub::connection::{ConnectionManager, ConnectionState};
use crate::hub::invoker::SafeInvoker;
use crate::hub::protocol::methods;
use crate::lobby::flow::{
    CreateLobbyForm, CreateLobbyState, FlowEvent, FlowKind, FlowPhase, FlowStatus,
    JoinLobbyForm, JoinLobbyState,
};
use crate::store::lobby::LobbyStore;
use crate::store::session::SessionStore;

const FLOW_EVENT_CAPACITY: usize = 32;

#[derive(Default)]
struct Flows {
    create: CreateLobbyState,
    join: JoinLobbyState,
    /// Flow the next RoomCreated / Error event belongs to
    active: Option<FlowKind>,
}

impl Flows {
    fn status_mut(&mut self, kind: FlowKind) -> &mut FlowStatus {
        match kind {
            FlowKind::Create => &mut self.create.status,
            FlowKind::Join => &mut self.join.status,
        }
    }

    fn requested_name(&self, kind: FlowKind) -> String {
        match kind {
            FlowKind::Create => self.create.lobby_name.clone(),
            FlowKind::Join => self.join.lobby_name.clone(),
        }
    }

    fn reset(&mut self, kind: FlowKind) {
        match kind {
            FlowKind::Create => self.create = CreateLobbyState::default(),
            FlowKind::Join => self.join = JoinLobbyState::default(),
        }
        if self.active == Some(kind) {
            self.active = None;
        }
    }
}

#[derive(Clone)]
pub struct LobbyCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    connection: ConnectionManager,
    invoker: SafeInvoker,
    lobby: LobbyStore,
    session: SessionStore,
    flows: Mutex<Flows>,
    events: broadcast::Sender<FlowEvent>,
}

impl LobbyCoordinator {
    pub fn new(invoker: SafeInvoker, lobby: LobbyStore, session: SessionStore) -> Self {
        let (events, _) = broadcast::channel(FLOW_EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                connection: invoker.connection().clone(),
                invoker,
                lobby,
                session,
                flows: Mutex::new(Flows::default()),
                events,
            }),
        }
    }

    // ========================================================================
    // Read side
    // ========================================================================

    pub fn create_state(&self) -> CreateLobbyState {
        self.inner.flows.lock().create.clone()
    }

    pub fn join_state(&self) -> JoinLobbyState {
        self.inner.flows.lock().join.clone()
    }

    pub fn flow_events(&self) -> broadcast::Receiver<FlowEvent> {
        self.inner.events.subscribe()
    }

    /// Whether this client leads the lobby; false while either id is unknown
    pub fn is_local_leader(&self) -> bool {
        let local = self.inner.connection.connection_id();
        self.inner.lobby.is_leader(local.as_deref())
    }

    // ========================================================================
    // Create / join
    // ========================================================================

    pub async fn create_lobby(&self, form: CreateLobbyForm) -> Result<(), LobbyError> {
        form.validate()?;
        self.begin(FlowKind::Create, |flows| {
            flows.create.lobby_name = form.lobby_name.trim().to_string();
            flows.create.player_name = form.player_name.trim().to_string();
            flows.create.max_players = form.max_players;
        })?;

        let args = vec![
            json!(form.lobby_name.trim()),
            json!(form.player_name.trim()),
            json!(form.max_players),
        ];
        self.submit(FlowKind::Create, methods::CREATE_ROOM, args).await
    }

    pub async fn join_lobby(&self, form: JoinLobbyForm) -> Result<(), LobbyError> {
        form.validate()?;
        self.begin(FlowKind::Join, |flows| {
            flows.join.lobby_name = form.lobby_name.trim().to_string();
            flows.join.player_name = form.player_name.trim().to_string();
        })?;

        let args = vec![json!(form.lobby_name.trim()), json!(form.player_name.trim())];
        self.submit(FlowKind::Join, methods::JOIN_ROOM, args).await
    }

    fn begin(&self, kind: FlowKind, fill: impl FnOnce(&mut Flows)) -> Result<(), LobbyError> {
        {
            let mut flows = self.inner.flows.lock();
            flows.status_mut(kind).begin()?;
            fill(&mut flows);
            flows.active = Some(kind);
        }
        self.publish(kind);
        Ok(())
    }

    async fn submit(
        &self,
        kind: FlowKind,
        method: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<(), LobbyError> {
        if let Err(e) = self.ensure_connected().await {
            self.fail(kind, format!("connection error: {e}"));
            return Err(e.into());
        }

        match self.inner.invoker.invoke_safe(method, args).await {
            Ok(_) => {
                if self.confirm(kind, None) {
                    return Ok(());
                }
                // A hub Error event may have failed the flow before the completion
                match self.failure(kind) {
                    Some(error) => Err(LobbyError::Invoke(InvokeError::Remote(error))),
                    None => Ok(()),
                }
            }
            Err(e) => {
                self.fail(kind, e.to_string());
                Err(e.into())
            }
        }
    }

    /// Connect when disconnected; otherwise make sure handlers are armed
    async fn ensure_connected(&self) -> Result<(), ConnectionError> {
        match self.inner.connection.state() {
            ConnectionState::Connected => {
                self.inner.connection.rearm();
                Ok(())
            }
            // A reset may land before the link settles; the safe invoker reports
            // the timeout if it never does
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                let wait = self.inner.invoker.ready_timeout();
                if self.inner.connection.wait_ready(wait).await.is_ok() {
                    self.inner.connection.rearm();
                }
                Ok(())
            }
            ConnectionState::Disconnected => self.inner.connection.connect().await,
        }
    }

    // ========================================================================
    // Dispatcher entry points
    // ========================================================================

    /// Confirm whichever flow is requesting (RoomCreated / join ack)
    pub fn confirm_active(&self, lobby_name: Option<String>) -> bool {
        let active = self.inner.flows.lock().active;
        match active {
            Some(kind) => self.confirm(kind, lobby_name),
            None => {
                debug!(lobby_name = ?lobby_name, "Room confirmation outside a lobby flow");
                false
            }
        }
    }

    /// Fail the requesting flow with a hub-reported error
    pub fn reject_active(&self, message: &str) -> bool {
        let active = self.inner.flows.lock().active;
        match active {
            Some(kind) => self.fail(kind, message),
            None => {
                warn!(error = %message, "Hub error outside a lobby flow");
                false
            }
        }
    }

    /// `Requesting -> Succeeded -> Idle`, promoting the lobby name
    fn confirm(&self, kind: FlowKind, lobby_name: Option<String>) -> bool {
        let name = {
            let mut flows = self.inner.flows.lock();
            if !flows.status_mut(kind).succeed() {
                return false;
            }
            lobby_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| flows.requested_name(kind))
        };
        self.publish(kind);

        info!(?kind, lobby = %name, "Lobby flow succeeded");
        self.inner.lobby.set_lobby_name(name);

        self.inner.flows.lock().reset(kind);
        self.publish(kind);

        self.refresh_roster();
        true
    }

    fn fail(&self, kind: FlowKind, error: impl Into<String>) -> bool {
        let error = error.into();
        let failed = self.inner.flows.lock().status_mut(kind).fail(error.clone());
        if failed {
            warn!(?kind, %error, "Lobby flow failed");
            self.publish(kind);
        }
        failed
    }

    fn failure(&self, kind: FlowKind) -> Option<String> {
        let mut flows = self.inner.flows.lock();
        let status = flows.status_mut(kind);
        if status.phase != FlowPhase::Failed {
            return None;
        }
        Some(status.error.clone().unwrap_or_default())
    }

    pub fn leave_flow(&self, kind: FlowKind) {
        self.inner.flows.lock().reset(kind);
        self.publish(kind);
    }

    pub fn reset_flows(&self) {
        self.inner.flows.lock().reset(FlowKind::Create);
        self.inner.flows.lock().reset(FlowKind::Join);
        self.publish(FlowKind::Create);
        self.publish(FlowKind::Join);
    }

    fn publish(&self, kind: FlowKind) {
        let status = self.inner.flows.lock().status_mut(kind).clone();
        let _ = self.inner.events.send(FlowEvent {
            kind,
            phase: status.phase,
            error: status.error,
        });
    }

    // ========================================================================
    // Lobby intents
    // ========================================================================

    /// Ask the hub to resend the roster
    pub async fn request_player_list(&self) -> Result<(), LobbyError> {
        let name = self.inner.lobby.lobby_name().ok_or(LobbyError::NoRoomName)?;
        self.inner
            .invoker
            .invoke_safe(methods::GET_PLAYER_LIST, vec![json!(name)])
            .await?;
        Ok(())
    }

    /// Best-effort roster refresh in the background; failures are swallowed
    pub fn refresh_roster(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime for roster refresh");
            return;
        };

        let coordinator = self.clone();
        runtime.spawn(async move {
            if let Err(e) = coordinator.request_player_list().await {
                debug!(error = %e, "Roster refresh failed");
            }
        });
    }

    /// Hand leadership to another connection (leader only)
    pub async fn change_leader(&self, target_connection_id: &str) -> Result<(), LobbyError> {
        let name = self.leader_precondition("change_leader")?;

        self.inner.lobby.set_leader_change_pending(true);
        let result = self
            .inner
            .invoker
            .invoke_safe(
                methods::CHANGE_LEADER,
                vec![json!(name), json!(target_connection_id)],
            )
            .await;

        if let Err(e) = result {
            self.inner.lobby.set_leader_change_pending(false);
            return Err(e.into());
        }
        Ok(())
    }

    /// Start the match (leader only)
    pub async fn start_game(&self) -> Result<(), LobbyError> {
        let name = self.leader_precondition("start_game")?;
        self.inner
            .invoker
            .invoke_safe(methods::START_GAME, vec![json!(name)])
            .await?;
        Ok(())
    }

    /// Request a pause toggle; any participant may ask
    pub async fn toggle_pause(&self) -> Result<(), LobbyError> {
        let Some(name) = self.inner.lobby.lobby_name() else {
            warn!("Cannot toggle pause without a room name");
            return Err(LobbyError::NoRoomName);
        };
        self.inner
            .invoker
            .invoke_safe(methods::TOGGLE_PAUSE, vec![json!(name)])
            .await?;
        Ok(())
    }

    /// Save the final score under `player_name` once the game is over
    pub async fn report_result(&self, player_name: &str) -> Result<(), LobbyError> {
        let player_name = player_name.trim();
        if player_name.is_empty() {
            return Err(LobbyError::InvalidForm("player name is required".into()));
        }
        if !self.inner.session.snapshot().game_over {
            return Err(LobbyError::GameNotOver);
        }

        self.inner
            .invoker
            .invoke_safe(methods::REPORT_DEATH, vec![json!(player_name)])
            .await?;
        info!(player = %player_name, "Result reported");
        Ok(())
    }

    /// Leader check before any remote call, then the room name
    fn leader_precondition(&self, intent: &'static str) -> Result<String, LobbyError> {
        if !self.is_local_leader() {
            warn!(intent, "Rejected: not the lobby leader");
            return Err(LobbyError::NotLeader);
        }
        self.inner.lobby.lobby_name().ok_or(LobbyError::NoRoomName)
    }
}
