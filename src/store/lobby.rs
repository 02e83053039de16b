//! Lobby replica: room name, roster, leader and the game-started flag

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::store::subscription::{ListenerSet, Subscription};

/// One roster entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub connection_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LobbyState {
    pub lobby_name: String,
    pub players: Vec<PlayerInfo>,
    pub leader_connection_id: Option<String>,
    pub game_started: bool,
    /// A leader change was requested and the hub has not confirmed it yet
    pub leader_change_pending: bool,
}

#[derive(Clone)]
pub struct LobbyStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: watch::Sender<LobbyState>,
    listeners: ListenerSet<LobbyState>,
}

impl LobbyStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LobbyState::default());
        Self {
            inner: Arc::new(Inner {
                state,
                listeners: ListenerSet::new(),
            }),
        }
    }

    pub fn snapshot(&self) -> LobbyState {
        self.inner.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<LobbyState> {
        self.inner.state.subscribe()
    }

    pub fn subscribe(&self, listener: impl Fn(&LobbyState) + Send + Sync + 'static) -> Subscription {
        self.inner.listeners.add(listener)
    }

    pub fn lobby_name(&self) -> Option<String> {
        let state = self.inner.state.borrow();
        (!state.lobby_name.is_empty()).then(|| state.lobby_name.clone())
    }

    /// Whether `local` is the advertised leader; false while either is unknown
    pub fn is_leader(&self, local: Option<&str>) -> bool {
        match (local, self.inner.state.borrow().leader_connection_id.as_deref()) {
            (Some(local), Some(leader)) => local == leader,
            _ => false,
        }
    }

    /// Replace the roster and leader with the hub's authoritative list
    ///
    /// Duplicate connection ids keep their first entry. A leader that matches no
    /// roster entry is dropped.
    pub fn replace_roster(&self, players: Vec<PlayerInfo>, leader: Option<String>) -> bool {
        let mut seen = HashSet::new();
        let players: Vec<PlayerInfo> = players
            .into_iter()
            .filter(|p| seen.insert(p.connection_id.clone()))
            .collect();

        let leader = leader.filter(|id| {
            let known = players.iter().any(|p| &p.connection_id == id);
            if !known {
                warn!(leader = %id, "Advertised leader is not in the roster");
            }
            known
        });

        self.mutate(|s| {
            if s.players == players
                && s.leader_connection_id == leader
                && !s.leader_change_pending
            {
                return false;
            }
            debug!(players = players.len(), leader = ?leader, "Roster replaced");
            s.players = players;
            s.leader_connection_id = leader;
            s.leader_change_pending = false;
            true
        })
    }

    pub fn set_lobby_name(&self, name: impl Into<String>) -> bool {
        let name = name.into();
        self.mutate(|s| {
            if s.lobby_name == name {
                return false;
            }
            s.lobby_name = name;
            true
        })
    }

    pub fn set_game_started(&self) -> bool {
        self.mutate(|s| !std::mem::replace(&mut s.game_started, true))
    }

    pub fn set_leader_change_pending(&self, pending: bool) -> bool {
        self.mutate(|s| std::mem::replace(&mut s.leader_change_pending, pending) != pending)
    }

    pub fn reset(&self) {
        self.mutate(|s| {
            if *s == LobbyState::default() {
                return false;
            }
            *s = LobbyState::default();
            true
        });
    }

    fn mutate(&self, apply: impl FnOnce(&mut LobbyState) -> bool) -> bool {
        let mut produced = None;
        self.inner.state.send_if_modified(|s| {
            let changed = apply(s);
            if changed {
                produced = Some(s.clone());
            }
            changed
        });

        match produced {
            Some(state) => {
                self.inner.listeners.emit(&state);
                true
            }
            None => false,
        }
    }
}

impl Default for LobbyStore {
    fn default() -> Self {
        Self::new()
    }
}
