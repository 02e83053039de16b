//! Session replica
//!
//! Local reflection of the shared match: players, bots, projectiles and the
//! scalar flags. Mutated only by the event dispatcher; read through snapshots,
//! a watch channel, synchronous listeners and a transient notification stream.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace, warn};

use crate::hub::protocol::ShootingStyle;
use crate::store::subscription::{ListenerSet, Subscription};

/// Health assumed when the hub omits it
pub const FULL_HEALTH: i32 = 100;

const NOTIFICATION_CAPACITY: usize = 64;

/// A player or bot ship
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub health: i32,
    pub shooting_style: ShootingStyle,
}

impl Entity {
    /// Entity at a position with default health and weapon
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            health: FULL_HEALTH,
            shooting_style: ShootingStyle::default(),
        }
    }
}

/// Player or enemy bullet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projectile {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

impl Projectile {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self { id: id.into(), x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerHit {
    pub id: String,
    pub health: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerDied {
    pub id: String,
}

/// Root aggregate of the session replica
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    pub players: HashMap<String, Entity>,
    pub bots: HashMap<String, Entity>,
    pub bullets: HashMap<String, Projectile>,
    pub enemy_bullets: HashMap<String, Projectile>,
    pub score: i64,
    pub is_paused: bool,
    pub game_over: bool,
    pub player_hit: Option<PlayerHit>,
    pub player_died: Option<PlayerDied>,
}

impl SessionState {
    /// Not paused and not over
    pub fn is_active(&self) -> bool {
        !self.is_paused && !self.game_over
    }
}

/// One-shot side-effect triggers (flash, sound)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotification {
    PlayerHit(PlayerHit),
    PlayerDied(PlayerDied),
}

/// Cloneable handle to the session replica
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: watch::Sender<SessionState>,
    listeners: ListenerSet<SessionState>,
    notifications: broadcast::Sender<SessionNotification>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                state,
                listeners: ListenerSet::new(),
                notifications,
            }),
        }
    }

    // ========================================================================
    // Read side
    // ========================================================================

    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Call `listener` with the full aggregate after every effective mutation
    pub fn subscribe(
        &self,
        listener: impl Fn(&SessionState) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.listeners.add(listener)
    }

    /// Stream of hit/death notifications, each delivered exactly once
    pub fn notifications(&self) -> broadcast::Receiver<SessionNotification> {
        self.inner.notifications.subscribe()
    }

    // ========================================================================
    // Players
    // ========================================================================

    pub fn upsert_player(&self, entity: Entity) -> bool {
        self.mutate("upsert_player", |s| {
            if ignore_after_game_over(s, "upsert_player") {
                return false;
            }
            let moved = s.bots.remove(&entity.id).is_some();
            if moved {
                warn!(id = %entity.id, "Entity moved from bots to players");
            }
            upsert(&mut s.players, entity.id.clone(), entity) || moved
        })
    }

    pub fn remove_player(&self, id: &str) -> bool {
        self.mutate("remove_player", |s| {
            !ignore_after_game_over(s, "remove_player") && s.players.remove(id).is_some()
        })
    }

    // ========================================================================
    // Bots
    // ========================================================================

    /// Replace the whole bot roster
    pub fn set_bots(&self, bots: HashMap<String, Entity>) -> bool {
        self.mutate("set_bots", |s| {
            if ignore_after_game_over(s, "set_bots") {
                return false;
            }
            for id in bots.keys() {
                if s.players.remove(id).is_some() {
                    warn!(%id, "Entity moved from players to bots");
                }
            }
            if s.bots == bots {
                return false;
            }
            s.bots = bots;
            true
        })
    }

    pub fn upsert_bot(&self, entity: Entity) -> bool {
        self.mutate("upsert_bot", |s| {
            if ignore_after_game_over(s, "upsert_bot") {
                return false;
            }
            let moved = s.players.remove(&entity.id).is_some();
            if moved {
                warn!(id = %entity.id, "Entity moved from players to bots");
            }
            upsert(&mut s.bots, entity.id.clone(), entity) || moved
        })
    }

    pub fn remove_bot(&self, id: &str) -> bool {
        self.mutate("remove_bot", |s| {
            !ignore_after_game_over(s, "remove_bot") && s.bots.remove(id).is_some()
        })
    }

    // ========================================================================
    // Projectiles
    // ========================================================================

    pub fn upsert_bullet(&self, bullet: Projectile) -> bool {
        self.mutate("upsert_bullet", |s| {
            !ignore_after_game_over(s, "upsert_bullet")
                && upsert(&mut s.bullets, bullet.id.clone(), bullet)
        })
    }

    pub fn remove_bullet(&self, id: &str) -> bool {
        self.mutate("remove_bullet", |s| {
            !ignore_after_game_over(s, "remove_bullet") && s.bullets.remove(id).is_some()
        })
    }

    pub fn upsert_enemy_bullet(&self, bullet: Projectile) -> bool {
        self.mutate("upsert_enemy_bullet", |s| {
            !ignore_after_game_over(s, "upsert_enemy_bullet")
                && upsert(&mut s.enemy_bullets, bullet.id.clone(), bullet)
        })
    }

    pub fn remove_enemy_bullet(&self, id: &str) -> bool {
        self.mutate("remove_enemy_bullet", |s| {
            !ignore_after_game_over(s, "remove_enemy_bullet") && s.enemy_bullets.remove(id).is_some()
        })
    }

    // ========================================================================
    // Scalars
    // ========================================================================

    /// Set the score; a lower value while the session is active is dropped
    pub fn set_score(&self, score: i64) -> bool {
        self.mutate("set_score", |s| {
            if ignore_after_game_over(s, "set_score") || s.score == score {
                return false;
            }
            if s.is_active() && score < s.score {
                debug!(current = s.score, received = score, "Dropping out-of-order score");
                return false;
            }
            s.score = score;
            true
        })
    }

    pub fn set_paused(&self, paused: bool) -> bool {
        self.mutate("set_paused", |s| {
            if ignore_after_game_over(s, "set_paused") || s.is_paused == paused {
                return false;
            }
            s.is_paused = paused;
            true
        })
    }

    pub fn set_game_over(&self) -> bool {
        self.mutate("set_game_over", |s| {
            if s.game_over {
                return false;
            }
            s.game_over = true;
            true
        })
    }

    // ========================================================================
    // Transient notifications
    // ========================================================================

    /// Publish a hit, then clear the field so it is never sticky
    pub fn report_hit(&self, id: impl Into<String>, health: i32) {
        let hit = PlayerHit {
            id: id.into(),
            health,
        };
        self.mutate("report_hit", |s| {
            s.player_hit = Some(hit.clone());
            true
        });
        let _ = self
            .inner
            .notifications
            .send(SessionNotification::PlayerHit(hit));
        self.mutate("clear_player_hit", |s| s.player_hit.take().is_some());
    }

    /// Publish a death, then clear the field so it is never sticky
    pub fn report_death(&self, id: impl Into<String>) {
        let died = PlayerDied { id: id.into() };
        self.mutate("report_death", |s| {
            s.player_died = Some(died.clone());
            true
        });
        let _ = self
            .inner
            .notifications
            .send(SessionNotification::PlayerDied(died));
        self.mutate("clear_player_died", |s| s.player_died.take().is_some());
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start a new session from the game-start roster
    pub fn seed(&self, players: HashMap<String, Entity>, bots: HashMap<String, Entity>) {
        self.mutate("seed", |s| {
            let mut seeded = SessionState {
                players,
                bots,
                ..SessionState::default()
            };
            let overlap: Vec<String> = seeded
                .bots
                .keys()
                .filter(|id| seeded.players.contains_key(*id))
                .cloned()
                .collect();
            for id in overlap {
                warn!(%id, "Seeded id present as both player and bot, keeping bot");
                seeded.players.remove(&id);
            }
            if *s == seeded {
                return false;
            }
            *s = seeded;
            true
        });
    }

    /// Back to the initial empty aggregate
    pub fn reset(&self) {
        self.mutate("reset", |s| {
            if *s == SessionState::default() {
                return false;
            }
            *s = SessionState::default();
            true
        });
    }

    fn mutate(&self, op: &'static str, apply: impl FnOnce(&mut SessionState) -> bool) -> bool {
        let mut produced = None;
        self.inner.state.send_if_modified(|s| {
            let changed = apply(s);
            if changed {
                produced = Some(s.clone());
            }
            changed
        });

        // Listeners see the state this write produced, not a later one
        let Some(state) = produced else {
            return false;
        };
        trace!(op, "Session state changed");
        self.inner.listeners.emit(&state);
        true
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn ignore_after_game_over(state: &SessionState, op: &'static str) -> bool {
    if state.game_over {
        debug!(op, "Ignoring mutation after game over");
    }
    state.game_over
}

/// Insert or replace; false when the stored value is already identical
fn upsert<V: PartialEq>(map: &mut HashMap<String, V>, id: String, value: V) -> bool {
    match map.get(&id) {
        Some(existing) if *existing == value => false,
        _ => {
            map.insert(id, value);
            true
        }
    }
}
