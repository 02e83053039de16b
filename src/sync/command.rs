//! Inbound hub events and their normalization into typed commands
//!
//! The hub is not consistent about payload shapes: the same event may arrive as
//! positional arguments, a single object, or an array. Each event name has one
//! normalization function that accepts every observed shape and fills in the
//! documented defaults.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::MalformedPayload;
use crate::hub::protocol::ShootingStyle;
use crate::store::lobby::PlayerInfo;
use crate::store::session::{Entity, Projectile, FULL_HEALTH};

/// Inbound event names
pub mod events {
    pub const RECEIVE_PLAYER_POSITION: &str = "ReceivePlayerPosition";
    pub const PLAYER_LEFT: &str = "PlayerLeft";
    pub const PLAYER_JOINED: &str = "PlayerJoined";
    pub const RECEIVE_BOT_LIST: &str = "ReceiveBotList";
    pub const RECEIVE_BOT_POSITION: &str = "ReceiveBotPosition";
    pub const BOT_DIED: &str = "BotDied";
    pub const SPAWN_BULLET: &str = "SpawnBullet";
    pub const UPDATE_BULLET: &str = "UpdateBullet";
    pub const REMOVE_BULLET: &str = "RemoveBullet";
    pub const SPAWN_ENEMY_BULLET: &str = "SpawnEnemyBullet";
    pub const UPDATE_ENEMY_BULLET: &str = "UpdateEnemyBullet";
    pub const REMOVE_ENEMY_BULLET: &str = "RemoveEnemyBullet";
    pub const UPDATE_SCORE: &str = "UpdateScore";
    pub const GAME_PAUSED: &str = "GamePaused";
    pub const GAME_OVER: &str = "GameOver";
    pub const PLAYER_HIT: &str = "PlayerHit";
    pub const PLAYER_DIED: &str = "PlayerDied";
    pub const RECEIVE_PLAYER_LIST: &str = "ReceivePlayerList";
    pub const ROOM_CREATED: &str = "RoomCreated";
    pub const ERROR: &str = "Error";
    pub const GAME_STARTED: &str = "GameStarted";
}

/// Every event name the dispatcher registers a handler for
pub const EVENT_NAMES: [&str; 21] = [
    events::RECEIVE_PLAYER_POSITION,
    events::PLAYER_LEFT,
    events::PLAYER_JOINED,
    events::RECEIVE_BOT_LIST,
    events::RECEIVE_BOT_POSITION,
    events::BOT_DIED,
    events::SPAWN_BULLET,
    events::UPDATE_BULLET,
    events::REMOVE_BULLET,
    events::SPAWN_ENEMY_BULLET,
    events::UPDATE_ENEMY_BULLET,
    events::REMOVE_ENEMY_BULLET,
    events::UPDATE_SCORE,
    events::GAME_PAUSED,
    events::GAME_OVER,
    events::PLAYER_HIT,
    events::PLAYER_DIED,
    events::RECEIVE_PLAYER_LIST,
    events::ROOM_CREATED,
    events::ERROR,
    events::GAME_STARTED,
];

/// A normalized inbound event, one variant per event name
#[derive(Debug, Clone, PartialEq)]
pub enum InboundCommand {
    PlayerPosition(Entity),
    PlayerLeft { id: String },
    PlayerJoined { connection_id: String },
    BotList(HashMap<String, Entity>),
    BotPosition(Entity),
    BotDied { id: String },
    SpawnBullet(Projectile),
    UpdateBullet(Projectile),
    RemoveBullet { id: String },
    SpawnEnemyBullet(Projectile),
    UpdateEnemyBullet(Projectile),
    RemoveEnemyBullet { id: String },
    Score(i64),
    Paused(bool),
    GameOver,
    PlayerHit { id: String, health: i32 },
    PlayerDied { id: String },
    PlayerList {
        players: Vec<PlayerInfo>,
        leader_connection_id: Option<String>,
    },
    RoomCreated { lobby_name: Option<String> },
    ServerError { message: String },
    GameStarted {
        players: HashMap<String, Entity>,
        bots: HashMap<String, Entity>,
    },
}

/// Normalize the raw arguments of `event`
pub fn normalize(event: &str, args: &[Value]) -> Result<InboundCommand, MalformedPayload> {
    use events::*;

    let event: &'static str = match EVENT_NAMES.iter().find(|name| **name == event) {
        Some(name) => *name,
        None => return Err(MalformedPayload::new("unknown", format!("unknown event {event}"))),
    };

    let command = match event {
        RECEIVE_PLAYER_POSITION => InboundCommand::PlayerPosition(entity_args(event, args)?),
        PLAYER_LEFT => InboundCommand::PlayerLeft {
            id: id_arg(event, args)?,
        },
        PLAYER_JOINED => InboundCommand::PlayerJoined {
            connection_id: id_arg(event, args)?,
        },
        RECEIVE_BOT_LIST => InboundCommand::BotList(entity_roster(event, first(event, args)?)?),
        RECEIVE_BOT_POSITION => InboundCommand::BotPosition(entity_args(event, args)?),
        BOT_DIED => InboundCommand::BotDied {
            id: id_arg(event, args)?,
        },
        SPAWN_BULLET => InboundCommand::SpawnBullet(projectile_args(event, args)?),
        UPDATE_BULLET => InboundCommand::UpdateBullet(projectile_args(event, args)?),
        REMOVE_BULLET => InboundCommand::RemoveBullet {
            id: id_arg(event, args)?,
        },
        SPAWN_ENEMY_BULLET => InboundCommand::SpawnEnemyBullet(projectile_args(event, args)?),
        UPDATE_ENEMY_BULLET => InboundCommand::UpdateEnemyBullet(projectile_args(event, args)?),
        REMOVE_ENEMY_BULLET => InboundCommand::RemoveEnemyBullet {
            id: id_arg(event, args)?,
        },
        UPDATE_SCORE => InboundCommand::Score(score_arg(event, args)?),
        GAME_PAUSED => InboundCommand::Paused(paused_arg(event, args)?),
        GAME_OVER => InboundCommand::GameOver,
        PLAYER_HIT => player_hit(event, args)?,
        PLAYER_DIED => InboundCommand::PlayerDied {
            id: id_arg(event, args)?,
        },
        RECEIVE_PLAYER_LIST => player_list(event, args)?,
        ROOM_CREATED => InboundCommand::RoomCreated {
            lobby_name: room_name(args),
        },
        ERROR => InboundCommand::ServerError {
            message: error_message(args),
        },
        GAME_STARTED => game_started(event, args)?,
        _ => return Err(MalformedPayload::new(event, "no normalizer")),
    };

    Ok(command)
}

// ============================================================================
// Shape helpers
// ============================================================================

fn first<'a>(event: &'static str, args: &'a [Value]) -> Result<&'a Value, MalformedPayload> {
    args.first()
        .ok_or_else(|| MalformedPayload::new(event, "missing arguments"))
}

/// Ids arrive as strings, occasionally as numbers
fn as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Look up a field accepting camelCase, PascalCase and a few aliases
fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| {
        obj.get(*name).or_else(|| {
            let mut pascal = name.to_string();
            if let Some(first) = pascal.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            obj.get(&pascal)
        })
    })
}

fn id_field(obj: &Map<String, Value>) -> Option<String> {
    field(obj, &["id", "connectionId"]).and_then(as_id)
}

/// `[id]` or `[{id}]`
fn id_arg(event: &'static str, args: &[Value]) -> Result<String, MalformedPayload> {
    let value = first(event, args)?;
    let id = match value {
        Value::Object(obj) => id_field(obj),
        other => as_id(other),
    };
    id.ok_or_else(|| MalformedPayload::new(event, "missing id"))
}

fn coordinate(obj: &Map<String, Value>, axis: &str) -> Option<f64> {
    field(obj, &[axis]).and_then(Value::as_f64).or_else(|| {
        field(obj, &["position", "pos"])
            .and_then(Value::as_object)
            .and_then(|pos| field(pos, &[axis]))
            .and_then(Value::as_f64)
    })
}

fn shooting_style(value: Option<&Value>) -> ShootingStyle {
    match value {
        Some(Value::Number(n)) => n.as_u64().and_then(ShootingStyle::from_wire_index),
        Some(Value::String(s)) => ShootingStyle::from_wire_name(s),
        _ => None,
    }
    .unwrap_or_default()
}

/// Build an entity from a position object, defaulting health and weapon
fn entity_from(event: &'static str, id: String, value: &Value) -> Result<Entity, MalformedPayload> {
    let obj = value
        .as_object()
        .ok_or_else(|| MalformedPayload::new(event, format!("position for {id} is not an object")))?;

    let (x, y) = match (coordinate(obj, "x"), coordinate(obj, "y")) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(MalformedPayload::new(event, format!("missing coordinates for {id}"))),
    };

    let health = field(obj, &["health", "hp"])
        .and_then(Value::as_f64)
        .map(|h| h.round() as i32)
        .unwrap_or(FULL_HEALTH);

    Ok(Entity {
        id,
        x,
        y,
        health,
        shooting_style: shooting_style(field(obj, &["shootingStyle"])),
    })
}

/// `[id, pos]` or `[{id, x, y, ..}]`
fn entity_args(event: &'static str, args: &[Value]) -> Result<Entity, MalformedPayload> {
    if let [id, pos, ..] = args {
        if let Some(id) = as_id(id) {
            return entity_from(event, id, pos);
        }
    }

    match args.first() {
        Some(value @ Value::Object(obj)) => {
            let id = id_field(obj).ok_or_else(|| MalformedPayload::new(event, "missing id"))?;
            entity_from(event, id, value)
        }
        _ => Err(MalformedPayload::new(event, "expected (id, position) or an entity object")),
    }
}

/// A roster sent either as `{id: pos}` or as `[{id, x, y}, ..]`
fn entity_roster(
    event: &'static str,
    value: &Value,
) -> Result<HashMap<String, Entity>, MalformedPayload> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(id, pos)| entity_from(event, id.clone(), pos).map(|e| (id.clone(), e)))
            .collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let id = item
                    .as_object()
                    .and_then(id_field)
                    .ok_or_else(|| MalformedPayload::new(event, "roster entry without id"))?;
                entity_from(event, id.clone(), item).map(|e| (id, e))
            })
            .collect(),
        Value::Null => Ok(HashMap::new()),
        _ => Err(MalformedPayload::new(event, "roster is neither a map nor an array")),
    }
}

/// `[{id, x, y}]`, `[id, {x, y}]` or `[id, x, y]`
fn projectile_args(event: &'static str, args: &[Value]) -> Result<Projectile, MalformedPayload> {
    let malformed = || MalformedPayload::new(event, "expected a projectile");

    match args {
        [Value::Object(obj), ..] => {
            let id = id_field(obj).ok_or_else(malformed)?;
            let x = coordinate(obj, "x").ok_or_else(malformed)?;
            let y = coordinate(obj, "y").ok_or_else(malformed)?;
            Ok(Projectile { id, x, y })
        }
        [id, Value::Object(obj), ..] => {
            let id = as_id(id).ok_or_else(malformed)?;
            let x = coordinate(obj, "x").ok_or_else(malformed)?;
            let y = coordinate(obj, "y").ok_or_else(malformed)?;
            Ok(Projectile { id, x, y })
        }
        [id, x, y, ..] => Ok(Projectile {
            id: as_id(id).ok_or_else(malformed)?,
            x: x.as_f64().ok_or_else(malformed)?,
            y: y.as_f64().ok_or_else(malformed)?,
        }),
        _ => Err(malformed()),
    }
}

fn score_arg(event: &'static str, args: &[Value]) -> Result<i64, MalformedPayload> {
    let value = match first(event, args)? {
        Value::Object(obj) => field(obj, &["score"]).cloned().unwrap_or(Value::Null),
        other => other.clone(),
    };

    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
        .ok_or_else(|| MalformedPayload::new(event, "score is not a number"))
}

fn paused_arg(event: &'static str, args: &[Value]) -> Result<bool, MalformedPayload> {
    let value = match first(event, args)? {
        Value::Object(obj) => field(obj, &["isPaused", "paused"]).cloned().unwrap_or(Value::Null),
        other => other.clone(),
    };
    value
        .as_bool()
        .ok_or_else(|| MalformedPayload::new(event, "pause flag is not a boolean"))
}

/// `[id, health]` or `[{id, health}]`
fn player_hit(event: &'static str, args: &[Value]) -> Result<InboundCommand, MalformedPayload> {
    let (id, health) = match args {
        [Value::Object(obj), ..] => (id_field(obj), field(obj, &["health"]).and_then(Value::as_f64)),
        [id, health, ..] => (as_id(id), health.as_f64()),
        _ => (None, None),
    };

    match (id, health) {
        (Some(id), Some(health)) => Ok(InboundCommand::PlayerHit {
            id,
            health: health.round() as i32,
        }),
        _ => Err(MalformedPayload::new(event, "expected (id, health)")),
    }
}

fn player_info(value: &Value) -> Option<PlayerInfo> {
    match value {
        // Older hubs sent bare names; the name doubles as the roster key
        Value::String(name) => Some(PlayerInfo {
            connection_id: name.clone(),
            name: name.clone(),
        }),
        Value::Object(obj) => {
            let connection_id = id_field(obj)?;
            let name = field(obj, &["name", "playerName", "userName"])
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| connection_id.clone());
            Some(PlayerInfo {
                connection_id,
                name,
            })
        }
        _ => None,
    }
}

fn player_infos(event: &'static str, value: &Value) -> Result<Vec<PlayerInfo>, MalformedPayload> {
    let items = value
        .as_array()
        .ok_or_else(|| MalformedPayload::new(event, "players is not an array"))?;
    items
        .iter()
        .map(|item| player_info(item).ok_or_else(|| MalformedPayload::new(event, "bad roster entry")))
        .collect()
}

/// `[{players, leaderConnectionId}]`, `[players, leaderId]` or `[players]`
fn player_list(event: &'static str, args: &[Value]) -> Result<InboundCommand, MalformedPayload> {
    let (players, leader) = match args {
        [Value::Object(dto), ..] => (
            player_infos(
                event,
                field(dto, &["players"]).unwrap_or(&Value::Array(Vec::new())),
            )?,
            field(dto, &["leaderConnectionId", "leaderId"]).and_then(as_id),
        ),
        [players @ Value::Array(_), rest @ ..] => {
            (player_infos(event, players)?, rest.first().and_then(as_id))
        }
        _ => return Err(MalformedPayload::new(event, "expected a player list")),
    };

    Ok(InboundCommand::PlayerList {
        players,
        leader_connection_id: leader,
    })
}

fn room_name(args: &[Value]) -> Option<String> {
    match args.first()? {
        Value::String(name) if !name.is_empty() => Some(name.clone()),
        Value::Object(obj) => field(obj, &["roomName", "lobbyName", "name"])
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn error_message(args: &[Value]) -> String {
    let message = match args.first() {
        Some(Value::String(message)) => Some(message.clone()),
        Some(Value::Object(obj)) => field(obj, &["message", "error"])
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    message.unwrap_or_else(|| "unknown server error".to_string())
}

/// `[initialPositions, bots]`, either part possibly missing
fn game_started(event: &'static str, args: &[Value]) -> Result<InboundCommand, MalformedPayload> {
    let players = match args.first() {
        Some(value) => entity_roster(event, value)?,
        None => HashMap::new(),
    };
    let bots = match args.get(1) {
        Some(value) => entity_roster(event, value)?,
        None => HashMap::new(),
    };
    Ok(InboundCommand::GameStarted { players, bots })
}
