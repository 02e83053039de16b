//! Hub wire protocol definitions
//! These are the frames exchanged with the game hub (SignalR JSON protocol v1)

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Every JSON hub message is terminated by this byte
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Outbound hub methods
pub mod methods {
    pub const CREATE_ROOM: &str = "CreateRoom";
    pub const JOIN_ROOM: &str = "JoinRoom";
    pub const GET_PLAYER_LIST: &str = "GetPlayerList";
    pub const CHANGE_LEADER: &str = "ChangeLeader";
    pub const START_GAME: &str = "StartGame";
    pub const TOGGLE_PAUSE: &str = "TogglePause";
    pub const PERFORM_ACTION: &str = "PerformAction";
    pub const SHOOT: &str = "Shoot";
    pub const GET_CONNECTION_ID: &str = "GetConnectionId";
    pub const REPORT_DEATH: &str = "ReportDeath";
}

/// Weapon pattern an entity fires with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShootingStyle {
    /// Baseline single shot
    #[default]
    Single,
    Double,
    Triple,
    Spread,
}

impl ShootingStyle {
    /// Map the hub's integer enum value
    pub fn from_wire_index(index: u64) -> Option<Self> {
        match index {
            0 => Some(Self::Single),
            1 => Some(Self::Double),
            2 => Some(Self::Triple),
            3 => Some(Self::Spread),
            _ => None,
        }
    }

    /// Map the hub's string enum name (case-insensitive)
    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "single" => Some(Self::Single),
            "double" => Some(Self::Double),
            "triple" => Some(Self::Triple),
            "spread" => Some(Self::Spread),
            _ => None,
        }
    }
}

/// Movement intents forwarded to the hub via `PerformAction`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerInputAction {
    MoveUpStart,
    MoveUpStop,
    MoveDownStart,
    MoveDownStop,
    MoveLeftStart,
    MoveLeftStop,
    MoveRightStart,
    MoveRightStop,
}

impl PlayerInputAction {
    pub const ALL: [PlayerInputAction; 8] = [
        Self::MoveUpStart,
        Self::MoveUpStop,
        Self::MoveDownStart,
        Self::MoveDownStop,
        Self::MoveLeftStart,
        Self::MoveLeftStop,
        Self::MoveRightStart,
        Self::MoveRightStop,
    ];

    /// Stop intents end a movement the hub is already applying
    pub fn is_stop(self) -> bool {
        matches!(
            self,
            Self::MoveUpStop | Self::MoveDownStop | Self::MoveLeftStop | Self::MoveRightStop
        )
    }

    /// The hub binds this enum by its integer value
    pub fn wire_value(self) -> u8 {
        match self {
            Self::MoveUpStart => 0,
            Self::MoveUpStop => 1,
            Self::MoveDownStart => 2,
            Self::MoveDownStop => 3,
            Self::MoveLeftStart => 4,
            Self::MoveLeftStop => 5,
            Self::MoveRightStart => 6,
            Self::MoveRightStop => 7,
        }
    }
}

/// Handshake sent as the first frame of every connection
#[derive(Debug, Clone, Serialize)]
pub struct HandshakeRequest {
    pub protocol: &'static str,
    pub version: u32,
}

impl Default for HandshakeRequest {
    fn default() -> Self {
        Self {
            protocol: "json",
            version: 1,
        }
    }
}

impl HandshakeRequest {
    pub fn to_frame(&self) -> String {
        // Serializing a struct of a &str and a u32 cannot fail
        let body = serde_json::to_string(self).unwrap_or_default();
        format!("{body}{RECORD_SEPARATOR}")
    }
}

/// Server reply to the handshake; an empty object means success
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandshakeResponse {
    #[serde(default)]
    pub error: Option<String>,
}

/// A decoded hub message
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// Type 1: a method call (server events arrive as invocations without an id)
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    /// Type 3: result of a client invocation
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    /// Type 6: keep-alive
    Ping,
    /// Type 7: the server is closing the connection
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Streaming and cancellation frames this client never requests
    Unsupported { kind: u8 },
}

/// Raw frame shape shared by every message type
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHubMessage {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    invocation_id: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: bool,
}

/// Errors decoding a hub frame
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Invalid JSON in hub frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Hub frame type {kind} is missing {field}")]
    MissingField { kind: u8, field: &'static str },
}

impl HubMessage {
    /// Build a client invocation frame
    pub fn invocation(
        invocation_id: Option<String>,
        target: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        HubMessage::Invocation {
            invocation_id,
            target: target.into(),
            arguments,
        }
    }

    /// Decode a single record (without its separator)
    pub fn decode(record: &str) -> Result<Self, FrameError> {
        let raw: RawHubMessage = serde_json::from_str(record)?;

        match raw.kind {
            1 => Ok(HubMessage::Invocation {
                invocation_id: raw.invocation_id,
                target: raw.target.ok_or(FrameError::MissingField {
                    kind: 1,
                    field: "target",
                })?,
                arguments: raw.arguments,
            }),
            3 => Ok(HubMessage::Completion {
                invocation_id: raw.invocation_id.ok_or(FrameError::MissingField {
                    kind: 3,
                    field: "invocationId",
                })?,
                result: raw.result.filter(|v| !v.is_null()),
                error: raw.error,
            }),
            6 => Ok(HubMessage::Ping),
            7 => Ok(HubMessage::Close {
                error: raw.error,
                allow_reconnect: raw.allow_reconnect,
            }),
            kind => Ok(HubMessage::Unsupported { kind }),
        }
    }

    /// Encode as a terminated record
    pub fn encode(&self) -> String {
        let body = match self {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => match invocation_id {
                Some(id) => json!({
                    "type": 1,
                    "invocationId": id,
                    "target": target,
                    "arguments": arguments,
                }),
                None => json!({
                    "type": 1,
                    "target": target,
                    "arguments": arguments,
                }),
            },
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => match (result, error) {
                (_, Some(error)) => json!({
                    "type": 3,
                    "invocationId": invocation_id,
                    "error": error,
                }),
                (Some(result), None) => json!({
                    "type": 3,
                    "invocationId": invocation_id,
                    "result": result,
                }),
                (None, None) => json!({
                    "type": 3,
                    "invocationId": invocation_id,
                }),
            },
            HubMessage::Ping => json!({ "type": 6 }),
            HubMessage::Close {
                error,
                allow_reconnect,
            } => json!({
                "type": 7,
                "error": error,
                "allowReconnect": allow_reconnect,
            }),
            HubMessage::Unsupported { kind } => json!({ "type": kind }),
        };

        format!("{body}{RECORD_SEPARATOR}")
    }
}

/// Split a transport frame into its non-empty records
pub fn split_records(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|record| !record.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_of_the_actions_are_stops() {
        let stops: Vec<_> = PlayerInputAction::ALL
            .into_iter()
            .filter(|a| a.is_stop())
            .map(PlayerInputAction::wire_value)
            .collect();
        assert_eq!(stops, vec![1, 3, 5, 7]);
    }

    #[test]
    fn handshake_frame_is_terminated() {
        let frame = HandshakeRequest::default().to_frame();
        assert_eq!(frame, "{\"protocol\":\"json\",\"version\":1}\u{1e}");
    }

    #[test]
    fn decodes_server_event_invocation() {
        let msg = HubMessage::decode(
            r#"{"type":1,"target":"ReceivePlayerPosition","arguments":["p1",{"x":1.5,"y":2}]}"#,
        )
        .unwrap();

        match msg {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => {
                assert!(invocation_id.is_none());
                assert_eq!(target, "ReceivePlayerPosition");
                assert_eq!(arguments.len(), 2);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn completion_with_null_result_has_no_result() {
        let msg = HubMessage::decode(r#"{"type":3,"invocationId":"4","result":null}"#).unwrap();
        assert_eq!(
            msg,
            HubMessage::Completion {
                invocation_id: "4".into(),
                result: None,
                error: None,
            }
        );
    }

    #[test]
    fn completion_without_id_is_rejected() {
        let err = HubMessage::decode(r#"{"type":3,"result":1}"#).unwrap_err();
        assert!(matches!(
            err,
            FrameError::MissingField {
                kind: 3,
                field: "invocationId"
            }
        ));
    }

    #[test]
    fn streaming_frames_are_unsupported_not_errors() {
        let msg = HubMessage::decode(r#"{"type":2,"invocationId":"1","item":5}"#).unwrap();
        assert_eq!(msg, HubMessage::Unsupported { kind: 2 });
    }

    #[test]
    fn encodes_invocation_with_id() {
        let frame = HubMessage::invocation(Some("7".into()), "Shoot", vec![]).encode();
        assert!(frame.ends_with(RECORD_SEPARATOR));

        let value: Value = serde_json::from_str(frame.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(value["type"], 1);
        assert_eq!(value["invocationId"], "7");
        assert_eq!(value["target"], "Shoot");
        assert_eq!(value["arguments"], json!([]));
    }

    #[test]
    fn splits_batched_records() {
        let frame = "{\"type\":6}\u{1e}{\"type\":6}\u{1e}";
        assert_eq!(split_records(frame).count(), 2);
        assert_eq!(split_records("\u{1e}").count(), 0);
    }

    #[test]
    fn input_actions_have_distinct_wire_values() {
        let mut values: Vec<u8> = PlayerInputAction::ALL
            .iter()
            .map(|a| a.wire_value())
            .collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values, (0..8).collect::<Vec<u8>>());
    }

    #[test]
    fn shooting_style_parses_both_wire_shapes() {
        assert_eq!(ShootingStyle::from_wire_index(2), Some(ShootingStyle::Triple));
        assert_eq!(ShootingStyle::from_wire_name("Spread"), Some(ShootingStyle::Spread));
        assert_eq!(ShootingStyle::from_wire_index(9), None);
    }
}
