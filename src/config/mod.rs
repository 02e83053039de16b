//! Configuration module - environment variable parsing

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default hub endpoint used by the development server
pub const DEFAULT_HUB_URL: &str = "https://localhost:7172/gamehub";

/// SignalR's default automatic-reconnect schedule
const DEFAULT_RECONNECT_DELAYS_MS: [u64; 4] = [0, 2_000, 10_000, 30_000];

/// Which lobby flow the demo binary runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LobbyMode {
    Create,
    Join,
}

impl FromStr for LobbyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "join" => Ok(Self::Join),
            _ => Err(ConfigError::Invalid("LOBBY_MODE")),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Hub endpoint (http(s) for negotiation, or ws(s) when skipping it)
    pub hub_url: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Connect straight to the WebSocket without the negotiate round trip
    pub skip_negotiation: bool,

    /// Upper bound on how long a safe invoke waits for the connection
    pub ready_timeout: Duration,
    /// Upper bound on how long an invocation waits for its completion
    pub invoke_timeout: Duration,
    /// Upper bound on the protocol handshake
    pub handshake_timeout: Duration,
    /// Interval between client keep-alive pings
    pub keep_alive_interval: Duration,
    /// Delay before each automatic reconnect attempt
    pub reconnect_delays: Vec<Duration>,

    /// Display name for the demo binary (random nick when unset)
    pub player_name: Option<String>,
    /// Lobby the demo binary creates or joins
    pub lobby_name: Option<String>,
    /// Lobby flow the demo binary runs
    pub lobby_mode: LobbyMode,
    /// Lobby size requested on create
    pub max_players: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hub_url: DEFAULT_HUB_URL.to_string(),
            log_level: "info".to_string(),
            skip_negotiation: false,
            ready_timeout: Duration::from_millis(5_000),
            invoke_timeout: Duration::from_millis(10_000),
            handshake_timeout: Duration::from_millis(15_000),
            keep_alive_interval: Duration::from_millis(15_000),
            reconnect_delays: DEFAULT_RECONNECT_DELAYS_MS
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
            player_name: None,
            lobby_name: None,
            lobby_mode: LobbyMode::Create,
            max_players: 4,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            hub_url: env::var("HUB_URL").unwrap_or(defaults.hub_url),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            skip_negotiation: parse_var("HUB_SKIP_NEGOTIATION")?
                .unwrap_or(defaults.skip_negotiation),

            ready_timeout: millis_var("READY_TIMEOUT_MS")?.unwrap_or(defaults.ready_timeout),
            invoke_timeout: millis_var("INVOKE_TIMEOUT_MS")?.unwrap_or(defaults.invoke_timeout),
            handshake_timeout: millis_var("HANDSHAKE_TIMEOUT_MS")?
                .unwrap_or(defaults.handshake_timeout),
            keep_alive_interval: millis_var("KEEP_ALIVE_MS")?
                .unwrap_or(defaults.keep_alive_interval),
            reconnect_delays: match env::var("RECONNECT_DELAYS_MS") {
                Ok(raw) => parse_delays(&raw)?,
                Err(_) => defaults.reconnect_delays,
            },

            player_name: non_empty_var("PLAYER_NAME"),
            lobby_name: non_empty_var("LOBBY_NAME"),
            lobby_mode: parse_var("LOBBY_MODE")?.unwrap_or(defaults.lobby_mode),
            max_players: parse_var("MAX_PLAYERS")?.unwrap_or(defaults.max_players),
        })
    }
}

fn non_empty_var(key: &'static str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match non_empty_var(key) {
        Some(raw) => raw.parse().map(Some).map_err(|_| ConfigError::Invalid(key)),
        None => Ok(None),
    }
}

fn millis_var(key: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_var::<u64>(key)?.map(Duration::from_millis))
}

/// Parse a comma-separated list of millisecond delays
fn parse_delays(raw: &str) -> Result<Vec<Duration>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::Invalid("RECONNECT_DELAYS_MS"))
        })
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
