//! Space Session Client - headless lobby client for the space shooter hub
//!
//! Connects to the game hub, creates or joins a lobby and mirrors the session:
//! - roster and leader changes are logged as they arrive
//! - hit / death notifications are logged once each
//! - Ctrl+C or SIGTERM disconnects cleanly

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use space_session_client::config::{Config, LobbyMode};
use space_session_client::lobby::{CreateLobbyForm, JoinLobbyForm};
use space_session_client::store::SessionNotification;
use space_session_client::util::nick::generate_nick;
use space_session_client::ClientContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Starting Space Session Client");
    info!("Hub endpoint: {}", config.hub_url);

    let player_name = config.player_name.clone().unwrap_or_else(generate_nick);
    let lobby_name = config
        .lobby_name
        .clone()
        .unwrap_or_else(|| format!("{player_name}'s lobby"));

    let context = ClientContext::with_websocket(config.clone());
    let disconnect_watch = context.spawn_disconnect_watch();

    // Log roster changes
    let _roster = context.lobby.subscribe(|lobby| {
        info!(
            lobby = %lobby.lobby_name,
            players = lobby.players.len(),
            leader = ?lobby.leader_connection_id,
            game_started = lobby.game_started,
            "Lobby updated"
        );
    });

    // Log one-shot session notifications
    let mut notifications = context.session.notifications();
    tokio::spawn(async move {
        while let Ok(notification) = notifications.recv().await {
            match notification {
                SessionNotification::PlayerHit(hit) => {
                    info!(id = %hit.id, health = hit.health, "Player hit")
                }
                SessionNotification::PlayerDied(died) => info!(id = %died.id, "Player died"),
            }
        }
    });

    context
        .connect()
        .await
        .context("Failed to connect to the hub")?;

    let joined = match config.lobby_mode {
        LobbyMode::Create => {
            context
                .coordinator
                .create_lobby(CreateLobbyForm {
                    lobby_name: lobby_name.clone(),
                    player_name: player_name.clone(),
                    max_players: config.max_players,
                })
                .await
        }
        LobbyMode::Join => {
            context
                .coordinator
                .join_lobby(JoinLobbyForm {
                    lobby_name: lobby_name.clone(),
                    player_name: player_name.clone(),
                })
                .await
        }
    };

    match joined {
        Ok(()) => info!(lobby = %lobby_name, player = %player_name, "In lobby"),
        Err(e) => warn!(error = %e, "Lobby request failed"),
    }

    shutdown_signal().await;

    disconnect_watch.abort();
    context.disconnect().await?;

    info!("Client shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
