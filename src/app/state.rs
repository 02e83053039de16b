//! Client context: every service, constructed and wired explicitly

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::error::ConnectionError;
use crate::hub::connection::{ConnectionManager, ConnectionState, HubSubscriber};
use crate::hub::invoker::SafeInvoker;
use crate::hub::transport::{Connector, WsConnector};
use crate::lobby::coordinator::LobbyCoordinator;
use crate::session::input::InputCommands;
use crate::session::reset::SessionTeardown;
use crate::store::lobby::LobbyStore;
use crate::store::session::SessionStore;
use crate::sync::dispatcher::EventDispatcher;
use crate::util::rate_limit::InputRateLimiter;

/// Shared client state
#[derive(Clone)]
pub struct ClientContext {
    pub config: Arc<Config>,
    pub connection: ConnectionManager,
    pub invoker: SafeInvoker,
    pub session: SessionStore,
    pub lobby: LobbyStore,
    pub coordinator: LobbyCoordinator,
    pub dispatcher: Arc<EventDispatcher>,
    pub teardown: SessionTeardown,
    pub input: InputCommands,
}

impl ClientContext {
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> Self {
        let config = Arc::new(config);

        // Transport and invocation
        let connection = ConnectionManager::new(&config, connector);
        let invoker = SafeInvoker::new(connection.clone(), config.ready_timeout);

        // Replicas
        let session = SessionStore::new();
        let lobby = LobbyStore::new();

        let coordinator = LobbyCoordinator::new(invoker.clone(), lobby.clone(), session.clone());

        // The connection re-arms the dispatcher after every (re)connect
        let dispatcher = Arc::new(EventDispatcher::new(
            connection.clone(),
            session.clone(),
            lobby.clone(),
            coordinator.clone(),
        ));
        let subscriber: Arc<dyn HubSubscriber> = dispatcher.clone();
        connection.attach(Arc::downgrade(&subscriber));

        let teardown = SessionTeardown::new(
            dispatcher.clone(),
            session.clone(),
            lobby.clone(),
            coordinator.clone(),
        );
        let input = InputCommands::new(invoker.clone(), InputRateLimiter::new());

        Self {
            config,
            connection,
            invoker,
            session,
            lobby,
            coordinator,
            dispatcher,
            teardown,
            input,
        }
    }

    /// Context backed by the real WebSocket transport
    pub fn with_websocket(config: Config) -> Self {
        let connector = Arc::new(WsConnector::new(config.skip_negotiation));
        Self::new(config, connector)
    }

    pub async fn connect(&self) -> Result<(), ConnectionError> {
        self.connection.connect().await
    }

    /// Clear the session but keep the socket
    pub fn leave_to_menu(&self) {
        self.teardown.reset_all();
    }

    /// Clear the session and close the socket
    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        self.teardown.reset_all();
        self.connection.disconnect().await
    }

    pub fn acknowledge_game_over(&self) {
        self.teardown.reset_all();
    }

    /// Reset the session whenever a live connection ends for good
    pub fn spawn_disconnect_watch(&self) -> JoinHandle<()> {
        let mut state = self.connection.watch_state();
        let teardown = self.teardown.clone();

        tokio::spawn(async move {
            let mut previous = *state.borrow_and_update();
            while state.changed().await.is_ok() {
                let current = *state.borrow_and_update();
                let was_live = matches!(
                    previous,
                    ConnectionState::Connected | ConnectionState::Reconnecting
                );

                if current == ConnectionState::Disconnected && was_live {
                    info!("Hub connection ended, resetting session");
                    teardown.reset_all();
                }
                previous = current;
            }
        })
    }
}
