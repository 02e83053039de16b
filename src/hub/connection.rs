//! Hub connection lifecycle
//!
//! Owns one transport link at a time. A pump task per link reads inbound frames,
//! routes server events to the registered handlers, resolves pending invocations
//! and writes keep-alive pings. When the link drops without an explicit
//! disconnect the pump walks the reconnect schedule and re-arms the attached
//! subscriber on success.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use crate::config::Config;
use crate::error::{ConnectionError, HandlerError, InvokeError};
use crate::hub::protocol::{
    methods, split_records, HandshakeRequest, HandshakeResponse, HubMessage,
};
use crate::hub::transport::{Connector, Link};

/// Observable connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Callback for one inbound event name, called with the raw arguments
pub type EventHandler = Arc<dyn Fn(Vec<Value>) + Send + Sync>;

/// Component that installs its event handlers whenever a link becomes ready
pub trait HubSubscriber: Send + Sync {
    fn arm(&self, connection: &ConnectionManager);
}

type InvokeResult = Result<Option<Value>, InvokeError>;

struct PendingInvocation {
    method: String,
    reply: oneshot::Sender<InvokeResult>,
}

/// How a link ended
enum LinkEnd {
    /// Transport closed underneath us
    Lost,
    /// Server sent a Close frame
    Closed {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

struct Inner {
    hub_url: String,
    connector: Arc<dyn Connector>,
    handshake_timeout: Duration,
    invoke_timeout: Duration,
    keep_alive_interval: Duration,
    reconnect_delays: Vec<Duration>,

    state_tx: watch::Sender<ConnectionState>,
    connection_id: RwLock<Option<String>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pending: DashMap<String, PendingInvocation>,
    next_invocation_id: AtomicU64,
    handlers: RwLock<HashMap<String, EventHandler>>,
    subscriber: Mutex<Option<Weak<dyn HubSubscriber>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    link_generation: AtomicU64,
}

/// Shared handle to the hub connection
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(config: &Config, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(Inner {
                hub_url: config.hub_url.clone(),
                connector,
                handshake_timeout: config.handshake_timeout,
                invoke_timeout: config.invoke_timeout,
                keep_alive_interval: config.keep_alive_interval,
                reconnect_delays: config.reconnect_delays.clone(),
                state_tx,
                connection_id: RwLock::new(None),
                outbound: Mutex::new(None),
                pending: DashMap::new(),
                next_invocation_id: AtomicU64::new(0),
                handlers: RwLock::new(HashMap::new()),
                subscriber: Mutex::new(None),
                pump: Mutex::new(None),
                link_generation: AtomicU64::new(0),
            }),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open a fresh link, replacing any existing one
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        self.stop_pump().await;
        self.drop_link();

        let generation = self.inner.link_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(ConnectionState::Connecting);
        info!(hub_url = %self.inner.hub_url, generation, "Connecting to hub");

        let (link, leftover) = match self.open_link().await {
            Ok(opened) => opened,
            Err(e) => {
                warn!(error = %e, "Hub connection failed");
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let inbound = self.install_link(link);
        let pump = self
            .clone()
            .run_pump(inbound, leftover)
            .instrument(info_span!("hub_link", generation));
        *self.inner.pump.lock() = Some(tokio::spawn(pump));

        self.set_state(ConnectionState::Connected);
        info!(connection_id = ?self.connection_id(), "Connected to hub");

        if self.connection_id().is_none() {
            self.fetch_connection_id().await;
        }

        Ok(())
    }

    /// Close the link; a soft no-op when never connected
    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        let was = self.state();
        self.stop_pump().await;
        self.drop_link();
        self.set_state(ConnectionState::Disconnected);

        if was != ConnectionState::Disconnected {
            info!("Disconnected from hub");
        }
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Connection id assigned by the hub, `None` while disconnected
    pub fn connection_id(&self) -> Option<String> {
        self.inner.connection_id.read().clone()
    }

    /// Suspend until the state is `Connected`, bounded by `wait`
    pub async fn wait_ready(&self, wait: Duration) -> Result<(), InvokeError> {
        let mut rx = self.inner.state_tx.subscribe();
        let ready = matches!(
            timeout(wait, rx.wait_for(|s| *s == ConnectionState::Connected)).await,
            Ok(Ok(_))
        );

        if ready {
            Ok(())
        } else {
            Err(InvokeError::NotConnected)
        }
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    /// Register the single handler for an event name
    pub fn on(&self, event: &str, handler: EventHandler) -> Result<(), HandlerError> {
        match self.inner.handlers.write().entry(event.to_string()) {
            Entry::Occupied(_) => Err(HandlerError::Duplicate(event.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(handler);
                Ok(())
            }
        }
    }

    /// Remove the handler for an event name; returns whether one was present
    pub fn off(&self, event: &str) -> bool {
        self.inner.handlers.write().remove(event).is_some()
    }

    pub fn has_handler(&self, event: &str) -> bool {
        self.inner.handlers.read().contains_key(event)
    }

    /// Attach the component re-armed after every (re)connect
    pub fn attach(&self, subscriber: Weak<dyn HubSubscriber>) {
        *self.inner.subscriber.lock() = Some(subscriber);
    }

    /// Re-arm the attached subscriber against the current link
    pub fn rearm(&self) {
        let subscriber = self.inner.subscriber.lock().as_ref().and_then(Weak::upgrade);
        if let Some(subscriber) = subscriber {
            subscriber.arm(self);
        }
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Invoke a hub method; requires `Connected`
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> InvokeResult {
        let state = self.state();
        if state != ConnectionState::Connected {
            return Err(InvokeError::InvalidState(state));
        }

        let outbound = self
            .inner
            .outbound
            .lock()
            .clone()
            .ok_or(InvokeError::InvalidState(state))?;

        let id = self
            .inner
            .next_invocation_id
            .fetch_add(1, Ordering::Relaxed)
            .to_string();
        let (reply, rx) = oneshot::channel();
        self.inner.pending.insert(
            id.clone(),
            PendingInvocation {
                method: method.to_string(),
                reply,
            },
        );

        let frame = HubMessage::invocation(Some(id.clone()), method, args).encode();
        if outbound.send(frame).is_err() {
            self.inner.pending.remove(&id);
            return Err(InvokeError::ConnectionLost {
                method: method.to_string(),
            });
        }
        debug!(method, invocation_id = %id, "Invoked hub method");

        match timeout(self.inner.invoke_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(InvokeError::ConnectionLost {
                method: method.to_string(),
            }),
            Err(_) => {
                self.inner.pending.remove(&id);
                Err(InvokeError::Timeout {
                    method: method.to_string(),
                })
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn set_state(&self, next: ConnectionState) {
        self.inner.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    /// Connect the transport and complete the protocol handshake
    ///
    /// Returns any records that arrived in the same frame as the handshake reply.
    async fn open_link(&self) -> Result<(Link, Vec<String>), ConnectionError> {
        let connecting = self.inner.connector.connect(&self.inner.hub_url);
        let mut link = match timeout(self.inner.handshake_timeout, connecting).await {
            Ok(link) => link?,
            Err(_) => return Err(ConnectionError::HandshakeTimeout),
        };

        let unreachable = |reason: &str| ConnectionError::Unreachable {
            endpoint: self.inner.hub_url.clone(),
            reason: reason.to_string(),
        };

        link.outbound
            .send(HandshakeRequest::default().to_frame())
            .map_err(|_| unreachable("transport closed before handshake"))?;

        let frame = match timeout(self.inner.handshake_timeout, link.inbound.recv()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Err(unreachable("transport closed during handshake")),
            Err(_) => return Err(ConnectionError::HandshakeTimeout),
        };

        let mut records = split_records(&frame).map(str::to_string);
        let reply = records
            .next()
            .ok_or_else(|| ConnectionError::HandshakeRejected("empty handshake reply".into()))?;
        let response: HandshakeResponse = serde_json::from_str(&reply)
            .map_err(|e| ConnectionError::HandshakeRejected(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(ConnectionError::HandshakeRejected(error));
        }

        debug!("Hub handshake completed");
        Ok((link, records.collect()))
    }

    /// Publish the link's sender and id, arm the subscriber, hand back the inbound side
    fn install_link(&self, link: Link) -> mpsc::UnboundedReceiver<String> {
        *self.inner.connection_id.write() = link.connection_id;
        *self.inner.outbound.lock() = Some(link.outbound);
        self.rearm();
        link.inbound
    }

    /// Forget the current link and fail everything waiting on it
    fn drop_link(&self) {
        self.inner.outbound.lock().take();
        self.inner.connection_id.write().take();
        self.fail_pending();
    }

    async fn stop_pump(&self) {
        let task = self.inner.pump.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }

    fn fail_pending(&self) {
        let ids: Vec<String> = self
            .inner
            .pending
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        for id in ids {
            if let Some((_, pending)) = self.inner.pending.remove(&id) {
                let _ = pending.reply.send(Err(InvokeError::ConnectionLost {
                    method: pending.method,
                }));
            }
        }
    }

    async fn fetch_connection_id(&self) {
        match self.invoke(methods::GET_CONNECTION_ID, Vec::new()).await {
            Ok(Some(Value::String(id))) => {
                debug!(connection_id = %id, "Fetched connection id");
                *self.inner.connection_id.write() = Some(id);
            }
            Ok(other) => warn!(result = ?other, "Unexpected GetConnectionId result"),
            Err(e) => warn!(error = %e, "Failed to fetch connection id"),
        }
    }

    async fn run_pump(self, mut inbound: mpsc::UnboundedReceiver<String>, leftover: Vec<String>) {
        let mut backlog = leftover;

        loop {
            let end = self.drive_link(&mut inbound, std::mem::take(&mut backlog)).await;
            self.drop_link();

            let allow_reconnect = match end {
                LinkEnd::Lost => {
                    warn!("Hub link lost");
                    true
                }
                LinkEnd::Closed {
                    error,
                    allow_reconnect,
                } => {
                    match error {
                        Some(error) => warn!(%error, allow_reconnect, "Hub closed the connection"),
                        None => info!(allow_reconnect, "Hub closed the connection"),
                    }
                    allow_reconnect
                }
            };

            if !allow_reconnect || self.inner.reconnect_delays.is_empty() {
                self.set_state(ConnectionState::Disconnected);
                return;
            }

            self.set_state(ConnectionState::Reconnecting);
            match self.reconnect().await {
                Some((link, records)) => {
                    inbound = self.install_link(link);
                    backlog = records;
                    self.set_state(ConnectionState::Connected);
                    info!(connection_id = ?self.connection_id(), "Reconnected to hub");

                    if self.connection_id().is_none() {
                        let manager = self.clone();
                        tokio::spawn(async move { manager.fetch_connection_id().await });
                    }
                }
                None => {
                    error!(
                        attempts = self.inner.reconnect_delays.len(),
                        "Reconnect attempts exhausted"
                    );
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }
            }
        }
    }

    async fn reconnect(&self) -> Option<(Link, Vec<String>)> {
        for (attempt, delay) in self.inner.reconnect_delays.iter().enumerate() {
            if !delay.is_zero() {
                sleep(*delay).await;
            }

            match self.open_link().await {
                Ok(opened) => return Some(opened),
                Err(e) => warn!(attempt = attempt + 1, error = %e, "Reconnect attempt failed"),
            }
        }
        None
    }

    /// Serve one link until it ends
    async fn drive_link(
        &self,
        inbound: &mut mpsc::UnboundedReceiver<String>,
        backlog: Vec<String>,
    ) -> LinkEnd {
        for record in &backlog {
            if let Some(end) = self.handle_record(record) {
                return end;
            }
        }

        // interval() panics on a zero period
        let period = self.inner.keep_alive_interval.max(Duration::from_millis(100));
        let mut keep_alive = interval(period);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        keep_alive.tick().await;

        loop {
            tokio::select! {
                frame = inbound.recv() => {
                    let Some(frame) = frame else {
                        return LinkEnd::Lost;
                    };
                    for record in split_records(&frame) {
                        if let Some(end) = self.handle_record(record) {
                            return end;
                        }
                    }
                }
                _ = keep_alive.tick() => {
                    let outbound = self.inner.outbound.lock().clone();
                    if let Some(outbound) = outbound {
                        let _ = outbound.send(HubMessage::Ping.encode());
                        trace!("Sent keep-alive ping");
                    }
                }
            }
        }
    }

    fn handle_record(&self, record: &str) -> Option<LinkEnd> {
        let message = match HubMessage::decode(record) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable hub frame");
                return None;
            }
        };

        match message {
            HubMessage::Invocation {
                target, arguments, ..
            } => {
                let handler = self.inner.handlers.read().get(&target).cloned();
                match handler {
                    Some(handler) => handler(arguments),
                    None => debug!(event = %target, "No handler registered"),
                }
            }
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => match self.inner.pending.remove(&invocation_id) {
                Some((_, pending)) => {
                    let outcome = match error {
                        Some(error) => Err(InvokeError::Remote(error)),
                        None => Ok(result),
                    };
                    let _ = pending.reply.send(outcome);
                }
                None => debug!(%invocation_id, "Completion for unknown invocation"),
            },
            HubMessage::Ping => trace!("Received keep-alive ping"),
            HubMessage::Close {
                error,
                allow_reconnect,
            } => {
                return Some(LinkEnd::Closed {
                    error,
                    allow_reconnect,
                })
            }
            HubMessage::Unsupported { kind } => debug!(kind, "Ignoring unsupported hub message"),
        }

        None
    }
}
