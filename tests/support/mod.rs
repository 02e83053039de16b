//! In-memory hub used by the integration tests
//!
//! `MockConnector` hands the client one end of a channel pair per connect and
//! publishes the other end as a `ServerLink`, so a test can play the hub.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use space_session_client::config::Config;
use space_session_client::error::ConnectionError;
use space_session_client::hub::protocol::{split_records, HubMessage, RECORD_SEPARATOR};
use space_session_client::hub::{Connector, Link};
use space_session_client::ClientContext;

pub const WAIT: Duration = Duration::from_secs(2);

/// Config with short timeouts and a fast reconnect schedule
pub fn test_config() -> Config {
    Config {
        hub_url: "http://mock.local/gamehub".to_string(),
        ready_timeout: Duration::from_secs(2),
        invoke_timeout: Duration::from_secs(2),
        handshake_timeout: Duration::from_millis(500),
        reconnect_delays: vec![Duration::ZERO, Duration::from_millis(10)],
        ..Config::default()
    }
}

/// Hub side of one accepted connection
pub struct ServerLink {
    pub connection_id: Option<String>,
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
    backlog: Vec<String>,
}

impl ServerLink {
    /// Push a server event to the client
    pub fn send_event(&self, target: &str, args: Vec<Value>) {
        let frame = HubMessage::invocation(None, target, args).encode();
        let _ = self.to_client.send(frame);
    }

    pub fn complete(&self, invocation_id: &str, result: Value) {
        let frame = HubMessage::Completion {
            invocation_id: invocation_id.to_string(),
            result: Some(result),
            error: None,
        }
        .encode();
        let _ = self.to_client.send(frame);
    }

    pub fn fail(&self, invocation_id: &str, error: &str) {
        let frame = HubMessage::Completion {
            invocation_id: invocation_id.to_string(),
            result: None,
            error: Some(error.to_string()),
        }
        .encode();
        let _ = self.to_client.send(frame);
    }

    pub fn send_close(&self, allow_reconnect: bool) {
        let frame = HubMessage::Close {
            error: None,
            allow_reconnect,
        }
        .encode();
        let _ = self.to_client.send(frame);
    }

    /// Next decodable client message within `wait`; the handshake is skipped
    pub async fn next_message_within(&mut self, wait: Duration) -> Option<HubMessage> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            while let Some(record) = self.backlog.pop() {
                if let Ok(message) = HubMessage::decode(&record) {
                    return Some(message);
                }
            }

            let frame = tokio::time::timeout_at(deadline, self.from_client.recv())
                .await
                .ok()??;
            let mut records: Vec<String> = split_records(&frame).map(str::to_string).collect();
            records.reverse();
            self.backlog.extend(records);
        }
    }

    /// Next client invocation within `wait`, skipping pings
    pub async fn next_invocation_within(
        &mut self,
        wait: Duration,
    ) -> Option<(String, String, Vec<Value>)> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if let HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } = self.next_message_within(remaining).await?
            {
                return Some((invocation_id.unwrap_or_default(), target, arguments));
            }
        }
    }

    /// Next invocation, which must target `method`
    pub async fn expect_invocation(&mut self, method: &str) -> (String, Vec<Value>) {
        let (id, target, args) = self
            .next_invocation_within(WAIT)
            .await
            .unwrap_or_else(|| panic!("no {method} invocation arrived"));
        assert_eq!(target, method, "unexpected invocation");
        (id, args)
    }

    /// Skip invocations until `method` arrives
    pub async fn wait_for_invocation(&mut self, method: &str) -> (String, Vec<Value>) {
        loop {
            let (id, target, args) = self
                .next_invocation_within(WAIT)
                .await
                .unwrap_or_else(|| panic!("no {method} invocation arrived"));
            if target == method {
                return (id, args);
            }
        }
    }

    /// Every invocation target sent within `wait`
    pub async fn drain_invocations(&mut self, wait: Duration) -> Vec<String> {
        let mut targets = Vec::new();
        while let Some((_, target, _)) = self.next_invocation_within(wait).await {
            targets.push(target);
        }
        targets
    }
}

struct MockState {
    links: mpsc::UnboundedSender<ServerLink>,
    attempts: AtomicUsize,
    refuse: AtomicUsize,
    stall: AtomicUsize,
    assign_ids: bool,
    handshake_reply: Mutex<String>,
}

/// Connector that accepts connections in memory
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerLink>) {
        Self::build(true)
    }

    /// Links carry no connection id, as when negotiation is skipped
    pub fn without_connection_ids() -> (Self, mpsc::UnboundedReceiver<ServerLink>) {
        Self::build(false)
    }

    fn build(assign_ids: bool) -> (Self, mpsc::UnboundedReceiver<ServerLink>) {
        let (links, rx) = mpsc::unbounded_channel();
        let state = MockState {
            links,
            attempts: AtomicUsize::new(0),
            refuse: AtomicUsize::new(0),
            stall: AtomicUsize::new(0),
            assign_ids,
            handshake_reply: Mutex::new("{}".to_string()),
        };
        (
            Self {
                state: Arc::new(state),
            },
            rx,
        )
    }

    /// Fail the next `count` connection attempts
    pub fn refuse_next(&self, count: usize) {
        self.state.refuse.store(count, Ordering::SeqCst);
    }

    /// Leave the next `count` connection attempts pending forever
    pub fn stall_next(&self, count: usize) {
        self.state.stall.store(count, Ordering::SeqCst);
    }

    pub fn reject_handshake(&self, error: &str) {
        *self.state.handshake_reply.lock() = serde_json::json!({ "error": error }).to_string();
    }

    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn connect(&self, hub_url: &str) -> BoxFuture<'static, Result<Link, ConnectionError>> {
        let state = self.state.clone();
        let hub_url = hub_url.to_string();

        async move {
            let attempt = state.attempts.fetch_add(1, Ordering::SeqCst) + 1;

            let refused = state
                .refuse
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(ConnectionError::Unreachable {
                    endpoint: hub_url,
                    reason: "connection refused".to_string(),
                });
            }

            let stalled = state
                .stall
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if stalled {
                return futures::future::pending::<Result<Link, ConnectionError>>().await;
            }

            let (client_tx, from_client) = mpsc::unbounded_channel();
            let (to_client, client_rx) = mpsc::unbounded_channel();

            let reply = format!("{}{}", state.handshake_reply.lock(), RECORD_SEPARATOR);
            let _ = to_client.send(reply);

            let connection_id = state.assign_ids.then(|| format!("conn-{attempt}"));
            let _ = state.links.send(ServerLink {
                connection_id: connection_id.clone(),
                from_client,
                to_client,
                backlog: Vec::new(),
            });

            Ok(Link {
                outbound: client_tx,
                inbound: client_rx,
                connection_id,
            })
        }
        .boxed()
    }
}

/// Context wired to a fresh mock hub
pub fn mock_context() -> (ClientContext, MockConnector, mpsc::UnboundedReceiver<ServerLink>) {
    mock_context_with(test_config())
}

pub fn mock_context_with(
    config: Config,
) -> (ClientContext, MockConnector, mpsc::UnboundedReceiver<ServerLink>) {
    let (connector, links) = MockConnector::new();
    let context = ClientContext::new(config, Arc::new(connector.clone()));
    (context, connector, links)
}

/// Connected context plus the hub side of its link
pub async fn connected_context() -> (ClientContext, ServerLink, mpsc::UnboundedReceiver<ServerLink>)
{
    let (context, _connector, mut links) = mock_context();
    context.connect().await.expect("mock connect");
    let link = next_link(&mut links).await;
    (context, link, links)
}

pub async fn next_link(links: &mut mpsc::UnboundedReceiver<ServerLink>) -> ServerLink {
    tokio::time::timeout(WAIT, links.recv())
        .await
        .expect("no connection attempt")
        .expect("connector dropped")
}

/// Poll `condition` until it holds or the wait elapses
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
