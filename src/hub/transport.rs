//! Transport seam between the connection manager and the network
//!
//! A [`Connector`] produces a [`Link`]: a pair of text-frame channels plus the
//! connection id learned during negotiation. The WebSocket implementation splits
//! the socket into a reader task and a writer task; tests plug in an in-memory
//! connector instead.

use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::ConnectionError;
use crate::hub::negotiate::{socket_url, HubEndpoint, Negotiator};

/// An established transport: frames out, frames in
///
/// The inbound channel closing means the transport is gone.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
    pub connection_id: Option<String>,
}

/// Opens transports to the hub
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, hub_url: &str) -> BoxFuture<'static, Result<Link, ConnectionError>>;
}

/// WebSocket connector with optional negotiation
#[derive(Clone, Default)]
pub struct WsConnector {
    negotiator: Negotiator,
    skip_negotiation: bool,
}

impl WsConnector {
    pub fn new(skip_negotiation: bool) -> Self {
        Self {
            negotiator: Negotiator::new(),
            skip_negotiation,
        }
    }
}

impl Connector for WsConnector {
    fn connect(&self, hub_url: &str) -> BoxFuture<'static, Result<Link, ConnectionError>> {
        let negotiator = self.negotiator.clone();
        let skip_negotiation = self.skip_negotiation;
        let hub_url = hub_url.to_string();

        async move {
            let endpoint = if skip_negotiation {
                HubEndpoint {
                    socket_url: socket_url(&hub_url, None)?,
                    connection_id: None,
                }
            } else {
                negotiator.negotiate(&hub_url).await?
            };

            let (socket, _response) = tokio_tungstenite::connect_async(endpoint.socket_url.as_str())
                .await
                .map_err(|e| ConnectionError::Unreachable {
                    endpoint: hub_url.clone(),
                    reason: e.to_string(),
                })?;

            debug!(url = %endpoint.socket_url, "WebSocket opened");

            let (mut ws_sink, mut ws_stream) = socket.split();
            let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

            // Writer task: outbound frames -> WebSocket
            tokio::spawn(async move {
                while let Some(frame) = outbound_rx.recv().await {
                    if let Err(e) = ws_sink.send(Message::Text(frame)).await {
                        debug!(error = %e, "WebSocket send failed");
                        break;
                    }
                }
                let _ = ws_sink.close().await;
            });

            // Reader task: WebSocket -> inbound frames
            tokio::spawn(async move {
                while let Some(result) = ws_stream.next().await {
                    match result {
                        Ok(Message::Text(text)) => {
                            if inbound_tx.send(text).is_err() {
                                break;
                            }
                        }
                        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                            Ok(text) => {
                                if inbound_tx.send(text).is_err() {
                                    break;
                                }
                            }
                            Err(_) => warn!("Received non UTF-8 binary frame, ignoring"),
                        },
                        Ok(Message::Close(frame)) => {
                            debug!(?frame, "Hub closed the WebSocket");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                    }
                }
            });

            Ok(Link {
                outbound: outbound_tx,
                inbound: inbound_rx,
                connection_id: endpoint.connection_id,
            })
        }
        .boxed()
    }
}
