//! Negotiate round trip that precedes the WebSocket upgrade

use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use crate::error::ConnectionError;

/// Where to open the socket, and the connection id the hub assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubEndpoint {
    pub socket_url: String,
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransport {
    pub transport: String,
}

/// Body of `POST {hub}/negotiate?negotiateVersion=1`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    #[serde(default)]
    pub connection_id: Option<String>,
    #[serde(default)]
    pub connection_token: Option<String>,
    #[serde(default)]
    pub negotiate_version: u32,
    #[serde(default)]
    pub available_transports: Vec<AvailableTransport>,
    #[serde(default)]
    pub error: Option<String>,
}

impl NegotiateResponse {
    /// Validate the response and resolve the socket endpoint
    pub fn into_endpoint(self, hub_url: &str) -> Result<HubEndpoint, ConnectionError> {
        if let Some(error) = self.error {
            return Err(ConnectionError::HandshakeRejected(error));
        }

        if !self.available_transports.is_empty()
            && !self
                .available_transports
                .iter()
                .any(|t| t.transport == "WebSockets")
        {
            return Err(ConnectionError::HandshakeRejected(
                "hub does not offer the WebSockets transport".to_string(),
            ));
        }

        // Version 0 hubs use the connection id as the socket token
        let token = match self.negotiate_version {
            0 => self.connection_id.clone(),
            _ => self.connection_token.or_else(|| self.connection_id.clone()),
        };

        Ok(HubEndpoint {
            socket_url: socket_url(hub_url, token.as_deref())?,
            connection_id: self.connection_id,
        })
    }
}

/// Performs negotiation over HTTP
#[derive(Clone, Default)]
pub struct Negotiator {
    client: Client,
}

impl Negotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn negotiate(&self, hub_url: &str) -> Result<HubEndpoint, ConnectionError> {
        let url = negotiate_url(hub_url)?;
        debug!(url = %url, "Negotiating hub connection");

        let unreachable = |reason: String| ConnectionError::Unreachable {
            endpoint: hub_url.to_string(),
            reason,
        };

        let response = self
            .client
            .post(url)
            .header("Content-Type", "text/plain;charset=UTF-8")
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectionError::HandshakeRejected(format!(
                "negotiate returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: NegotiateResponse = response
            .json()
            .await
            .map_err(|e| ConnectionError::HandshakeRejected(e.to_string()))?;

        body.into_endpoint(hub_url)
    }
}

fn parse_hub_url(hub_url: &str) -> Result<Url, ConnectionError> {
    Url::parse(hub_url).map_err(|e| ConnectionError::InvalidEndpoint(format!("{hub_url}: {e}")))
}

/// `{hub}/negotiate?negotiateVersion=1`, keeping any existing query
pub fn negotiate_url(hub_url: &str) -> Result<Url, ConnectionError> {
    let mut url = parse_hub_url(hub_url)?;
    let path = format!("{}/negotiate", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut().append_pair("negotiateVersion", "1");
    Ok(url)
}

/// Convert the hub URL to its WebSocket form, appending the connection token
pub fn socket_url(hub_url: &str, token: Option<&str>) -> Result<String, ConnectionError> {
    let mut url = parse_hub_url(hub_url)?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ConnectionError::InvalidEndpoint(format!(
                "unsupported scheme {other}"
            )))
        }
    };

    url.set_scheme(scheme)
        .map_err(|_| ConnectionError::InvalidEndpoint(hub_url.to_string()))?;

    if let Some(token) = token {
        url.query_pairs_mut().append_pair("id", token);
    }

    Ok(url.to_string())
}
