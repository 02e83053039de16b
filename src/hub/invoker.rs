//! Readiness-bounded invocation
//!
//! Every outbound RPC goes through here. A call made before the connection is
//! ready suspends until it is (or until the ready timeout elapses) instead of
//! racing the socket.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::InvokeError;
use crate::hub::connection::ConnectionManager;

#[derive(Clone)]
pub struct SafeInvoker {
    connection: ConnectionManager,
    ready_timeout: Duration,
}

impl SafeInvoker {
    pub fn new(connection: ConnectionManager, ready_timeout: Duration) -> Self {
        Self {
            connection,
            ready_timeout,
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn ready_timeout(&self) -> Duration {
        self.ready_timeout
    }

    /// Wait for the connection, then invoke
    ///
    /// Fails with [`InvokeError::NotConnected`] if the connection does not become
    /// ready within the configured timeout.
    pub async fn invoke_safe(&self, method: &str, args: Vec<Value>) -> Result<Value, InvokeError> {
        if !self.connection.is_connected() {
            debug!(method, "Waiting for hub connection before invoking");
            self.connection.wait_ready(self.ready_timeout).await?;
        }

        let result = self.connection.invoke(method, args).await?;
        Ok(result.unwrap_or(Value::Null))
    }

    /// [`invoke_safe`](Self::invoke_safe) and deserialize the completion result
    pub async fn invoke_safe_as<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<T, InvokeError> {
        let value = self.invoke_safe(method, args).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Invoke immediately; `InvalidState` unless already connected
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, InvokeError> {
        let result = self.connection.invoke(method, args).await?;
        Ok(result.unwrap_or(Value::Null))
    }
}
