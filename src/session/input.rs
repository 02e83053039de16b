//! Player input intents: movement start/stop and shooting

use serde_json::json;
use tracing::trace;

use crate::error::InvokeError;
use crate::hub::invoker::SafeInvoker;
use crate::hub::protocol::{methods, PlayerInputAction};
use crate::util::rate_limit::InputRateLimiter;

#[derive(Clone)]
pub struct InputCommands {
    invoker: SafeInvoker,
    limiter: InputRateLimiter,
}

impl InputCommands {
    pub fn new(invoker: SafeInvoker, limiter: InputRateLimiter) -> Self {
        Self { invoker, limiter }
    }

    /// Send a movement intent; only starts count against the action limit
    ///
    /// A dropped stop would leave the ship moving on the hub, so stops always go out.
    pub async fn perform_action(&self, action: PlayerInputAction) -> Result<(), InvokeError> {
        if !action.is_stop() && !self.limiter.check_action() {
            trace!(?action, "Action throttled");
            return Err(InvokeError::Throttled);
        }

        self.invoker
            .invoke_safe(methods::PERFORM_ACTION, vec![json!(action.wire_value())])
            .await?;
        Ok(())
    }

    pub async fn shoot(&self) -> Result<(), InvokeError> {
        if !self.limiter.check_shot() {
            trace!("Shot throttled");
            return Err(InvokeError::Throttled);
        }

        self.invoker.invoke_safe(methods::SHOOT, Vec::new()).await?;
        Ok(())
    }
}
