//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Max movement start intents per second
pub const ACTION_RATE_LIMIT: u32 = 30;

/// Max shots per second
pub const SHOT_RATE_LIMIT: u32 = 10;

/// Outbound input throttle for the local player
#[derive(Clone)]
pub struct InputRateLimiter {
    action_limiter: Arc<Limiter>,
    shot_limiter: Arc<Limiter>,
}

impl InputRateLimiter {
    pub fn new() -> Self {
        Self::with_limits(ACTION_RATE_LIMIT, SHOT_RATE_LIMIT)
    }

    pub fn with_limits(actions_per_second: u32, shots_per_second: u32) -> Self {
        Self {
            action_limiter: create_limiter(actions_per_second),
            shot_limiter: create_limiter(shots_per_second),
        }
    }

    /// Check if a movement intent is allowed (returns true if allowed)
    pub fn check_action(&self) -> bool {
        self.action_limiter.check().is_ok()
    }

    /// Check if a shot is allowed (returns true if allowed)
    pub fn check_shot(&self) -> bool {
        self.shot_limiter.check().is_ok()
    }
}

impl Default for InputRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_beyond_quota_is_refused() {
        let limiter = InputRateLimiter::with_limits(30, 2);
        assert!(limiter.check_shot());
        assert!(limiter.check_shot());
        assert!(!limiter.check_shot());
        assert!(limiter.check_action());
    }
}
