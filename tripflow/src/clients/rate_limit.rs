//! Process-wide search quota bookkeeping.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Cooldown applied when the service reports a rate limit without a hint.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

/// Longest block a single rate limit response can impose.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(3_600);

#[derive(Debug, Default)]
struct GateState {
    blocked_until: Option<Instant>,
    requests: u64,
    rate_limited: u64,
}

/// Shared rate limit state for one external search quota.
///
/// Every run in the process shares one gate through an `Arc`. Once the service
/// reports a rate limit, further requests fail fast until the reset time
/// passes instead of spending more of the quota.
#[derive(Debug)]
pub struct RateLimitGate {
    state: Mutex<GateState>,
    default_cooldown: Duration,
}

impl Default for RateLimitGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl RateLimitGate {
    /// Creates a gate with the cooldown used when no reset hint is given.
    #[must_use]
    pub fn new(default_cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            default_cooldown,
        }
    }

    /// Reserves a request slot, or returns the remaining block time.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();
        if let Some(until) = state.blocked_until {
            if until > now {
                return Err(until - now);
            }
            state.blocked_until = None;
        }
        state.requests += 1;
        Ok(())
    }

    /// Records a rate limit response and blocks until it resets.
    pub fn record_rate_limit(&self, reset_after: Option<Duration>) {
        let mut state = self.state.lock();
        let until = Instant::now() + reset_after.unwrap_or(self.default_cooldown).min(MAX_COOLDOWN);
        state.rate_limited += 1;
        state.blocked_until = Some(state.blocked_until.map_or(until, |b| b.max(until)));
    }

    /// Time left until requests are allowed again.
    #[must_use]
    pub fn blocked_for(&self) -> Option<Duration> {
        let state = self.state.lock();
        let now = Instant::now();
        state.blocked_until.filter(|u| *u > now).map(|u| u - now)
    }

    /// Requests let through so far.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.state.lock().requests
    }

    /// Rate limit responses seen so far.
    #[must_use]
    pub fn rate_limited(&self) -> u64 {
        self.state.lock().rate_limited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_gate_blocks_until_reset() {
        let gate = RateLimitGate::default();
        assert!(gate.try_acquire().is_ok());

        gate.record_rate_limit(Some(Duration::from_secs(2)));
        let remaining = gate.try_acquire().unwrap_err();
        assert_eq!(remaining, Duration::from_secs(2));
        assert_eq!(gate.rate_limited(), 1);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(gate.try_acquire().is_ok());
        assert_eq!(gate.requests(), 2);
        assert!(gate.blocked_for().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_cooldown_and_longest_block_wins() {
        let gate = RateLimitGate::new(Duration::from_secs(10));
        gate.record_rate_limit(None);
        gate.record_rate_limit(Some(Duration::from_secs(1)));
        assert_eq!(gate.blocked_for(), Some(Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_reset_hint_is_capped() {
        let gate = RateLimitGate::default();
        gate.record_rate_limit(Some(Duration::from_secs(u64::MAX / 2)));
        assert_eq!(gate.blocked_for(), Some(MAX_COOLDOWN));
    }
}
