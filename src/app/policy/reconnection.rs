// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Reconnection schedules, consumed by the control connection and host
//! pools when links drop.

use std::time::Duration;

/// Yields the wait before reconnect attempt number `attempt` (0-based).
pub trait ReconnectionPolicy: Send + Sync {
    fn next_delay(&self, attempt: usize) -> Duration;
}

/// The same delay for every attempt.
pub struct ConstantReconnectionPolicy {
    delay: Duration,
}

impl ConstantReconnectionPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl ReconnectionPolicy for ConstantReconnectionPolicy {
    fn next_delay(&self, _attempt: usize) -> Duration {
        self.delay
    }
}

/// Doubling delays from `base` up to `cap`.
pub struct ExponentialReconnectionPolicy {
    base: Duration,
    cap: Duration,
}

impl ExponentialReconnectionPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }
}

impl Default for ExponentialReconnectionPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl ReconnectionPolicy for ExponentialReconnectionPolicy {
    fn next_delay(&self, attempt: usize) -> Duration {
        let factor = 1u32 << attempt.min(31) as u32;
        self.base.checked_mul(factor).unwrap_or(self.cap).min(self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_doubles_to_cap() {
        let policy = ExponentialReconnectionPolicy::default();
        assert_eq!(policy.next_delay(0), Duration::from_secs(1));
        assert_eq!(policy.next_delay(1), Duration::from_secs(2));
        assert_eq!(policy.next_delay(5), Duration::from_secs(32));
        assert_eq!(policy.next_delay(6), Duration::from_secs(60));
        assert_eq!(policy.next_delay(40), Duration::from_secs(60));
    }

    #[test]
    fn constant_is_constant() {
        let policy = ConstantReconnectionPolicy::new(Duration::from_millis(500));
        assert_eq!(policy.next_delay(0), policy.next_delay(9));
    }
}
