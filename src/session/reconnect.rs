// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Reconnection policy for long-lived notification listeners.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Retry limits for a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failures tolerated before giving up. Zero retries forever.
    pub max_attempts: u32,
    /// Pause applied before each failure is counted.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(2000),
        }
    }
}

/// What to do after a listener failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry { attempt: u32 },
    GiveUp { attempts: u32 },
}

/// Counts consecutive listener failures for one session.
#[derive(Debug, Default)]
pub struct ReconnectTracker {
    policy: ReconnectPolicy,
    failures: AtomicU32,
}

impl ReconnectTracker {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            failures: AtomicU32::new(0),
        }
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Consecutive failures so far.
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Wait the configured delay, then count the failure.
    pub async fn record_failure(&self) -> ReconnectDecision {
        if !self.policy.delay.is_zero() {
            tokio::time::sleep(self.policy.delay).await;
        }
        let attempt = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        if self.policy.max_attempts > 0 && attempt >= self.policy.max_attempts {
            ReconnectDecision::GiveUp { attempts: attempt }
        } else {
            ReconnectDecision::Retry { attempt }
        }
    }

    /// The listener connected; start counting from zero again.
    pub fn record_success(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts,
            delay: Duration::from_secs(2),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_at_max() {
        let tracker = ReconnectTracker::new(policy(3));
        assert_eq!(tracker.record_failure().await, ReconnectDecision::Retry { attempt: 1 });
        assert_eq!(tracker.record_failure().await, ReconnectDecision::Retry { attempt: 2 });
        assert_eq!(tracker.record_failure().await, ReconnectDecision::GiveUp { attempts: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_precedes_count() {
        let tracker = std::sync::Arc::new(ReconnectTracker::new(policy(0)));
        let t = tracker.clone();
        let handle = tokio::spawn(async move { t.record_failure().await });

        tokio::task::yield_now().await;
        assert_eq!(tracker.failures(), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(handle.await.unwrap(), ReconnectDecision::Retry { attempt: 1 });
        assert_eq!(tracker.failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_retries_forever() {
        let tracker = ReconnectTracker::new(policy(0));
        for i in 1..=20 {
            assert_eq!(tracker.record_failure().await, ReconnectDecision::Retry { attempt: i });
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets() {
        let tracker = ReconnectTracker::new(policy(2));
        tracker.record_failure().await;
        tracker.record_success();
        assert_eq!(tracker.failures(), 0);
        assert_eq!(tracker.record_failure().await, ReconnectDecision::Retry { attempt: 1 });
    }
}
