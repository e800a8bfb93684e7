//! Sliding-hour invocation quota.
//!
//! Each agent identity may start at most `calls_per_hour` invocations in any
//! trailing hour. The window of call timestamps is persisted so the quota
//! holds across process restarts.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainResult, Interrupted};
use crate::domain::interrupt::Interrupt;
use crate::domain::models::{RateLimitConfig, RateLimiterWindow};
use crate::domain::ports::{Clock, StateStore};

/// Longest single sleep while blocked; a countdown is logged between chunks.
const WAIT_CHUNK: Duration = Duration::from_secs(60);

fn window_length() -> ChronoDuration {
    ChronoDuration::hours(1)
}

/// Result of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateCheck {
    Proceed,
    /// Under quota but past the warning threshold.
    Warned { used: u32, capacity: u32 },
    /// The quota was full; the limiter waited for a slot.
    BlockedThenWaited { waited: Duration },
}

/// Current window usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateUsage {
    pub used: u32,
    pub capacity: u32,
    /// When the oldest call leaves the window, if any are recorded
    pub next_slot_at: Option<DateTime<Utc>>,
}

/// Per-identity sliding-window rate limiter.
pub struct RateLimiter {
    config: RateLimitConfig,
    identity: String,
    window: RateLimiterWindow,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Load the persisted window for `identity`, or start empty.
    pub fn load(
        config: RateLimitConfig,
        identity: impl Into<String>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> DomainResult<Self> {
        let identity = identity.into();
        let window = store.load_rate_window(&identity)?.unwrap_or_default();
        let mut limiter = Self {
            config,
            identity,
            window,
            store,
            clock,
        };
        limiter.prune(limiter.clock.now());
        debug!(
            identity = %limiter.identity,
            used = limiter.window.calls.len(),
            capacity = limiter.config.calls_per_hour,
            "loaded rate window"
        );
        Ok(limiter)
    }

    pub fn capacity(&self) -> u32 {
        self.config.calls_per_hour
    }

    /// Usage over the trailing hour.
    pub fn usage(&mut self) -> RateUsage {
        let now = self.clock.now();
        self.prune(now);
        RateUsage {
            used: self.used(),
            capacity: self.config.calls_per_hour,
            next_slot_at: self.window.calls.front().map(|t| *t + window_length()),
        }
    }

    /// Wait, if needed, until a call may start.
    ///
    /// Only an interrupt ends the wait early. The window is re-evaluated
    /// after every wait, so a slot freed by the clock is always observed.
    pub async fn check(&mut self, phase: &str, interrupt: &Interrupt) -> Result<RateCheck, Interrupted> {
        let mut waited = Duration::ZERO;

        loop {
            interrupt.check()?;
            let now = self.clock.now();
            self.prune(now);
            let used = self.used();
            let capacity = self.config.calls_per_hour;

            if used < capacity {
                if !waited.is_zero() {
                    info!(identity = %self.identity, phase, waited_secs = waited.as_secs(), "rate limit slot available");
                    return Ok(RateCheck::BlockedThenWaited { waited });
                }
                if u64::from(used) * 100 >= u64::from(capacity) * u64::from(self.config.warning_threshold_percent) {
                    warn!(identity = %self.identity, phase, used, capacity, "approaching hourly invocation limit");
                    return Ok(RateCheck::Warned { used, capacity });
                }
                return Ok(RateCheck::Proceed);
            }

            let until = self
                .window
                .calls
                .front()
                .map_or(now, |oldest| *oldest + window_length());
            let remaining = (until - now).to_std().unwrap_or(Duration::ZERO);
            let chunk = remaining.clamp(Duration::from_millis(1), WAIT_CHUNK);
            info!(
                identity = %self.identity,
                phase,
                used,
                capacity,
                remaining_secs = remaining.as_secs(),
                "hourly invocation limit reached, waiting"
            );

            let started = tokio::time::Instant::now();
            interrupt.sleep(chunk).await?;
            waited += started.elapsed();
        }
    }

    /// Record a call started now and persist the window.
    pub fn record(&mut self) -> DomainResult<()> {
        let now = self.clock.now();
        self.prune(now);
        self.window.calls.push_back(now);
        self.store.save_rate_window(&self.identity, &self.window)
    }

    /// Forget every recorded call.
    pub fn reset(&mut self) -> DomainResult<()> {
        self.window.calls.clear();
        self.store.clear_rate_window(&self.identity)
    }

    fn used(&self) -> u32 {
        u32::try_from(self.window.calls.len()).unwrap_or(u32::MAX)
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - window_length();
        while self.window.calls.front().is_some_and(|t| *t <= cutoff) {
            self.window.calls.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{state::MemoryStateStore, ManualClock, VirtualClock};
    use test_strategy::proptest;

    fn limiter(calls_per_hour: u32, clock: Arc<dyn Clock>, store: Arc<MemoryStateStore>) -> RateLimiter {
        RateLimiter::load(
            RateLimitConfig {
                calls_per_hour,
                warning_threshold_percent: 80,
            },
            "claude",
            store,
            clock,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_proceeds_then_warns_near_capacity() {
        let clock = Arc::new(ManualClock::default());
        let mut limiter = limiter(5, clock, Arc::new(MemoryStateStore::new()));
        let interrupt = Interrupt::new();

        for _ in 0..4 {
            assert_eq!(limiter.check("plan", &interrupt).await.unwrap(), RateCheck::Proceed);
            limiter.record().unwrap();
        }
        assert_eq!(
            limiter.check("plan", &interrupt).await.unwrap(),
            RateCheck::Warned { used: 4, capacity: 5 }
        );
    }

    #[test]
    fn test_old_calls_leave_the_window() {
        let clock = Arc::new(ManualClock::default());
        let mut limiter = limiter(10, clock.clone(), Arc::new(MemoryStateStore::new()));
        limiter.record().unwrap();
        clock.advance(ChronoDuration::minutes(30));
        limiter.record().unwrap();
        assert_eq!(limiter.usage().used, 2);

        clock.advance(ChronoDuration::minutes(31));
        assert_eq!(limiter.usage().used, 1);
    }

    #[test]
    fn test_window_persists_per_identity() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStateStore::new());
        let mut first = limiter(10, clock.clone(), store.clone());
        first.record().unwrap();
        first.record().unwrap();

        let mut reloaded = limiter(10, clock.clone(), store.clone());
        assert_eq!(reloaded.usage().used, 2);

        let mut other = RateLimiter::load(RateLimitConfig::default(), "codex", store, clock).unwrap();
        assert_eq!(other.usage().used, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocks_until_oldest_call_expires() {
        let clock = Arc::new(VirtualClock::default());
        let mut limiter = limiter(2, clock.clone(), Arc::new(MemoryStateStore::new()));
        limiter.record().unwrap();
        tokio::time::sleep(Duration::from_secs(600)).await;
        limiter.record().unwrap();

        let result = limiter.check("implement", &Interrupt::new()).await.unwrap();
        match result {
            RateCheck::BlockedThenWaited { waited } => {
                assert_eq!(waited.as_secs(), 3000);
            }
            other => panic!("expected a wait, got {other:?}"),
        }
        assert_eq!(limiter.usage().used, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_ends_wait_without_recording() {
        let clock = Arc::new(VirtualClock::default());
        let store = Arc::new(MemoryStateStore::new());
        let mut limiter = limiter(1, clock, store.clone());
        limiter.record().unwrap();
        let saves = store.save_count();

        let interrupt = Interrupt::new();
        let trigger = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.trigger();
        });

        assert_eq!(limiter.check("test", &interrupt).await, Err(Interrupted));
        assert_eq!(store.save_count(), saves);
        assert_eq!(limiter.usage().used, 1);
    }

    #[proptest]
    fn prop_usage_only_counts_trailing_hour(
        #[strategy(proptest::collection::vec(0i64..7200, 0..40))] offsets: Vec<i64>,
    ) {
        let clock = Arc::new(ManualClock::default());
        let mut limiter = limiter(1000, clock.clone(), Arc::new(MemoryStateStore::new()));
        let mut sorted = offsets;
        sorted.sort_unstable();
        let start = clock.now();
        for offset in &sorted {
            clock.set(start + ChronoDuration::seconds(*offset));
            limiter.record().unwrap();
        }
        let now = clock.now();
        let expected = sorted
            .iter()
            .filter(|o| start + ChronoDuration::seconds(**o) > now - ChronoDuration::hours(1))
            .count();
        proptest::prop_assert_eq!(limiter.usage().used as usize, expected);
    }
}
