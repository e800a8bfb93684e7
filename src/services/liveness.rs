//! Liveness monitor for a running agent invocation.
//!
//! Samples the invocation's output counter in the background and warns when
//! output stalls or the phase nears its timeout. It never stops the phase.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::domain::interrupt::Interrupt;
use crate::domain::models::{LivenessConfig, OutputProgress};

/// What the monitor observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LivenessSummary {
    pub samples: u32,
    pub stale_warnings: u32,
    pub timeout_warning_emitted: bool,
    pub final_bytes: u64,
}

/// Handle to a running monitor.
pub struct LivenessHandle {
    stop: Interrupt,
    task: JoinHandle<LivenessSummary>,
}

impl LivenessHandle {
    /// Stop the monitor and wait for it to finish.
    pub async fn stop(self) -> LivenessSummary {
        self.stop.trigger();
        match self.task.await {
            Ok(summary) => summary,
            Err(e) => {
                debug!(error = %e, "liveness monitor task ended abnormally");
                LivenessSummary::default()
            }
        }
    }
}

/// Background sampler for one invocation.
pub struct LivenessMonitor;

impl LivenessMonitor {
    /// Start sampling `progress`. `stop` should be a child of the run's
    /// interrupt so an operator cancel also ends the monitor.
    pub fn spawn(
        config: &LivenessConfig,
        progress: OutputProgress,
        phase: impl Into<String>,
        phase_timeout: Duration,
        stop: Interrupt,
    ) -> LivenessHandle {
        let sample_every = Duration::from_secs(config.sample_interval_secs.max(1));
        let stale_after = Duration::from_secs(config.stale_after_secs.max(1));
        let warn_at = phase_timeout.mul_f64(f64::from(config.timeout_warning_percent.min(100)) / 100.0);
        let phase = phase.into();
        let token = stop.clone();

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = interval_at(started + sample_every, sample_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut summary = LivenessSummary::default();
            let mut last_bytes = progress.bytes();
            let mut last_growth = started;
            let mut last_stale_warning: Option<Instant> = None;

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                summary.samples += 1;
                let now = Instant::now();
                let bytes = progress.bytes();
                if bytes > last_bytes {
                    last_bytes = bytes;
                    last_growth = now;
                }

                let quiet_for = now.duration_since(last_growth);
                let warned_recently = last_stale_warning.is_some_and(|at| now.duration_since(at) < stale_after);
                if quiet_for >= stale_after && !warned_recently {
                    warn!(
                        phase = %phase,
                        quiet_secs = quiet_for.as_secs(),
                        output_bytes = bytes,
                        "agent output has not grown, it may be stuck"
                    );
                    summary.stale_warnings += 1;
                    last_stale_warning = Some(now);
                }

                let elapsed = now.duration_since(started);
                if !summary.timeout_warning_emitted && !warn_at.is_zero() && elapsed >= warn_at {
                    warn!(
                        phase = %phase,
                        elapsed_secs = elapsed.as_secs(),
                        timeout_secs = phase_timeout.as_secs(),
                        "phase is approaching its timeout"
                    );
                    summary.timeout_warning_emitted = true;
                }
            }

            summary.final_bytes = progress.bytes();
            summary
        });

        LivenessHandle { stop, task }
    }
}
