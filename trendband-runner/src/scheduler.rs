//! Fixed-interval ticker with cooperative cancellation.
//!
//! Replaces ad-hoc sleeps in the control loop. Tests run under a paused tokio
//! clock and drive ticks by advancing virtual time.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct Scheduler {
    interval: Interval,
    cancel: CancellationToken,
    ticks: u64,
    max_ticks: Option<u64>,
}

impl Scheduler {
    /// The first tick fires immediately; later ticks are `period` apart.
    /// Ticks missed while the caller was busy are delayed, not burst.
    pub fn new(period: Duration, cancel: CancellationToken) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now(), period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            cancel,
            ticks: 0,
            max_ticks: None,
        }
    }

    /// Stop after `n` ticks.
    pub fn with_limit(mut self, n: u64) -> Self {
        self.max_ticks = Some(n);
        self
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait for the next tick. Returns `None` once cancelled or the tick
    /// limit is reached.
    pub async fn tick(&mut self) -> Option<u64> {
        if self.cancel.is_cancelled() || self.max_ticks.is_some_and(|max| self.ticks >= max) {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            _ = self.interval.tick() => {
                self.ticks += 1;
                Some(self.ticks)
            }
        }
    }

    /// Sleep for `duration` unless cancelled first. Returns false on
    /// cancellation.
    pub async fn pause_for(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
