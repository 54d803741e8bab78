//! Poll scheduling for the control loop
//!
//! Two fixed intervals: fast (5 minutes) while actively deciding or charging,
//! slow (1 hour) in the low-charge backoff state. No exponential backoff, no
//! jitter. The clock is a trait so tests can observe waits without sleeping.

use async_trait::async_trait;
use std::time::Duration;

/// Fast interval used while actively deciding or charging
pub const FAST_INTERVAL: Duration = Duration::from_secs(300);

/// Slow interval used only in the low-charge backoff state
pub const SLOW_INTERVAL: Duration = Duration::from_secs(3600);

/// Which of the two fixed intervals to wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollInterval {
    Fast,
    Slow,
}

impl PollInterval {
    pub fn duration(self) -> Duration {
        match self {
            Self::Fast => FAST_INTERVAL,
            Self::Slow => SLOW_INTERVAL,
        }
    }
}

/// Injectable clock so tests can simulate the passage of time
#[async_trait]
pub trait Clock: Send {
    async fn sleep(&mut self, duration: Duration);
}

/// Clock backed by the tokio timer
#[derive(Debug, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Drives the control loop on a fixed cadence
pub struct PollScheduler<C: Clock> {
    clock: C,
}

impl<C: Clock> PollScheduler<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    /// Wait out one poll interval
    pub async fn wait(&mut self, interval: PollInterval) {
        self.clock.sleep(interval.duration()).await;
    }
}

impl Default for PollScheduler<TokioClock> {
    fn default() -> Self {
        Self::new(TokioClock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingClock {
        slept: Vec<Duration>,
    }

    #[async_trait]
    impl Clock for RecordingClock {
        async fn sleep(&mut self, duration: Duration) {
            self.slept.push(duration);
        }
    }

    #[test]
    fn test_interval_durations() {
        assert_eq!(PollInterval::Fast.duration(), Duration::from_secs(300));
        assert_eq!(PollInterval::Slow.duration(), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_scheduler_waits_requested_interval() {
        let mut scheduler = PollScheduler::new(RecordingClock { slept: Vec::new() });
        scheduler.wait(PollInterval::Fast).await;
        scheduler.wait(PollInterval::Slow).await;
        scheduler.wait(PollInterval::Fast).await;
        assert_eq!(
            scheduler.clock.slept,
            vec![FAST_INTERVAL, SLOW_INTERVAL, FAST_INTERVAL]
        );
    }
}
