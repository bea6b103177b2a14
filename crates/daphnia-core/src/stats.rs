//! Tick-rate and timing statistics.
//!
//! Timings accumulate over a window (one second by default). When the
//! window closes, the collector publishes ticks per second and the average
//! busy time per tick of the driver and of each worker.

use std::time::{Duration, Instant};

use daphnia_ether::PropagationStats;
use serde::Serialize;

/// Published statistics for the last closed window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickStatistics {
    /// Tick at which the window closed.
    pub tick: u64,
    /// Ticks per second over the window.
    pub fps: u64,
    /// Average driver busy time per tick, in nanoseconds.
    pub driver_tick_ns: u64,
    /// Average busy time per tick of each worker, in nanoseconds.
    pub worker_tick_ns: Vec<u64>,
    /// Propagation counters summed over the window.
    pub propagation: PropagationStats,
    /// Attached observers when the window closed.
    pub observers: usize,
}

/// Accumulates timings and rolls them into [`TickStatistics`].
#[derive(Debug)]
pub struct StatsCollector {
    interval: Duration,
    window_start: Instant,
    window_start_tick: u64,
    driver_ns: u64,
    worker_ns: Vec<u64>,
    propagation: PropagationStats,
    published: TickStatistics,
}

impl StatsCollector {
    /// A collector for `workers` workers rolling every `interval`.
    pub fn new(workers: usize, interval: Duration, start_tick: u64) -> Self {
        Self {
            interval,
            window_start: Instant::now(),
            window_start_tick: start_tick,
            driver_ns: 0,
            worker_ns: vec![0; workers],
            propagation: PropagationStats::default(),
            published: TickStatistics {
                worker_tick_ns: vec![0; workers],
                ..TickStatistics::default()
            },
        }
    }

    /// Add driver busy time.
    pub fn record_driver(&mut self, busy: Duration) {
        self.driver_ns = self.driver_ns.saturating_add(duration_ns(busy));
    }

    /// Add one worker's busy time and propagation counters.
    pub fn record_worker(&mut self, index: usize, busy_ns: u64, propagation: &PropagationStats) {
        if let Some(total) = self.worker_ns.get_mut(index) {
            *total = total.saturating_add(busy_ns);
        }
        self.propagation.merge(propagation);
    }

    /// Close the window if it has run for the interval.
    ///
    /// `tick` is the number of the next tick to run. Returns the published
    /// statistics when a window closed.
    pub fn roll(&mut self, tick: u64, observers: usize, now: Instant) -> Option<&TickStatistics> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }
        let ticks = tick.saturating_sub(self.window_start_tick);
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX).max(1);
        let per_tick = |total: u64| total.checked_div(ticks).unwrap_or(0);
        self.published = TickStatistics {
            tick,
            fps: ticks.saturating_mul(1000).checked_div(elapsed_ms).unwrap_or(0),
            driver_tick_ns: per_tick(self.driver_ns),
            worker_tick_ns: self.worker_ns.iter().copied().map(per_tick).collect(),
            propagation: self.propagation,
            observers,
        };
        self.window_start = now;
        self.window_start_tick = tick;
        self.driver_ns = 0;
        self.worker_ns.iter_mut().for_each(|ns| *ns = 0);
        self.propagation = PropagationStats::default();
        Some(&self.published)
    }

    /// Statistics of the last closed window.
    pub const fn current(&self) -> &TickStatistics {
        &self.published
    }
}

/// A duration in nanoseconds, saturating at `u64::MAX`.
pub fn duration_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn window_rolls_into_averages() {
        let start = Instant::now();
        let mut stats = StatsCollector::new(2, Duration::from_millis(1000), 0);
        for _ in 0..10 {
            stats.record_driver(Duration::from_nanos(300));
            stats.record_worker(0, 1000, &PropagationStats::default());
            stats.record_worker(1, 500, &PropagationStats { stepped: 2, ..PropagationStats::default() });
        }
        assert!(stats.roll(10, 1, start).is_none());

        let published = stats.roll(10, 1, start.checked_add(Duration::from_millis(2000)).unwrap()).unwrap().clone();
        assert_eq!(published.fps, 5);
        assert_eq!(published.driver_tick_ns, 300);
        assert_eq!(published.worker_tick_ns, vec![1000, 500]);
        assert_eq!(published.propagation.stepped, 20);
        assert_eq!(stats.current(), &published);
    }

    #[test]
    fn empty_window_publishes_zeros() {
        let start = Instant::now();
        let mut stats = StatsCollector::new(1, Duration::ZERO, 7);
        let published = stats.roll(7, 0, start).unwrap();
        assert_eq!(published.fps, 0);
        assert_eq!(published.worker_tick_ns, vec![0]);
    }

    #[test]
    fn out_of_range_worker_is_ignored() {
        let mut stats = StatsCollector::new(1, Duration::ZERO, 0);
        stats.record_worker(5, 1000, &PropagationStats::default());
        assert_eq!(stats.current().worker_tick_ns, vec![0]);
    }
}
