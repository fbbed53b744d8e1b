//! Configuration for the shard router and its health monitor.

use std::time::Duration;

/// Configuration for [`crate::ShardRouter`].
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Interval slept after each health-check phase.
    ///
    /// One full monitor cycle (check active, sleep, check removed, sleep)
    /// spans two of these intervals, so both demotion and promotion
    /// detection latency are bounded by one full cycle.
    pub check_interval: Duration,

    /// Upper bound on a single liveness probe, including client handle
    /// acquisition. An elapsed timeout counts as a failed probe.
    pub probe_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl RouterConfig {
    /// Create a configuration with the default intervals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sleep interval between health-check phases.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Set the per-probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}
