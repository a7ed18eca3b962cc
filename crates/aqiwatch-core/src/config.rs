// ── Runtime connection configuration ──
//
// These types describe *how* the ConnectionManager probes and reconnects.
// They carry tuning only and never touch disk: the binary builds them
// (usually through aqiwatch-config) and hands them in.

use std::time::Duration;

/// Backoff schedule for the owned retry task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry after a failure. Default: 1s.
    pub initial_delay: Duration,
    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,
    /// Liveness probe period while every channel is connected. Default: 30s.
    pub check_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            check_interval: Duration::from_secs(30),
        }
    }
}

/// Configuration for a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Upper bound on a single API health probe.
    pub health_timeout: Duration,
    /// How long the realtime channel may stay `Connecting` before it is
    /// declared failed with reason "timeout".
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            health_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(3),
            retry: RetryPolicy::default(),
        }
    }
}
