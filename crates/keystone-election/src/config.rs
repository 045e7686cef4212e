//! Election tuning knobs.

use std::time::Duration;

/// Configuration for the election core.
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    /// Initial (and floor) timeout when polling for notifications.
    pub min_notification_interval: Duration,
    /// Ceiling for the exponential poll backoff. Bounds how long a
    /// partitioned peer waits before probing the ensemble again.
    pub max_notification_interval: Duration,
    /// Grace period after reaching quorum during which a strictly better
    /// vote can still preempt the commit.
    pub finalize_wait: Duration,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            min_notification_interval: Duration::from_millis(200),
            max_notification_interval: Duration::from_secs(60),
            finalize_wait: Duration::from_millis(200),
        }
    }
}
