//! [`FreshnessPolicy`] – age check for the control cycle's two inputs.
//!
//! Odometry and the controller's input data set arrive asynchronously.  Each
//! cycle asks the policy whether the latest sample is still recent enough to
//! act on; if not, the derived outputs that depend on it are held.

use std::time::{Duration, Instant};

/// Classification of the newest sample of a data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleHealth {
    /// Received within the timeout.
    Fresh,
    /// Received, but longer ago than the timeout.
    Stale,
    /// Nothing received yet.
    Missing,
}

impl SampleHealth {
    pub fn is_fresh(self) -> bool {
        self == SampleHealth::Fresh
    }
}

/// Maximum tolerated age for one data stream.
///
/// # Example
///
/// ```
/// use std::time::{Duration, Instant};
/// use flexigate_kernel::freshness::{FreshnessPolicy, SampleHealth};
///
/// let policy = FreshnessPolicy::new(Duration::from_millis(250));
/// let now = Instant::now();
/// assert_eq!(policy.classify(None, now), SampleHealth::Missing);
/// assert_eq!(policy.classify(Some(now), now), SampleHealth::Fresh);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    timeout: Duration,
}

impl FreshnessPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Classify a sample received at `received_at` as seen at `now`.
    ///
    /// A sample exactly `timeout` old is still fresh.  A receive instant in
    /// the future of `now` counts as age zero.
    pub fn classify(&self, received_at: Option<Instant>, now: Instant) -> SampleHealth {
        match received_at {
            None => SampleHealth::Missing,
            Some(at) if now.saturating_duration_since(at) <= self.timeout => SampleHealth::Fresh,
            Some(_) => SampleHealth::Stale,
        }
    }
}
