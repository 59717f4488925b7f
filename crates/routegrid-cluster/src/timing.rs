//! Heartbeat cadence derived from configured settings.
//!
//! The configured interval is clamped to [`UPDATE_FLOOR`] and then jittered so
//! nodes started together drift apart. The eviction timeout is always kept
//! strictly looser than the effective interval, otherwise a node could evict
//! itself through ordinary scheduling delay.

use std::time::Duration;

use rand::Rng;
use routegrid_core::CoordinatorSettings;

/// No node heartbeats more often than this, whatever the configuration says.
pub const UPDATE_FLOOR: Duration = Duration::from_secs(30);

/// Jitter range added to the interval and to a bumped timeout.
pub const JITTER_MIN: Duration = Duration::from_secs(1);
pub const JITTER_MAX: Duration = Duration::from_secs(5);

/// Draw a duration uniformly from `[min, max]` at millisecond granularity.
///
/// Returns `min` when the range is empty.
pub fn jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let lo = min.as_millis() as u64;
    let hi = max.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

/// Effective parameters the heartbeat loop runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub update_interval: Duration,
    pub timeout_threshold: Duration,
}

impl Timing {
    pub fn derive(settings: &CoordinatorSettings) -> Self {
        Self::derive_with(settings, || jitter(JITTER_MIN, JITTER_MAX))
    }

    /// Like [`Timing::derive`] with a caller-supplied jitter source.
    pub fn derive_with(
        settings: &CoordinatorSettings,
        mut jitter: impl FnMut() -> Duration,
    ) -> Self {
        let update_interval = settings.update_interval.max(UPDATE_FLOOR) + jitter();
        let timeout_threshold = if settings.timeout_threshold > update_interval {
            settings.timeout_threshold
        } else {
            update_interval + jitter()
        };
        Self {
            update_interval,
            timeout_threshold,
        }
    }

    pub fn timeout_millis(&self) -> u64 {
        self.timeout_threshold.as_millis() as u64
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::derive_with(&CoordinatorSettings::default(), || JITTER_MIN)
    }
}
