//! Last-interaction tracking for activity-gated background work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Shared timestamp of the most recent user interaction.
///
/// Owned by one engine instance and cloned into whoever needs it; the
/// presentation layer writes it, the poller only reads it. Time comes from
/// the tokio clock so paused-time tests can drive it.
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    inner: Arc<ActivityState>,
}

#[derive(Debug)]
struct ActivityState {
    origin: Instant,
    /// Microseconds after `origin`.
    last_activity_us: AtomicU64,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    /// A new tracker counts its own creation as activity.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ActivityState {
                origin: Instant::now(),
                last_activity_us: AtomicU64::new(0),
            }),
        }
    }

    /// Pointer, key, touch or scroll input, or a user-issued command.
    pub fn record_activity(&self) {
        let elapsed = Instant::now().saturating_duration_since(self.inner.origin);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.inner.last_activity_us.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn last_activity_at(&self) -> Instant {
        let micros = self.inner.last_activity_us.load(Ordering::Relaxed);
        self.inner.origin + Duration::from_micros(micros)
    }

    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_activity_at())
    }

    /// True while the last interaction is strictly less than `threshold` ago.
    pub fn is_active_within(&self, threshold: Duration) -> bool {
        self.idle_for() < threshold
    }
}
