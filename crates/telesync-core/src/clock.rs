// ── Receipt clock ──
//
// Wall-clock timestamps derived from tokio's monotonic clock. One anchor
// is taken at construction; everything after is anchor + elapsed, so
// receipt times never run backwards and follow paused time in tests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Stand-in for "never" when a wall time is beyond `Instant`'s range.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Source of `observed_at` timestamps.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    anchor_wall: DateTime<Utc>,
    anchor_instant: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    /// A clock whose "now" is `wall` at the current tokio instant.
    pub fn anchored_at(wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall: wall,
            anchor_instant: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.wall_at(Instant::now())
    }

    /// Wall time corresponding to a tokio instant.
    pub fn wall_at(&self, instant: Instant) -> DateTime<Utc> {
        let elapsed = instant.saturating_duration_since(self.anchor_instant);
        chrono::Duration::from_std(elapsed)
            .ok()
            .and_then(|d| self.anchor_wall.checked_add_signed(d))
            .unwrap_or(self.anchor_wall)
    }

    /// Tokio instant corresponding to a wall time. Times before the anchor
    /// clamp to the anchor.
    pub fn instant_at(&self, wall: DateTime<Utc>) -> Instant {
        let offset = (wall - self.anchor_wall).to_std().unwrap_or(Duration::ZERO);
        self.anchor_instant
            .checked_add(offset)
            .unwrap_or_else(|| self.anchor_instant + FAR_FUTURE)
    }

    pub fn anchor_wall(&self) -> DateTime<Utc> {
        self.anchor_wall
    }

    /// Age of a wall timestamp relative to now. Future timestamps are zero.
    pub fn age_of(&self, wall: DateTime<Utc>) -> Duration {
        (self.now() - wall).to_std().unwrap_or(Duration::ZERO)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn follows_tokio_time() {
        let t0 = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
        let clock = Clock::anchored_at(t0);
        assert_eq!(clock.now(), t0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(clock.now(), t0 + chrono::Duration::seconds(31));
        assert_eq!(clock.age_of(t0), Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn instant_round_trip() {
        let t0 = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
        let clock = Clock::anchored_at(t0);
        let later = t0 + chrono::Duration::seconds(20);

        let deadline = clock.instant_at(later);
        assert_eq!(clock.wall_at(deadline), later);

        // Before the anchor clamps.
        let earlier = t0 - chrono::Duration::seconds(5);
        assert_eq!(clock.wall_at(clock.instant_at(earlier)), t0);
    }
}
