use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Deserialize};
use tracing::{info, warn};

/// Daily image-generation budget, in dollars.
pub const DAILY_BUDGET: f64 = 0.50;

const QUOTA_RESET_HOURS: i64 = 24;

#[derive(Debug, Default)]
struct UsageState {
    day: Option<NaiveDate>,
    images_today: u32,
    posts_today: u32,
    cost_today: f64,
    total_cost: f64,
    quota_exhausted_at: Option<DateTime<Utc>>,
}

impl UsageState {
    fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.day != Some(today) {
            self.day = Some(today);
            self.images_today = 0;
            self.posts_today = 0;
            self.cost_today = 0.0;
        }
    }
}

/// Shared usage/cost counters and the caption quota circuit-breaker.
///
/// Injected into the orchestrators that need it instead of living as a
/// process-wide global, so concurrent sessions never share a hidden flag.
#[derive(Debug, Default)]
pub struct UsageTracker {
    state: Mutex<UsageState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub daily_budget: f64,
    pub images_today: u32,
    pub posts_today: u32,
    pub cost_today: f64,
    pub total_cost: f64,
    pub remaining: f64,
    pub quota_exhausted: bool,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_images(&self, count: u32, cost: f64) {
        self.record_images_at(count, cost, Utc::now());
    }

    pub fn record_images_at(&self, count: u32, cost: f64, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.roll_day(now);
        state.images_today += count;
        state.cost_today += cost;
        state.total_cost += cost;
    }

    pub fn record_post(&self) {
        let mut state = self.state.lock();
        state.roll_day(Utc::now());
        state.posts_today += 1;
    }

    pub fn mark_quota_exhausted(&self) {
        self.mark_quota_exhausted_at(Utc::now());
    }

    pub fn mark_quota_exhausted_at(&self, now: DateTime<Utc>) {
        warn!("⚠️ Caption API quota exhausted, switching to fallback captions for the next 24 hours");
        self.state.lock().quota_exhausted_at = Some(now);
    }

    pub fn is_quota_exhausted(&self) -> bool {
        self.is_quota_exhausted_at(Utc::now())
    }

    /// Quota resets daily; the flag clears itself 24 hours after being set.
    pub fn is_quota_exhausted_at(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        match state.quota_exhausted_at {
            Some(at) if now - at > Duration::hours(QUOTA_RESET_HOURS) => {
                state.quota_exhausted_at = None;
                info!("Quota exhaustion flag reset");
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> UsageSnapshot {
        let quota_exhausted = self.is_quota_exhausted_at(now);
        let mut state = self.state.lock();
        state.roll_day(now);
        UsageSnapshot {
            daily_budget: DAILY_BUDGET,
            images_today: state.images_today,
            posts_today: state.posts_today,
            cost_today: state.cost_today,
            total_cost: state.total_cost,
            remaining: DAILY_BUDGET - state.cost_today,
            quota_exhausted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn quota_flag_holds_within_24_hours_and_resets_after() {
        let tracker = UsageTracker::new();
        assert!(!tracker.is_quota_exhausted_at(at(0)));

        tracker.mark_quota_exhausted_at(at(0));
        assert!(tracker.is_quota_exhausted_at(at(1)));
        assert!(tracker.is_quota_exhausted_at(at(23)));

        let next_day = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 1).unwrap();
        assert!(!tracker.is_quota_exhausted_at(next_day));
        // Cleared, not just hidden.
        assert!(!tracker.is_quota_exhausted_at(at(1)));
    }

    #[test]
    fn counters_roll_over_at_day_boundary() {
        let tracker = UsageTracker::new();
        tracker.record_images_at(1, 0.05, at(9));
        tracker.record_images_at(16, 0.80, at(10));

        let snap = tracker.snapshot_at(at(11));
        assert_eq!(snap.images_today, 17);
        assert!((snap.cost_today - 0.85).abs() < 1e-9);

        let next_day = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        tracker.record_images_at(1, 0.05, next_day);
        let snap = tracker.snapshot_at(next_day);
        assert_eq!(snap.images_today, 1);
        assert!((snap.total_cost - 0.90).abs() < 1e-9);
        assert!((snap.remaining - (DAILY_BUDGET - 0.05)).abs() < 1e-9);
    }
}
