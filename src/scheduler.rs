//! Adaptive poll cadence.
//!
//! A single pure function, deliberately kept free of any I/O or shared
//! state — the broadcaster's poller loop calls it once per tick and
//! `tokio::time::sleep`s for the returned duration.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Tunable boundaries, exposed as configuration rather than hard-coded so
/// an operator can retune cadence without a rebuild.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerBounds {
    /// Sleep while one or more fixtures in this topic are live, or while paused.
    pub live_poll_interval: Duration,
    /// `nextKickoff - now > 24h`.
    pub far_interval: Duration,
    /// `nextKickoff - now > 6h`.
    pub medium_interval: Duration,
    /// `nextKickoff - now > 1h`.
    pub near_interval: Duration,
    /// `nextKickoff - now > 10min`.
    pub imminent_interval: Duration,
    /// `nextKickoff` unknown.
    pub unknown_kickoff_interval: Duration,
    /// Minutes after halftime entry the second half is expected to resume.
    pub halftime_resume_minutes: i64,
    /// Lead time subtracted from the halftime resume estimate.
    pub halftime_lead_seconds: i64,
}

impl Default for SchedulerBounds {
    fn default() -> Self {
        SchedulerBounds {
            live_poll_interval: Duration::from_secs(15),
            far_interval: Duration::from_secs(12 * 3600),
            medium_interval: Duration::from_secs(3 * 3600),
            near_interval: Duration::from_secs(30 * 60),
            imminent_interval: Duration::from_secs(5 * 60),
            unknown_kickoff_interval: Duration::from_secs(24 * 3600),
            halftime_resume_minutes: 14,
            halftime_lead_seconds: 30,
        }
    }
}

/// Compute how long the poller should sleep before its next tick, from a
/// boundary table keyed on time-to-kickoff plus a halftime de-synchronization
/// rule.
///
/// `is_paused` takes priority over everything but is otherwise identical
/// to a "minimal pulse": both sleep at `live_poll_interval` so a paused
/// topic still wakes promptly once unpaused.
///
/// `halftime_entered_at` is `Some` when any observed live fixture is
/// currently in `Halftime`, carrying the instant that status was first
/// observed; when present it overrides the plain live-count rule, sleeping
/// until shortly before the second half is expected to resume rather than
/// polling at the tight live interval the whole break.
pub fn next_sleep(
    bounds: &SchedulerBounds,
    is_paused: bool,
    live_count: usize,
    halftime_entered_at: Option<DateTime<Utc>>,
    next_kickoff: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Duration {
    if is_paused {
        return bounds.live_poll_interval;
    }

    if live_count > 0 {
        if let Some(entered_at) = halftime_entered_at {
            let resume_at = entered_at
                + chrono::Duration::minutes(bounds.halftime_resume_minutes)
                - chrono::Duration::seconds(bounds.halftime_lead_seconds);
            let until_resume = resume_at.signed_duration_since(now);
            if let Ok(std_until) = until_resume.to_std() {
                return std_until.max(bounds.live_poll_interval);
            }
            // Computed wake time already passed; fall back to the plain
            // live-count rule below.
        }
        return bounds.live_poll_interval;
    }

    let Some(kickoff) = next_kickoff else {
        return bounds.unknown_kickoff_interval;
    };

    let until_kickoff = kickoff.signed_duration_since(now);
    if until_kickoff > chrono::Duration::hours(24) {
        bounds.far_interval
    } else if until_kickoff > chrono::Duration::hours(6) {
        bounds.medium_interval
    } else if until_kickoff > chrono::Duration::hours(1) {
        bounds.near_interval
    } else if until_kickoff > chrono::Duration::minutes(10) {
        bounds.imminent_interval
    } else {
        // Covers both "kickoff is within the next 10 minutes" and "kickoff
        // has already passed without the fixture being promoted to live
        // yet" — both want the tight interval to catch the transition.
        bounds.live_poll_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn paused_topic_sleeps_the_live_interval() {
        let bounds = SchedulerBounds::default();
        let now = Utc::now();
        let sleep = next_sleep(&bounds, true, 3, None, None, now);
        assert_eq!(sleep, bounds.live_poll_interval);
    }

    #[test]
    fn live_fixtures_poll_at_live_interval() {
        let bounds = SchedulerBounds::default();
        let now = Utc::now();
        let sleep = next_sleep(&bounds, false, 1, None, None, now);
        assert_eq!(sleep, bounds.live_poll_interval);
    }

    #[test]
    fn halftime_sleeps_until_fourteen_minutes_after_entry_minus_thirty_seconds() {
        let bounds = SchedulerBounds::default();
        let now = Utc::now();
        let entered_at = now;
        let sleep = next_sleep(&bounds, false, 1, Some(entered_at), None, now);
        assert_eq!(sleep, Duration::from_secs(13 * 60 + 30));
    }

    #[test]
    fn halftime_already_past_resume_falls_back_to_live_interval() {
        let bounds = SchedulerBounds::default();
        let now = Utc::now();
        let entered_at = now - ChronoDuration::minutes(20);
        let sleep = next_sleep(&bounds, false, 1, Some(entered_at), None, now);
        assert_eq!(sleep, bounds.live_poll_interval);
    }

    #[test]
    fn idle_with_no_known_kickoff_sleeps_the_unknown_interval() {
        let bounds = SchedulerBounds::default();
        let now = Utc::now();
        let sleep = next_sleep(&bounds, false, 0, None, None, now);
        assert_eq!(sleep, bounds.unknown_kickoff_interval);
    }

    #[test]
    fn idle_with_kickoff_two_days_out_sleeps_twelve_hours() {
        let bounds = SchedulerBounds::default();
        let now = Utc::now();
        let kickoff = now + ChronoDuration::days(2);
        let sleep = next_sleep(&bounds, false, 0, None, Some(kickoff), now);
        assert_eq!(sleep, bounds.far_interval);
    }

    #[test]
    fn idle_with_kickoff_ten_hours_out_sleeps_three_hours() {
        let bounds = SchedulerBounds::default();
        let now = Utc::now();
        let kickoff = now + ChronoDuration::hours(10);
        let sleep = next_sleep(&bounds, false, 0, None, Some(kickoff), now);
        assert_eq!(sleep, bounds.medium_interval);
    }

    #[test]
    fn idle_with_kickoff_three_hours_out_sleeps_thirty_minutes() {
        let bounds = SchedulerBounds::default();
        let now = Utc::now();
        let kickoff = now + ChronoDuration::hours(3);
        let sleep = next_sleep(&bounds, false, 0, None, Some(kickoff), now);
        assert_eq!(sleep, bounds.near_interval);
    }

    #[test]
    fn idle_with_kickoff_thirty_minutes_out_sleeps_five_minutes() {
        let bounds = SchedulerBounds::default();
        let now = Utc::now();
        let kickoff = now + ChronoDuration::minutes(30);
        let sleep = next_sleep(&bounds, false, 0, None, Some(kickoff), now);
        assert_eq!(sleep, bounds.imminent_interval);
    }

    #[test]
    fn idle_with_kickoff_inside_ten_minutes_polls_tight() {
        let bounds = SchedulerBounds::default();
        let now = Utc::now();
        let kickoff = now + ChronoDuration::minutes(2);
        let sleep = next_sleep(&bounds, false, 0, None, Some(kickoff), now);
        assert_eq!(sleep, bounds.live_poll_interval);
    }

    #[test]
    fn kickoff_already_passed_without_promotion_polls_tight() {
        let bounds = SchedulerBounds::default();
        let now = Utc::now();
        let kickoff = now - ChronoDuration::minutes(1);
        let sleep = next_sleep(&bounds, false, 0, None, Some(kickoff), now);
        assert_eq!(sleep, bounds.live_poll_interval);
    }
}
