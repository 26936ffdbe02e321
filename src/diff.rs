//! Stateless classification of what changed between two snapshots of the
//! same fixture.
//!
//! Pure functions only: no I/O, no shared state, easy to exhaustively unit
//! test.

use crate::model::{EventKind, Fixture, FixtureEvent, FixtureStatus, UpdateKind};

/// True if `before`/`after` or their event lists differ in any way the
/// broadcaster cares about: status, score, elapsed time, event-list
/// cardinality, or event-list set-membership (by
/// [`FixtureEvent::identity`]). Cardinality/membership are checked
/// directly here rather than left to [`new_events`], since a fixture
/// whose event count merely *decreases* (no new identity appears) would
/// otherwise go undetected.
pub fn has_significant_changes(
    before: &Fixture,
    after: &Fixture,
    prev_events: &[FixtureEvent],
    cur_events: &[FixtureEvent],
) -> bool {
    before.status_short != after.status_short
        || before.home_goals != after.home_goals
        || before.away_goals != after.away_goals
        || before.elapsed_minutes != after.elapsed_minutes
        || prev_events.len() != cur_events.len()
        || !events_sets_equal(prev_events, cur_events)
}

/// Whether two event lists contain the same set of identities, ignoring
/// order and duplicates.
fn events_sets_equal(a: &[FixtureEvent], b: &[FixtureEvent]) -> bool {
    a.iter().all(|e| b.iter().any(|o| o.identity() == e.identity()))
        && b.iter().all(|e| a.iter().any(|o| o.identity() == e.identity()))
}

/// The events present in `current` but absent from `previous`, identified
/// by [`FixtureEvent::identity`] rather than array position. Ordered by
/// [`FixtureEvent::sort_key`] ascending.
pub fn new_events(previous: &[FixtureEvent], current: &[FixtureEvent]) -> Vec<FixtureEvent> {
    let mut fresh: Vec<FixtureEvent> = current
        .iter()
        .filter(|candidate| !previous.iter().any(|seen| seen.identity() == candidate.identity()))
        .cloned()
        .collect();
    fresh.sort_by_key(|e| e.sort_key());
    fresh
}

/// Full ordered event list for a fixture, exposed verbatim to callers.
///
/// Despite the name this is not windowed to the last five minutes — the
/// upstream doesn't expose a stable enough ordering key to make a time
/// window meaningful, so the broadcaster hands clients the complete list
/// and lets them decide what's recent.
pub fn recent_events(events: &[FixtureEvent]) -> Vec<FixtureEvent> {
    let mut ordered = events.to_vec();
    ordered.sort_by_key(|e| e.sort_key());
    ordered
}

pub fn events_equal(a: &FixtureEvent, b: &FixtureEvent) -> bool {
    a.identity() == b.identity()
}

/// Priority-ordered classification of the dominant change between two
/// fixture snapshots, given any newly observed events.
///
/// Priority (highest first): match started/finished, goal, missed penalty,
/// red card, yellow card, other card, substitution, VAR, then a generic
/// status or time update. Only one [`UpdateKind`] is returned per tick —
/// the broadcaster is expected to call this once per significant change
/// and emit the remaining new events as part of the same `Update`'s event
/// list rather than as separate ticks.
pub fn detect_update_kind(
    before: &Fixture,
    after: &Fixture,
    fresh_events: &[FixtureEvent],
) -> UpdateKind {
    if before.status_short.is_pre_live() && after.status_short.is_live() {
        return UpdateKind::MatchStarted;
    }
    if !before.status_short.is_terminal() && after.status_short.is_terminal() {
        return UpdateKind::MatchFinished;
    }
    if before.home_goals != after.home_goals || before.away_goals != after.away_goals {
        return UpdateKind::Goal;
    }
    if let Some(event) = fresh_events.iter().find(|e| is_missed_penalty(e)) {
        let _ = event;
        return UpdateKind::MissedPenalty;
    }
    if fresh_events.iter().any(|e| e.kind == EventKind::Card && is_red_card(e)) {
        return UpdateKind::RedCard;
    }
    if fresh_events.iter().any(|e| e.kind == EventKind::Card && is_yellow_card(e)) {
        return UpdateKind::YellowCard;
    }
    if fresh_events.iter().any(|e| e.kind == EventKind::Card) {
        return UpdateKind::Card;
    }
    if fresh_events.iter().any(|e| e.kind == EventKind::Substitution) {
        return UpdateKind::Substitution;
    }
    if fresh_events.iter().any(|e| e.kind == EventKind::Var) {
        return UpdateKind::Var;
    }
    if before.status_short != after.status_short {
        return UpdateKind::StatusUpdate;
    }
    UpdateKind::TimeUpdate
}

fn is_missed_penalty(event: &FixtureEvent) -> bool {
    event.kind == EventKind::Goal && event.detail.to_lowercase().contains("missed")
}

fn is_red_card(event: &FixtureEvent) -> bool {
    let detail = event.detail.to_lowercase();
    detail.contains("red") || detail.contains("second yellow")
}

fn is_yellow_card(event: &FixtureEvent) -> bool {
    event.detail.to_lowercase().contains("yellow")
}

/// Whether `status` on its own warrants a `match_started`/`match_finished`
/// reclassification, independent of goal/card changes. Exposed for callers
/// that already know the transition is status-only (e.g. promotion from
/// the scheduler) and don't want to run the full priority chain.
pub fn is_kickoff_transition(before: FixtureStatus, after: FixtureStatus) -> bool {
    before.is_pre_live() && after.is_live()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::model::Team;

    fn base_fixture(status: FixtureStatus, home_goals: i32, away_goals: i32) -> Fixture {
        Fixture {
            api_fixture_id: 1,
            league_id: 6,
            season: 2025,
            kickoff: Utc::now(),
            status_short: status,
            status_long: "x".to_string(),
            elapsed_minutes: Some(10),
            home_team: Team { id: 1, name: "Home".to_string(), logo: None, winner: None },
            away_team: Team { id: 2, name: "Away".to_string(), logo: None, winner: None },
            home_goals: Some(home_goals),
            away_goals: Some(away_goals),
            halftime_home: None,
            halftime_away: None,
            fulltime_home: None,
            fulltime_away: None,
            period_first: None,
            period_second: None,
            venue: None,
            referee: None,
            competition_name: None,
        }
    }

    fn goal_event(elapsed: i32) -> FixtureEvent {
        FixtureEvent {
            elapsed_minutes: elapsed,
            extra_minutes: None,
            team_id: 1,
            player_id: Some(99),
            player_name: Some("Scorer".to_string()),
            assist_id: None,
            assist_name: None,
            kind: EventKind::Goal,
            detail: "Normal Goal".to_string(),
            comments: None,
        }
    }

    #[test]
    fn no_change_yields_no_significant_changes() {
        let before = base_fixture(FixtureStatus::FirstHalf, 0, 0);
        let after = before.clone();
        assert!(!has_significant_changes(&before, &after, &[], &[]));
    }

    #[test]
    fn goal_scored_is_significant_and_classified_as_goal() {
        let before = base_fixture(FixtureStatus::FirstHalf, 0, 0);
        let after = base_fixture(FixtureStatus::FirstHalf, 1, 0);
        assert!(has_significant_changes(&before, &after, &[], &[]));
        assert_eq!(detect_update_kind(&before, &after, &[]), UpdateKind::Goal);
    }

    #[test]
    fn event_cardinality_decrease_with_no_new_identity_is_significant() {
        let before = base_fixture(FixtureStatus::SecondHalf, 1, 0);
        let after = before.clone();
        let prev_events = vec![goal_event(10), goal_event(40)];
        let cur_events = vec![goal_event(10)];
        assert!(has_significant_changes(&before, &after, &prev_events, &cur_events));
    }

    #[test]
    fn event_set_membership_change_with_equal_cardinality_is_significant() {
        let before = base_fixture(FixtureStatus::SecondHalf, 1, 0);
        let after = before.clone();
        let prev_events = vec![goal_event(10)];
        let cur_events = vec![goal_event(40)];
        assert!(has_significant_changes(&before, &after, &prev_events, &cur_events));
    }

    #[test]
    fn kickoff_transition_detected_as_match_started() {
        let before = base_fixture(FixtureStatus::NotStarted, 0, 0);
        let after = base_fixture(FixtureStatus::FirstHalf, 0, 0);
        assert_eq!(detect_update_kind(&before, &after, &[]), UpdateKind::MatchStarted);
    }

    #[test]
    fn terminal_transition_detected_as_match_finished_even_with_status_change() {
        let before = base_fixture(FixtureStatus::SecondHalf, 2, 1);
        let after = base_fixture(FixtureStatus::FullTime, 2, 1);
        assert_eq!(detect_update_kind(&before, &after, &[]), UpdateKind::MatchFinished);
    }

    #[test]
    fn red_card_outranks_generic_card_classification() {
        let before = base_fixture(FixtureStatus::SecondHalf, 0, 0);
        let after = before.clone();
        let event = FixtureEvent {
            detail: "Red Card".to_string(),
            kind: EventKind::Card,
            ..goal_event(55)
        };
        assert_eq!(detect_update_kind(&before, &after, &[event]), UpdateKind::RedCard);
    }

    #[test]
    fn second_yellow_detail_is_classified_as_red_card() {
        let before = base_fixture(FixtureStatus::SecondHalf, 0, 0);
        let after = before.clone();
        let event = FixtureEvent {
            detail: "Second Yellow card".to_string(),
            kind: EventKind::Card,
            ..goal_event(60)
        };
        assert_eq!(detect_update_kind(&before, &after, &[event]), UpdateKind::RedCard);
    }

    #[test]
    fn new_events_filters_by_identity_not_position() {
        let previous = vec![goal_event(10)];
        let mut current = previous.clone();
        current.push(goal_event(40));
        let fresh = new_events(&previous, &current);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].elapsed_minutes, 40);
    }

    #[test]
    fn recent_events_orders_by_sort_key() {
        let events = vec![goal_event(40), goal_event(10)];
        let ordered = recent_events(&events);
        assert_eq!(ordered[0].elapsed_minutes, 10);
        assert_eq!(ordered[1].elapsed_minutes, 40);
    }

    #[test]
    fn time_update_is_the_fallback_classification() {
        let before = base_fixture(FixtureStatus::FirstHalf, 0, 0);
        let mut after = before.clone();
        after.elapsed_minutes = Some(15);
        assert_eq!(detect_update_kind(&before, &after, &[]), UpdateKind::TimeUpdate);
    }
}
