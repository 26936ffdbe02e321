//! Core data model: fixtures, events, updates.
//!
//! Plain `#[derive(Debug, Clone, Serialize, Deserialize)]` structs, no
//! behaviour beyond small constructors and classification helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One team's identity on a fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub logo: Option<String>,
    pub winner: Option<bool>,
}

/// Closed status enumeration. Any upstream value that doesn't
/// map to one of these is `Unknown`, with the original string preserved in
/// `Fixture::status_long`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixtureStatus {
    NotStarted,
    TimeToBeDefined,
    FirstHalf,
    Halftime,
    SecondHalf,
    ExtraTime,
    BreakTime,
    PenaltyShootout,
    LiveGeneric,
    Suspended,
    Interrupted,
    FullTime,
    AfterExtraTime,
    AfterPenalties,
    Postponed,
    Cancelled,
    Abandoned,
    TechnicalLoss,
    WalkOver,
    Unknown,
}

impl FixtureStatus {
    /// Parse the upstream's short status code. Unrecognized codes map to
    /// `Unknown`; the caller is responsible for keeping the verbatim string
    /// around as `status_long`.
    pub fn from_upstream_code(code: &str) -> Self {
        match code.to_uppercase().as_str() {
            "NS" => FixtureStatus::NotStarted,
            "TBD" => FixtureStatus::TimeToBeDefined,
            "1H" => FixtureStatus::FirstHalf,
            "HT" => FixtureStatus::Halftime,
            "2H" => FixtureStatus::SecondHalf,
            "ET" => FixtureStatus::ExtraTime,
            "BT" => FixtureStatus::BreakTime,
            "P" => FixtureStatus::PenaltyShootout,
            "LIVE" => FixtureStatus::LiveGeneric,
            "SUSP" => FixtureStatus::Suspended,
            "INT" => FixtureStatus::Interrupted,
            "FT" => FixtureStatus::FullTime,
            "AET" => FixtureStatus::AfterExtraTime,
            "PEN" => FixtureStatus::AfterPenalties,
            "PST" => FixtureStatus::Postponed,
            "CANC" => FixtureStatus::Cancelled,
            "ABD" => FixtureStatus::Abandoned,
            "AWD" => FixtureStatus::TechnicalLoss,
            "WO" => FixtureStatus::WalkOver,
            _ => FixtureStatus::Unknown,
        }
    }

    pub fn is_live(self) -> bool {
        matches!(
            self,
            FixtureStatus::FirstHalf
                | FixtureStatus::Halftime
                | FixtureStatus::SecondHalf
                | FixtureStatus::ExtraTime
                | FixtureStatus::BreakTime
                | FixtureStatus::PenaltyShootout
                | FixtureStatus::LiveGeneric
                | FixtureStatus::Suspended
                | FixtureStatus::Interrupted
        )
    }

    pub fn is_pre_live(self) -> bool {
        matches!(
            self,
            FixtureStatus::NotStarted | FixtureStatus::TimeToBeDefined
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FixtureStatus::FullTime
                | FixtureStatus::AfterExtraTime
                | FixtureStatus::AfterPenalties
                | FixtureStatus::Postponed
                | FixtureStatus::Cancelled
                | FixtureStatus::Abandoned
                | FixtureStatus::TechnicalLoss
                | FixtureStatus::WalkOver
        )
    }

    /// Short code as sent back on the wire / stored in SQLite.
    pub fn as_code(self) -> &'static str {
        match self {
            FixtureStatus::NotStarted => "NS",
            FixtureStatus::TimeToBeDefined => "TBD",
            FixtureStatus::FirstHalf => "1H",
            FixtureStatus::Halftime => "HT",
            FixtureStatus::SecondHalf => "2H",
            FixtureStatus::ExtraTime => "ET",
            FixtureStatus::BreakTime => "BT",
            FixtureStatus::PenaltyShootout => "P",
            FixtureStatus::LiveGeneric => "LIVE",
            FixtureStatus::Suspended => "SUSP",
            FixtureStatus::Interrupted => "INT",
            FixtureStatus::FullTime => "FT",
            FixtureStatus::AfterExtraTime => "AET",
            FixtureStatus::AfterPenalties => "PEN",
            FixtureStatus::Postponed => "PST",
            FixtureStatus::Cancelled => "CANC",
            FixtureStatus::Abandoned => "ABD",
            FixtureStatus::TechnicalLoss => "AWD",
            FixtureStatus::WalkOver => "WO",
            FixtureStatus::Unknown => "UNK",
        }
    }
}

/// The unit of scheduling and observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub api_fixture_id: i64,
    pub league_id: i64,
    pub season: i32,
    pub kickoff: DateTime<Utc>,
    pub status_short: FixtureStatus,
    /// Free-text mirror; for `Unknown` statuses this carries the upstream's
    /// verbatim value.
    pub status_long: String,
    pub elapsed_minutes: Option<i32>,
    pub home_team: Team,
    pub away_team: Team,
    pub home_goals: Option<i32>,
    pub away_goals: Option<i32>,
    pub halftime_home: Option<i32>,
    pub halftime_away: Option<i32>,
    pub fulltime_home: Option<i32>,
    pub fulltime_away: Option<i32>,
    pub period_first: Option<DateTime<Utc>>,
    pub period_second: Option<DateTime<Utc>>,
    pub venue: Option<String>,
    pub referee: Option<String>,
    /// Human-readable competition name, carried from the initial-sync
    /// config entry (`INIT_LEAGUES`) rather than the upstream
    /// provider. Poll-tick upserts that don't know it leave the
    /// previously stored value alone (see `FixtureRepository::upsert`).
    pub competition_name: Option<String>,
}

/// A discrete in-match occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureEvent {
    pub elapsed_minutes: i32,
    pub extra_minutes: Option<i32>,
    pub team_id: i64,
    pub player_id: Option<i64>,
    pub player_name: Option<String>,
    pub assist_id: Option<i64>,
    pub assist_name: Option<String>,
    pub kind: EventKind,
    pub detail: String,
    pub comments: Option<String>,
}

impl FixtureEvent {
    /// The identifying tuple: `(elapsed, extra, kind,
    /// detail, playerID)`. The upstream assigns no stable event IDs, so this
    /// tuple is the closest thing to one; it is at-most-once per fixture.
    pub fn identity(&self) -> (i32, Option<i32>, EventKind, &str, Option<i64>) {
        (
            self.elapsed_minutes,
            self.extra_minutes,
            self.kind,
            self.detail.as_str(),
            self.player_id,
        )
    }

    pub fn sort_key(&self) -> (i32, i32) {
        (self.elapsed_minutes, self.extra_minutes.unwrap_or(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Goal,
    Card,
    Substitution,
    Var,
    Other,
}

/// The closed set of update kinds the broadcaster emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateKind {
    MatchStarted,
    MatchFinished,
    Goal,
    MissedPenalty,
    YellowCard,
    RedCard,
    Card,
    Substitution,
    Var,
    StatusUpdate,
    TimeUpdate,
}

impl UpdateKind {
    /// The wire string representation — the enum is canonical internally,
    /// this is only stringified at the edge.
    pub fn as_wire_str(self) -> &'static str {
        match self {
            UpdateKind::MatchStarted => "match_started",
            UpdateKind::MatchFinished => "match_finished",
            UpdateKind::Goal => "goal",
            UpdateKind::MissedPenalty => "missed_penalty",
            UpdateKind::YellowCard => "yellow_card",
            UpdateKind::RedCard => "red_card",
            UpdateKind::Card => "card",
            UpdateKind::Substitution => "substitution",
            UpdateKind::Var => "var",
            UpdateKind::StatusUpdate => "status_update",
            UpdateKind::TimeUpdate => "time_update",
        }
    }
}

/// A materialized status record attached to every update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub short: FixtureStatus,
    pub long: String,
    pub elapsed_minutes: Option<i32>,
    pub extra_minutes: Option<i32>,
}

/// A broadcaster message sent to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub fixture_id: i64,
    pub emission_time: DateTime<Utc>,
    pub kind: UpdateKind,
    pub fixture: Fixture,
    pub status: StatusRecord,
    pub events: Vec<FixtureEvent>,
    pub triggering_event: Option<FixtureEvent>,
}

/// A single group/row in a league table, as returned by `GetStandings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingGroup {
    pub group_name: Option<String>,
    pub rows: Vec<StandingRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingRow {
    pub rank: i32,
    pub team: Team,
    pub points: i32,
    pub played: i32,
    pub won: i32,
    pub drawn: i32,
    pub lost: i32,
    pub goals_for: i32,
    pub goals_against: i32,
}
