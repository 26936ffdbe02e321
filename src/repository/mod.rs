//! Authoritative persistence for fixtures.
//!
//! A single SQLite connection behind `Arc<Mutex<Connection>>`, idempotent
//! schema creation on open, and a set of narrow methods instead of a
//! general query surface.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{info, warn};

use crate::error::CoreError;
use crate::model::{Fixture, FixtureStatus, Team};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS fixtures (
    api_fixture_id   INTEGER PRIMARY KEY,
    league_id        INTEGER NOT NULL,
    season           INTEGER NOT NULL,
    kickoff          TEXT NOT NULL,
    status_short     TEXT NOT NULL,
    status_long      TEXT NOT NULL,
    elapsed_minutes  INTEGER,
    home_team_id     INTEGER NOT NULL,
    home_team_name   TEXT NOT NULL,
    home_team_logo   TEXT,
    away_team_id     INTEGER NOT NULL,
    away_team_name   TEXT NOT NULL,
    away_team_logo   TEXT,
    home_goals       INTEGER,
    away_goals       INTEGER,
    halftime_home    INTEGER,
    halftime_away    INTEGER,
    fulltime_home    INTEGER,
    fulltime_away    INTEGER,
    period_first     INTEGER,
    period_second    INTEGER,
    venue            TEXT,
    referee          TEXT,
    competition_name TEXT,
    updated_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fixtures_league_season_kickoff
    ON fixtures (league_id, season, kickoff);

CREATE INDEX IF NOT EXISTS idx_fixtures_kickoff
    ON fixtures (kickoff);
"#;

/// The authoritative fixture store.
///
/// Uses a single connection behind a mutex rather than a pool: writes here
/// are low-frequency (one upsert per fixture per poll tick) and rusqlite's
/// `Connection` is `!Sync`, so a mutex is the simplest correct answer.
#[derive(Clone)]
pub struct FixtureRepository {
    conn: Arc<Mutex<Connection>>,
}

impl FixtureRepository {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        info!("Opened fixture repository at {}", path.display());
        Ok(FixtureRepository {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(FixtureRepository {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert-or-update a single fixture.
    ///
    /// Enforces the invariant that `apiFixtureID`, `leagueID`, `season`,
    /// and `kickoff` never change across an update to an existing row,
    /// and a write that would move a fixture from a
    /// terminal status back to a live/pre-live one is rejected as a
    /// [`CoreError::WriteConflict`] rather than silently applied.
    pub fn upsert(&self, fixture: &Fixture) -> Result<(), CoreError> {
        let conn = self.conn.lock().expect("repository mutex poisoned");

        let existing = fetch_immutable_fields(&conn, fixture.api_fixture_id)
            .map_err(|e| CoreError::RepositoryTransient(e.to_string()))?;

        if let Some((league_id, season, kickoff, status_short)) = existing {
            if league_id != fixture.league_id || season != fixture.season {
                return Err(CoreError::WriteConflict {
                    fixture_id: fixture.api_fixture_id,
                    reason: "leagueID/season changed on an existing fixture".to_string(),
                });
            }
            // Kickoff may still shift while the fixture is pre-live (a
            // legitimate reschedule); once it has entered a live state the
            // kickoff instant is immutable.
            if kickoff != fixture.kickoff && !status_short.is_pre_live() {
                return Err(CoreError::WriteConflict {
                    fixture_id: fixture.api_fixture_id,
                    reason: "kickoff changed on a fixture that has left pre-live states".to_string(),
                });
            }
            if status_short.is_terminal() && !fixture.status_short.is_terminal() {
                return Err(CoreError::WriteConflict {
                    fixture_id: fixture.api_fixture_id,
                    reason: format!(
                        "refusing to regress terminal status {} to {}",
                        status_short.as_code(),
                        fixture.status_short.as_code()
                    ),
                });
            }
        }

        let now = Utc::now();
        conn.execute(
            r#"
            INSERT INTO fixtures (
                api_fixture_id, league_id, season, kickoff, status_short, status_long,
                elapsed_minutes, home_team_id, home_team_name, home_team_logo,
                away_team_id, away_team_name, away_team_logo,
                home_goals, away_goals, halftime_home, halftime_away,
                fulltime_home, fulltime_away, period_first, period_second,
                venue, referee, competition_name, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25
            )
            ON CONFLICT(api_fixture_id) DO UPDATE SET
                kickoff = excluded.kickoff,
                status_short = excluded.status_short,
                status_long = excluded.status_long,
                elapsed_minutes = excluded.elapsed_minutes,
                home_team_name = excluded.home_team_name,
                home_team_logo = excluded.home_team_logo,
                away_team_name = excluded.away_team_name,
                away_team_logo = excluded.away_team_logo,
                home_goals = excluded.home_goals,
                away_goals = excluded.away_goals,
                halftime_home = excluded.halftime_home,
                halftime_away = excluded.halftime_away,
                fulltime_home = excluded.fulltime_home,
                fulltime_away = excluded.fulltime_away,
                period_first = excluded.period_first,
                period_second = excluded.period_second,
                venue = excluded.venue,
                referee = excluded.referee,
                competition_name = COALESCE(excluded.competition_name, fixtures.competition_name),
                updated_at = excluded.updated_at
            "#,
            params![
                fixture.api_fixture_id,
                fixture.league_id,
                fixture.season,
                fixture.kickoff.to_rfc3339(),
                fixture.status_short.as_code(),
                fixture.status_long,
                fixture.elapsed_minutes,
                fixture.home_team.id,
                fixture.home_team.name,
                fixture.home_team.logo,
                fixture.away_team.id,
                fixture.away_team.name,
                fixture.away_team.logo,
                fixture.home_goals,
                fixture.away_goals,
                fixture.halftime_home,
                fixture.halftime_away,
                fixture.fulltime_home,
                fixture.fulltime_away,
                fixture.period_first.map(|t| t.timestamp()),
                fixture.period_second.map(|t| t.timestamp()),
                fixture.venue,
                fixture.referee,
                fixture.competition_name,
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| CoreError::RepositoryTransient(e.to_string()))?;

        Ok(())
    }

    /// Upsert many fixtures, skipping (and logging) any individual conflict
    /// rather than aborting the whole batch.
    pub fn upsert_batch(&self, fixtures: &[Fixture]) -> Result<usize, CoreError> {
        let mut applied = 0;
        for fixture in fixtures {
            match self.upsert(fixture) {
                Ok(()) => applied += 1,
                Err(CoreError::WriteConflict { fixture_id, reason }) => {
                    warn!("Dropping write for fixture {}: {}", fixture_id, reason);
                }
                Err(other) => return Err(other),
            }
        }
        Ok(applied)
    }

    /// Earliest `kickoff` strictly after `now` among non-terminal fixtures
    /// for `(league_id, season)`. Feeds the scheduler's idle-sleep
    /// calculation; never returns a past instant.
    pub fn get_next_upcoming_timestamp(
        &self,
        league_id: i64,
        season: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, CoreError> {
        let conn = self.conn.lock().expect("repository mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT kickoff FROM fixtures
                 WHERE league_id = ?1 AND season = ?2
                 AND kickoff > ?3 AND status_short IN ('NS', 'TBD')
                 ORDER BY kickoff ASC LIMIT 1",
            )
            .map_err(|e| CoreError::RepositoryTransient(e.to_string()))?;

        let result: Option<String> = stmt
            .query_row(params![league_id, season, now.to_rfc3339()], |row| row.get(0))
            .optional()
            .map_err(|e| CoreError::RepositoryTransient(e.to_string()))?;

        Ok(result.and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|t| t.with_timezone(&Utc))))
    }

    /// All fixtures for `(league_id, season)` sharing the exact `kickoff`
    /// instant of `at` — a co-scheduled slot.
    pub fn get_fixtures_at_timestamp(
        &self,
        league_id: i64,
        season: i32,
        at: DateTime<Utc>,
    ) -> Result<Vec<Fixture>, CoreError> {
        let conn = self.conn.lock().expect("repository mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT * FROM fixtures
                 WHERE league_id = ?1 AND season = ?2 AND kickoff = ?3",
            )
            .map_err(|e| CoreError::RepositoryTransient(e.to_string()))?;
        let rows = stmt
            .query_map(params![league_id, season, at.to_rfc3339()], map_fixture)
            .map_err(|e| CoreError::RepositoryTransient(e.to_string()))?;
        collect_fixtures(rows)
    }

    /// All fixtures for `(league_id, season)` with `kickoff` on the UTC
    /// calendar day of `day`, ascending. Backs the date-scoped fixture
    /// listing RPC.
    pub fn get_fixtures_for_date(
        &self,
        league_id: i64,
        season: i32,
        day: DateTime<Utc>,
    ) -> Result<Vec<Fixture>, CoreError> {
        let (start, end) = utc_day_bounds(day);
        let conn = self.conn.lock().expect("repository mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT * FROM fixtures
                 WHERE league_id = ?1 AND season = ?2 AND kickoff >= ?3 AND kickoff < ?4
                 ORDER BY kickoff ASC",
            )
            .map_err(|e| CoreError::RepositoryTransient(e.to_string()))?;
        let rows = stmt
            .query_map(
                params![league_id, season, start.to_rfc3339(), end.to_rfc3339()],
                map_fixture,
            )
            .map_err(|e| CoreError::RepositoryTransient(e.to_string()))?;
        collect_fixtures(rows)
    }

    /// Earliest and latest `kickoff` for `(league_id, season)` fixtures on
    /// the UTC calendar day containing `reference_date`.
    /// `None` if no fixtures fall on that day. Backs the standings
    /// refresher's match-day window.
    pub fn get_daily_fixture_window(
        &self,
        league_id: i64,
        season: i32,
        reference_date: DateTime<Utc>,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, CoreError> {
        let (start, end) = utc_day_bounds(reference_date);
        let conn = self.conn.lock().expect("repository mutex poisoned");
        let row: Option<(Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT MIN(kickoff), MAX(kickoff) FROM fixtures
                 WHERE league_id = ?1 AND season = ?2 AND kickoff >= ?3 AND kickoff < ?4",
                params![league_id, season, start.to_rfc3339(), end.to_rfc3339()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| CoreError::RepositoryTransient(e.to_string()))?;

        Ok(match row {
            Some((Some(earliest), Some(latest))) => Some((
                DateTime::parse_from_rfc3339(&earliest)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or(reference_date),
                DateTime::parse_from_rfc3339(&latest)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or(reference_date),
            )),
            _ => None,
        })
    }

    pub fn has_fixtures(&self, league_id: i64, season: i32) -> Result<bool, CoreError> {
        let conn = self.conn.lock().expect("repository mutex poisoned");
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM fixtures WHERE league_id = ?1 AND season = ?2",
                params![league_id, season],
                |row| row.get(0),
            )
            .map_err(|e| CoreError::RepositoryTransient(e.to_string()))?;
        Ok(count > 0)
    }

    pub fn has_live_matches(&self, league_id: i64, season: i32) -> Result<bool, CoreError> {
        let conn = self.conn.lock().expect("repository mutex poisoned");
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM fixtures
                 WHERE league_id = ?1 AND season = ?2
                 AND status_short IN ('1H','HT','2H','ET','BT','P','LIVE','SUSP','INT')",
                params![league_id, season],
                |row| row.get(0),
            )
            .map_err(|e| CoreError::RepositoryTransient(e.to_string()))?;
        Ok(count > 0)
    }

    /// Deletes terminal fixtures whose `kickoff` is older than `older_than`.
    /// Backs the retention sweep; returns the number of rows removed.
    pub fn delete_finished_fixtures(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<usize, CoreError> {
        let conn = self.conn.lock().expect("repository mutex poisoned");
        let removed = conn
            .execute(
                "DELETE FROM fixtures
                 WHERE kickoff < ?1
                 AND status_short IN ('FT','AET','PEN','PST','CANC','ABD','AWD','WO')",
                params![older_than.to_rfc3339()],
            )
            .map_err(|e| CoreError::RepositoryTransient(e.to_string()))?;
        Ok(removed)
    }
}

/// `[start, end)` bounds for the UTC calendar day containing `instant`.
fn utc_day_bounds(instant: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = instant
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid");
    let end = start + chrono::Duration::days(1);
    (Utc.from_utc_datetime(&start), Utc.from_utc_datetime(&end))
}

fn fetch_immutable_fields(
    conn: &Connection,
    api_fixture_id: i64,
) -> rusqlite::Result<Option<(i64, i32, DateTime<Utc>, FixtureStatus)>> {
    conn.query_row(
        "SELECT league_id, season, kickoff, status_short FROM fixtures WHERE api_fixture_id = ?1",
        params![api_fixture_id],
        |row| {
            let league_id: i64 = row.get(0)?;
            let season: i32 = row.get(1)?;
            let kickoff_str: String = row.get(2)?;
            let status_str: String = row.get(3)?;
            Ok((league_id, season, kickoff_str, status_str))
        },
    )
    .optional()
    .map(|opt| {
        opt.map(|(league_id, season, kickoff_str, status_str)| {
            let kickoff = DateTime::parse_from_rfc3339(&kickoff_str)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            (
                league_id,
                season,
                kickoff,
                FixtureStatus::from_upstream_code(&status_str),
            )
        })
    })
}

fn map_fixture(row: &Row) -> rusqlite::Result<Fixture> {
    let kickoff_str: String = row.get("kickoff")?;
    let status_short_str: String = row.get("status_short")?;
    let period_first: Option<i64> = row.get("period_first")?;
    let period_second: Option<i64> = row.get("period_second")?;

    Ok(Fixture {
        api_fixture_id: row.get("api_fixture_id")?,
        league_id: row.get("league_id")?,
        season: row.get("season")?,
        kickoff: DateTime::parse_from_rfc3339(&kickoff_str)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        status_short: FixtureStatus::from_upstream_code(&status_short_str),
        status_long: row.get("status_long")?,
        elapsed_minutes: row.get("elapsed_minutes")?,
        home_team: Team {
            id: row.get("home_team_id")?,
            name: row.get("home_team_name")?,
            logo: row.get("home_team_logo")?,
            winner: None,
        },
        away_team: Team {
            id: row.get("away_team_id")?,
            name: row.get("away_team_name")?,
            logo: row.get("away_team_logo")?,
            winner: None,
        },
        home_goals: row.get("home_goals")?,
        away_goals: row.get("away_goals")?,
        halftime_home: row.get("halftime_home")?,
        halftime_away: row.get("halftime_away")?,
        fulltime_home: row.get("fulltime_home")?,
        fulltime_away: row.get("fulltime_away")?,
        period_first: period_first.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        period_second: period_second.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        venue: row.get("venue")?,
        referee: row.get("referee")?,
        competition_name: row.get("competition_name")?,
    })
}

fn collect_fixtures(
    rows: rusqlite::MappedRows<'_, impl FnMut(&Row) -> rusqlite::Result<Fixture>>,
) -> Result<Vec<Fixture>, CoreError> {
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| CoreError::RepositoryTransient(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_fixture(id: i64, kickoff: DateTime<Utc>, status: FixtureStatus) -> Fixture {
        Fixture {
            api_fixture_id: id,
            league_id: 6,
            season: 2025,
            kickoff,
            status_short: status,
            status_long: "placeholder".to_string(),
            elapsed_minutes: None,
            home_team: Team { id: 1, name: "Home".to_string(), logo: None, winner: None },
            away_team: Team { id: 2, name: "Away".to_string(), logo: None, winner: None },
            home_goals: Some(0),
            away_goals: Some(0),
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

    #[test]
    fn open_on_disk_creates_schema_and_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixtures.db");
        let now = Utc::now();

        {
            let repo = FixtureRepository::open(&path).unwrap();
            repo.upsert(&sample_fixture(42, now + Duration::hours(1), FixtureStatus::NotStarted))
                .unwrap();
        }

        let repo = FixtureRepository::open(&path).unwrap();
        assert!(repo.has_fixtures(6, 2025).unwrap());
    }

    #[test]
    fn upsert_then_read_back_round_trips() {
        let repo = FixtureRepository::open_in_memory().unwrap();
        let now = Utc::now();
        let fixture = sample_fixture(1, now + Duration::hours(1), FixtureStatus::NotStarted);
        repo.upsert(&fixture).unwrap();

        let found = repo.get_fixtures_for_date(6, 2025, now).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].api_fixture_id, 1);
    }

    #[test]
    fn upsert_rejects_terminal_regression() {
        let repo = FixtureRepository::open_in_memory().unwrap();
        let now = Utc::now();
        let mut fixture = sample_fixture(2, now, FixtureStatus::FullTime);
        repo.upsert(&fixture).unwrap();

        fixture.status_short = FixtureStatus::SecondHalf;
        let err = repo.upsert(&fixture).unwrap_err();
        assert!(matches!(err, CoreError::WriteConflict { .. }));
    }

    #[test]
    fn upsert_allows_kickoff_reschedule_while_pre_live() {
        let repo = FixtureRepository::open_in_memory().unwrap();
        let now = Utc::now();
        let mut fixture = sample_fixture(3, now, FixtureStatus::NotStarted);
        repo.upsert(&fixture).unwrap();

        fixture.kickoff = now + Duration::days(1);
        repo.upsert(&fixture).unwrap();

        let found = repo.get_fixtures_for_date(6, 2025, fixture.kickoff).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kickoff, fixture.kickoff);
    }

    #[test]
    fn upsert_rejects_kickoff_change_once_fixture_has_left_pre_live() {
        let repo = FixtureRepository::open_in_memory().unwrap();
        let now = Utc::now();
        let mut fixture = sample_fixture(4, now, FixtureStatus::FirstHalf);
        repo.upsert(&fixture).unwrap();

        fixture.kickoff = now + Duration::days(1);
        let err = repo.upsert(&fixture).unwrap_err();
        assert!(matches!(err, CoreError::WriteConflict { .. }));
    }

    #[test]
    fn next_upcoming_timestamp_ignores_past_and_terminal() {
        let repo = FixtureRepository::open_in_memory().unwrap();
        let now = Utc::now();
        repo.upsert(&sample_fixture(4, now - Duration::hours(1), FixtureStatus::NotStarted)).unwrap();
        repo.upsert(&sample_fixture(5, now + Duration::hours(2), FixtureStatus::FullTime)).unwrap();
        repo.upsert(&sample_fixture(6, now + Duration::hours(3), FixtureStatus::NotStarted)).unwrap();

        let next = repo.get_next_upcoming_timestamp(6, 2025, now).unwrap();
        assert!(next.is_some());
        let next = next.unwrap();
        assert!((next - (now + Duration::hours(3))).num_seconds().abs() < 2);
    }

    #[test]
    fn daily_fixture_window_spans_earliest_to_latest_kickoff() {
        let repo = FixtureRepository::open_in_memory().unwrap();
        let now = Utc::now();
        let morning = now.date_naive().and_hms_opt(9, 0, 0).unwrap();
        let evening = now.date_naive().and_hms_opt(20, 0, 0).unwrap();
        let morning = Utc.from_utc_datetime(&morning);
        let evening = Utc.from_utc_datetime(&evening);

        repo.upsert(&sample_fixture(10, morning, FixtureStatus::NotStarted)).unwrap();
        repo.upsert(&sample_fixture(11, evening, FixtureStatus::NotStarted)).unwrap();

        let window = repo.get_daily_fixture_window(6, 2025, now).unwrap().unwrap();
        assert_eq!(window.0, morning);
        assert_eq!(window.1, evening);
    }

    #[test]
    fn daily_fixture_window_is_none_when_no_fixtures_that_day() {
        let repo = FixtureRepository::open_in_memory().unwrap();
        let now = Utc::now();
        assert!(repo.get_daily_fixture_window(6, 2025, now).unwrap().is_none());
    }

    #[test]
    fn delete_finished_fixtures_only_removes_old_terminal_rows() {
        let repo = FixtureRepository::open_in_memory().unwrap();
        let now = Utc::now();
        repo.upsert(&sample_fixture(7, now - Duration::days(10), FixtureStatus::FullTime)).unwrap();
        repo.upsert(&sample_fixture(8, now - Duration::days(1), FixtureStatus::FullTime)).unwrap();
        repo.upsert(&sample_fixture(9, now - Duration::days(10), FixtureStatus::NotStarted)).unwrap();

        let removed = repo.delete_finished_fixtures(now - Duration::days(5)).unwrap();
        assert_eq!(removed, 1);
    }
}
