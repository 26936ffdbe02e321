//! REST adapter against an API-FOOTBALL-shaped upstream provider.
//!
//! Parsing is deliberately defensive: every field reaches for a string
//! first, falls back to a number, and a missing field degrades to
//! `None`/`Unknown` rather than failing the whole poll tick. One malformed
//! fixture in a response must never poison the others.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::debug;

use crate::model::{EventKind, Fixture, FixtureEvent, FixtureStatus, StandingGroup, StandingRow, Team};

use super::UpstreamClient;

/// Client for an API-FOOTBALL-compatible REST provider.
/// Docs shape: <https://www.api-football.com/documentation-v3>
pub struct ApiFootballClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ApiFootballClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiFootballClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Fetching {} {:?}", url, query);

        let resp = self
            .http
            .get(&url)
            .header("x-apisports-key", &self.api_key)
            .query(query)
            .send()
            .await
            .context("upstream request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("upstream error: {}", resp.status());
        }

        resp.json::<serde_json::Value>()
            .await
            .context("failed to parse upstream response")
    }
}

#[async_trait]
impl UpstreamClient for ApiFootballClient {
    fn name(&self) -> &str {
        "ApiFootball"
    }

    async fn get_fixtures_for_league_season(
        &self,
        league_id: i64,
        season: i32,
    ) -> Result<Vec<Fixture>> {
        let raw = self
            .get_json(
                "/fixtures",
                &[
                    ("league", league_id.to_string()),
                    ("season", season.to_string()),
                ],
            )
            .await?;
        parse_fixtures_response(&raw)
    }

    async fn get_live_fixtures(&self, league_id: i64) -> Result<Vec<Fixture>> {
        let raw = self
            .get_json(
                "/fixtures",
                &[("league", league_id.to_string()), ("live", "all".to_string())],
            )
            .await?;
        parse_fixtures_response(&raw)
    }

    async fn get_fixture_events(&self, fixture_id: i64) -> Result<Vec<FixtureEvent>> {
        let raw = self
            .get_json("/fixtures/events", &[("fixture", fixture_id.to_string())])
            .await?;
        parse_events_response(&raw)
    }

    async fn get_fixture_by_id(&self, fixture_id: i64) -> Result<Fixture> {
        let raw = self
            .get_json("/fixtures", &[("id", fixture_id.to_string())])
            .await?;
        parse_fixtures_response(&raw)?
            .into_iter()
            .next()
            .context("fixture not found upstream")
    }

    async fn get_standings(&self, league_id: i64, season: i32) -> Result<Vec<StandingGroup>> {
        let raw = self
            .get_json(
                "/standings",
                &[
                    ("league", league_id.to_string()),
                    ("season", season.to_string()),
                ],
            )
            .await?;
        parse_standings_response(&raw)
    }
}

fn as_i64_lenient(v: &serde_json::Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn as_i32_lenient(v: &serde_json::Value) -> Option<i32> {
    as_i64_lenient(v).map(|n| n as i32)
}

fn parse_team(v: &serde_json::Value) -> Option<Team> {
    Some(Team {
        id: as_i64_lenient(v.get("id")?)?,
        name: v.get("name")?.as_str()?.to_string(),
        logo: v.get("logo").and_then(|l| l.as_str()).map(str::to_string),
        winner: v.get("winner").and_then(|w| w.as_bool()),
    })
}

fn parse_one_fixture(item: &serde_json::Value) -> Option<Fixture> {
    let fixture = item.get("fixture")?;
    let api_fixture_id = as_i64_lenient(fixture.get("id")?)?;

    let kickoff_str = fixture.get("date")?.as_str()?;
    let kickoff: DateTime<Utc> = kickoff_str.parse().ok()?;

    let status = fixture.get("status")?;
    let status_code = status.get("short").and_then(|s| s.as_str()).unwrap_or("");
    let status_short = FixtureStatus::from_upstream_code(status_code);
    let status_long = status
        .get("long")
        .and_then(|s| s.as_str())
        .unwrap_or(status_code)
        .to_string();
    let elapsed_minutes = status.get("elapsed").and_then(as_i32_lenient);

    let league = item.get("league")?;
    let league_id = as_i64_lenient(league.get("id")?)?;
    let season = as_i32_lenient(league.get("season")?)?;

    let teams = item.get("teams")?;
    let home_team = parse_team(teams.get("home")?)?;
    let away_team = parse_team(teams.get("away")?)?;

    let goals = item.get("goals");
    let home_goals = goals.and_then(|g| g.get("home")).and_then(as_i32_lenient);
    let away_goals = goals.and_then(|g| g.get("away")).and_then(as_i32_lenient);

    let score = item.get("score");
    let halftime = score.and_then(|s| s.get("halftime"));
    let fulltime = score.and_then(|s| s.get("fulltime"));

    let venue = fixture
        .get("venue")
        .and_then(|v| v.get("name"))
        .and_then(|n| n.as_str())
        .map(str::to_string);
    let referee = fixture
        .get("referee")
        .and_then(|r| r.as_str())
        .map(str::to_string);

    let period_first = fixture
        .get("periods")
        .and_then(|p| p.get("first"))
        .and_then(as_i64_lenient)
        .and_then(|ts| DateTime::from_timestamp(ts, 0));
    let period_second = fixture
        .get("periods")
        .and_then(|p| p.get("second"))
        .and_then(as_i64_lenient)
        .and_then(|ts| DateTime::from_timestamp(ts, 0));

    Some(Fixture {
        api_fixture_id,
        league_id,
        season,
        kickoff,
        status_short,
        status_long,
        elapsed_minutes,
        home_team,
        away_team,
        home_goals,
        away_goals,
        halftime_home: halftime.and_then(|h| h.get("home")).and_then(as_i32_lenient),
        halftime_away: halftime.and_then(|h| h.get("away")).and_then(as_i32_lenient),
        fulltime_home: fulltime.and_then(|f| f.get("home")).and_then(as_i32_lenient),
        fulltime_away: fulltime.and_then(|f| f.get("away")).and_then(as_i32_lenient),
        period_first,
        period_second,
        venue,
        referee,
        competition_name: None,
    })
}

fn parse_fixtures_response(raw: &serde_json::Value) -> Result<Vec<Fixture>> {
    let items = match raw.get("response").and_then(|r| r.as_array()) {
        Some(a) => a,
        None => return Ok(vec![]),
    };
    Ok(items.iter().filter_map(parse_one_fixture).collect())
}

fn classify_event_kind(type_str: &str) -> EventKind {
    match type_str.to_lowercase().as_str() {
        "goal" => EventKind::Goal,
        "card" => EventKind::Card,
        "subst" | "substitution" => EventKind::Substitution,
        "var" => EventKind::Var,
        _ => EventKind::Other,
    }
}

fn parse_one_event(item: &serde_json::Value) -> Option<FixtureEvent> {
    let time = item.get("time")?;
    let elapsed_minutes = as_i32_lenient(time.get("elapsed")?)?;
    let extra_minutes = time.get("extra").and_then(as_i32_lenient);

    let team_id = as_i64_lenient(item.get("team")?.get("id")?)?;

    let player = item.get("player");
    let player_id = player.and_then(|p| p.get("id")).and_then(as_i64_lenient);
    let player_name = player
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
        .map(str::to_string);

    let assist = item.get("assist");
    let assist_id = assist.and_then(|a| a.get("id")).and_then(as_i64_lenient);
    let assist_name = assist
        .and_then(|a| a.get("name"))
        .and_then(|n| n.as_str())
        .map(str::to_string);

    let type_str = item.get("type").and_then(|t| t.as_str()).unwrap_or("");
    let kind = classify_event_kind(type_str);
    let detail = item
        .get("detail")
        .and_then(|d| d.as_str())
        .unwrap_or("")
        .to_string();
    let comments = item
        .get("comments")
        .and_then(|c| c.as_str())
        .map(str::to_string);

    Some(FixtureEvent {
        elapsed_minutes,
        extra_minutes,
        team_id,
        player_id,
        player_name,
        assist_id,
        assist_name,
        kind,
        detail,
        comments,
    })
}

fn parse_events_response(raw: &serde_json::Value) -> Result<Vec<FixtureEvent>> {
    let items = match raw.get("response").and_then(|r| r.as_array()) {
        Some(a) => a,
        None => return Ok(vec![]),
    };
    Ok(items.iter().filter_map(parse_one_event).collect())
}

fn parse_standing_row(item: &serde_json::Value) -> Option<StandingRow> {
    let team = parse_team(item.get("team")?)?;
    let all = item.get("all");
    Some(StandingRow {
        rank: as_i32_lenient(item.get("rank")?)?,
        team,
        points: as_i32_lenient(item.get("points")?).unwrap_or(0),
        played: all.and_then(|a| a.get("played")).and_then(as_i32_lenient).unwrap_or(0),
        won: all.and_then(|a| a.get("win")).and_then(as_i32_lenient).unwrap_or(0),
        drawn: all.and_then(|a| a.get("draw")).and_then(as_i32_lenient).unwrap_or(0),
        lost: all.and_then(|a| a.get("lose")).and_then(as_i32_lenient).unwrap_or(0),
        goals_for: all
            .and_then(|a| a.get("goals"))
            .and_then(|g| g.get("for"))
            .and_then(as_i32_lenient)
            .unwrap_or(0),
        goals_against: all
            .and_then(|a| a.get("goals"))
            .and_then(|g| g.get("against"))
            .and_then(as_i32_lenient)
            .unwrap_or(0),
    })
}

fn parse_standings_response(raw: &serde_json::Value) -> Result<Vec<StandingGroup>> {
    // Shape: response[0].league.standings is an array of groups, each an array of rows.
    let groups = match raw
        .get("response")
        .and_then(|r| r.as_array())
        .and_then(|a| a.first())
        .and_then(|first| first.get("league"))
        .and_then(|l| l.get("standings"))
        .and_then(|s| s.as_array())
    {
        Some(g) => g,
        None => return Ok(vec![]),
    };

    let parsed = groups
        .iter()
        .filter_map(|group| {
            let rows_raw = group.as_array()?;
            let rows: Vec<StandingRow> = rows_raw.iter().filter_map(parse_standing_row).collect();
            Some(StandingGroup {
                group_name: None,
                rows,
            })
        })
        .collect();
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_fixture() {
        let raw = serde_json::json!({
            "response": [{
                "fixture": {
                    "id": 1001,
                    "date": "2026-07-28T18:00:00+00:00",
                    "status": { "short": "1H", "long": "First Half", "elapsed": 23 }
                },
                "league": { "id": 6, "season": 2025 },
                "teams": {
                    "home": { "id": 1, "name": "Home FC", "logo": null, "winner": null },
                    "away": { "id": 2, "name": "Away FC", "logo": null, "winner": null }
                },
                "goals": { "home": 1, "away": 0 },
                "score": { "halftime": {"home": null, "away": null}, "fulltime": {"home": null, "away": null} }
            }]
        });

        let fixtures = parse_fixtures_response(&raw).unwrap();
        assert_eq!(fixtures.len(), 1);
        let f = &fixtures[0];
        assert_eq!(f.api_fixture_id, 1001);
        assert_eq!(f.league_id, 6);
        assert_eq!(f.season, 2025);
        assert_eq!(f.status_short, FixtureStatus::FirstHalf);
        assert_eq!(f.elapsed_minutes, Some(23));
        assert_eq!(f.home_goals, Some(1));
        assert_eq!(f.away_goals, Some(0));
    }

    #[test]
    fn unknown_status_code_preserves_verbatim_long_text() {
        let status = FixtureStatus::from_upstream_code("WEIRD");
        assert_eq!(status, FixtureStatus::Unknown);
    }

    #[test]
    fn parses_a_goal_event() {
        let raw = serde_json::json!({
            "response": [{
                "time": { "elapsed": 23, "extra": null },
                "team": { "id": 1 },
                "player": { "id": 10, "name": "Bruno F." },
                "assist": { "id": null, "name": null },
                "type": "Goal",
                "detail": "Normal Goal",
                "comments": null
            }]
        });

        let events = parse_events_response(&raw).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Goal);
        assert_eq!(events[0].player_name.as_deref(), Some("Bruno F."));
    }

    #[test]
    fn empty_response_array_yields_no_fixtures() {
        let raw = serde_json::json!({ "response": [] });
        assert!(parse_fixtures_response(&raw).unwrap().is_empty());
    }
}
