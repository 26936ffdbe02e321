//! The gRPC surface.
//!
//! Thin adapter only: `stream_live_matches` subscribes to the broadcaster
//! and drains the returned channel into the wire writer until the client
//! cancels or a send fails; `sync_fixtures` and `get_fixtures_by_date`
//! forward straight to the upstream client and repository, falling back
//! to the stored schedule when the upstream call fails. No business logic
//! belongs here — that all lives in [`crate::broadcaster`],
//! [`crate::repository`], and [`crate::upstream`].

use std::pin::Pin;
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use futures_util::Stream;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use crate::broadcaster::LiveMatchBroadcaster;
use crate::model::{Fixture, FixtureEvent, StatusRecord, Update};
use crate::repository::FixtureRepository;
use crate::upstream::UpstreamClient;

pub mod proto {
    tonic::include_proto!("afcon");
}

use proto::afcon_server::{Afcon, AfconServer};
use proto::{
    FixtureEvent as ProtoFixtureEvent, FixtureSnapshot, FixturesByDateRequest, FixturesByDateResponse,
    LiveMatchRequest, LiveMatchUpdate, StatusRecord as ProtoStatusRecord, SyncFixturesRequest,
    SyncFixturesResponse, Team as ProtoTeam,
};

pub struct AfconService {
    broadcaster: Arc<LiveMatchBroadcaster>,
    upstream: Arc<dyn UpstreamClient>,
    repository: FixtureRepository,
}

impl AfconService {
    pub fn new(
        broadcaster: Arc<LiveMatchBroadcaster>,
        upstream: Arc<dyn UpstreamClient>,
        repository: FixtureRepository,
    ) -> Self {
        AfconService { broadcaster, upstream, repository }
    }

    pub fn into_server(self) -> AfconServer<Self> {
        AfconServer::new(self)
    }
}

type UpdateStream = Pin<Box<dyn Stream<Item = Result<LiveMatchUpdate, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl Afcon for AfconService {
    type StreamLiveMatchesStream = UpdateStream;

    async fn stream_live_matches(
        &self,
        request: Request<LiveMatchRequest>,
    ) -> Result<Response<Self::StreamLiveMatchesStream>, Status> {
        let req = request.into_inner();
        let league_id = req.league_id as i64;
        let season = req.season;

        info!("Stream subscribe: league {} season {}", league_id, season);
        let mut rx = self.broadcaster.subscribe(league_id, season).await;

        let stream = async_stream::stream! {
            while let Some(update) = rx.recv().await {
                yield Ok(to_proto_update(&update));
            }
        };

        Ok(Response::new(Box::pin(stream)))
    }

    async fn sync_fixtures(
        &self,
        request: Request<SyncFixturesRequest>,
    ) -> Result<Response<SyncFixturesResponse>, Status> {
        let req = request.into_inner();
        let league_id = req.league_id as i64;
        let season = req.season;

        let fixtures = self
            .upstream
            .get_fixtures_for_league_season(league_id, season)
            .await
            .map_err(|e| Status::unavailable(format!("upstream sync failed: {e}")))?;

        let fixtures: Vec<Fixture> = fixtures
            .into_iter()
            .map(|mut f| {
                if !req.competition.is_empty() {
                    f.competition_name = Some(req.competition.clone());
                }
                f
            })
            .collect();

        let synced = self
            .repository
            .upsert_batch(&fixtures)
            .map_err(|e| Status::internal(format!("repository upsert failed: {e}")))?;

        Ok(Response::new(SyncFixturesResponse {
            success: true,
            fixtures_synced: synced as u32,
            message: format!("synced {synced} fixtures"),
        }))
    }

    async fn get_fixtures_by_date(
        &self,
        request: Request<FixturesByDateRequest>,
    ) -> Result<Response<FixturesByDateResponse>, Status> {
        let req = request.into_inner();
        let date = NaiveDate::parse_from_str(&req.date, "%Y-%m-%d")
            .map_err(|_| Status::invalid_argument("date must be YYYY-MM-DD"))?;
        let day = Utc
            .from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight is valid"));

        let league_id = req.league_id.map(|v| v as i64).unwrap_or_default();
        let season = req.season.unwrap_or_default();

        // Cache-or-upstream first, explicit fallback to the repository on
        // upstream failure. The cache sits outside this crate; here
        // "upstream first" means the live upstream listing, falling back to
        // the stored schedule when that call fails.
        let fixtures = match self.upstream.get_fixtures_for_league_season(league_id, season).await {
            Ok(all) => all
                .into_iter()
                .filter(|f| f.kickoff.date_naive() == date)
                .collect(),
            Err(e) => {
                warn!("Upstream fetch failed for GetFixturesByDate, falling back to repository: {}", e);
                self.repository
                    .get_fixtures_for_date(league_id, season, day)
                    .map_err(|e| Status::internal(format!("repository fallback failed: {e}")))?
            }
        };

        Ok(Response::new(FixturesByDateResponse {
            fixtures: fixtures.iter().map(to_proto_fixture).collect(),
        }))
    }
}

fn to_proto_team(team: &crate::model::Team) -> ProtoTeam {
    ProtoTeam {
        id: team.id,
        name: team.name.clone(),
        logo: team.logo.clone(),
        winner: team.winner,
    }
}

fn to_proto_fixture(fixture: &Fixture) -> FixtureSnapshot {
    FixtureSnapshot {
        api_fixture_id: fixture.api_fixture_id,
        league_id: fixture.league_id,
        season: fixture.season,
        kickoff_unix: fixture.kickoff.timestamp(),
        status_short: fixture.status_short.as_code().to_string(),
        status_long: fixture.status_long.clone(),
        elapsed_minutes: fixture.elapsed_minutes,
        home_team: Some(to_proto_team(&fixture.home_team)),
        away_team: Some(to_proto_team(&fixture.away_team)),
        home_goals: fixture.home_goals,
        away_goals: fixture.away_goals,
        halftime_home: fixture.halftime_home,
        halftime_away: fixture.halftime_away,
        fulltime_home: fixture.fulltime_home,
        fulltime_away: fixture.fulltime_away,
        venue: fixture.venue.clone(),
        referee: fixture.referee.clone(),
        competition_name: fixture.competition_name.clone(),
    }
}

fn to_proto_status(status: &StatusRecord) -> ProtoStatusRecord {
    ProtoStatusRecord {
        short: status.short.as_code().to_string(),
        long: status.long.clone(),
        elapsed_minutes: status.elapsed_minutes,
        extra_minutes: status.extra_minutes,
    }
}

fn to_proto_event(event: &FixtureEvent) -> ProtoFixtureEvent {
    ProtoFixtureEvent {
        elapsed_minutes: event.elapsed_minutes,
        extra_minutes: event.extra_minutes,
        team_id: event.team_id,
        player_id: event.player_id,
        player_name: event.player_name.clone(),
        assist_id: event.assist_id,
        assist_name: event.assist_name.clone(),
        kind: format!("{:?}", event.kind),
        detail: event.detail.clone(),
        comments: event.comments.clone(),
    }
}

fn to_proto_update(update: &Update) -> LiveMatchUpdate {
    LiveMatchUpdate {
        fixture_id: update.fixture_id,
        emission_time_unix: update.emission_time.timestamp(),
        event_type: update.kind.as_wire_str().to_string(),
        fixture: Some(to_proto_fixture(&update.fixture)),
        status: Some(to_proto_status(&update.status)),
        events: update.events.iter().map(to_proto_event).collect(),
        triggering_event: update.triggering_event.as_ref().map(to_proto_event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FixtureStatus, Team, UpdateKind};

    fn sample_update() -> Update {
        Update {
            fixture_id: 1001,
            emission_time: Utc::now(),
            kind: UpdateKind::Goal,
            fixture: Fixture {
                api_fixture_id: 1001,
                league_id: 6,
                season: 2025,
                kickoff: Utc::now(),
                status_short: FixtureStatus::FirstHalf,
                status_long: "First Half".to_string(),
                elapsed_minutes: Some(23),
                home_team: Team { id: 1, name: "Home".to_string(), logo: None, winner: None },
                away_team: Team { id: 2, name: "Away".to_string(), logo: None, winner: None },
                home_goals: Some(1),
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
            },
            status: StatusRecord {
                short: FixtureStatus::FirstHalf,
                long: "First Half".to_string(),
                elapsed_minutes: Some(23),
                extra_minutes: None,
            },
            events: vec![],
            triggering_event: None,
        }
    }

    #[test]
    fn wire_event_type_matches_closed_set_string() {
        let update = sample_update();
        let proto = to_proto_update(&update);
        assert_eq!(proto.event_type, "goal");
        assert_eq!(proto.fixture_id, 1001);
    }
}
