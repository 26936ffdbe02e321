pub mod api_football;

use async_trait::async_trait;

use crate::model::{Fixture, FixtureEvent, StandingGroup};

/// Typed calls into the external fixture provider.
///
/// The core is agnostic to transport, rate-limit behaviour, and wire shape —
/// implementors decode JSON (or whatever the provider speaks) into the
/// already-typed values below: a small async trait, one implementation per
/// upstream, consumed through `Arc<dyn UpstreamClient>`.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Used for initial sync and for rebuilding the schedule.
    async fn get_fixtures_for_league_season(
        &self,
        league_id: i64,
        season: i32,
    ) -> anyhow::Result<Vec<Fixture>>;

    /// Used each poll tick; returns only currently in-progress fixtures.
    async fn get_live_fixtures(&self, league_id: i64) -> anyhow::Result<Vec<Fixture>>;

    /// Used per live fixture per tick.
    async fn get_fixture_events(&self, fixture_id: i64) -> anyhow::Result<Vec<FixtureEvent>>;

    /// Used to capture the final snapshot when a fixture leaves the live set.
    async fn get_fixture_by_id(&self, fixture_id: i64) -> anyhow::Result<Fixture>;

    /// Used by the standings refresher.
    async fn get_standings(
        &self,
        league_id: i64,
        season: i32,
    ) -> anyhow::Result<Vec<StandingGroup>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
