//! Standings refresh loop and its cache boundary.
//!
//! One independent background task per configured league, started during
//! initial sync in `main.rs`. Shares nothing with [`crate::broadcaster`]:
//! no subscribers, no writes to the fixture store, just a cache fill on a
//! match-day cadence. The underlying key-value cache is an external
//! collaborator named only at its interface; `InMemoryStandingsCache`
//! stands in for it the same way `FixtureRepository` stands in for the
//! external RDBMS.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::model::StandingGroup;
use crate::repository::FixtureRepository;
use crate::upstream::UpstreamClient;

/// Key-value cache boundary for standings; this trait is the interface the
/// refresher writes through.
#[async_trait]
pub trait StandingsCache: Send + Sync {
    async fn set(&self, league_id: i64, season: i32, groups: Vec<StandingGroup>, ttl: Duration);
    async fn get(&self, league_id: i64, season: i32) -> Option<Vec<StandingGroup>>;
}

struct CacheEntry {
    groups: Vec<StandingGroup>,
    expires_at: DateTime<Utc>,
}

/// In-process stand-in for the external KV cache. Expires entries lazily on
/// read rather than running a background sweep, since standings are a
/// low-churn read.
#[derive(Default)]
pub struct InMemoryStandingsCache {
    entries: Mutex<HashMap<(i64, i32), CacheEntry>>,
}

impl InMemoryStandingsCache {
    pub fn new() -> Self {
        InMemoryStandingsCache::default()
    }
}

#[async_trait]
impl StandingsCache for InMemoryStandingsCache {
    async fn set(&self, league_id: i64, season: i32, groups: Vec<StandingGroup>, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            (league_id, season),
            CacheEntry {
                groups,
                expires_at: Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default(),
            },
        );
    }

    async fn get(&self, league_id: i64, season: i32) -> Option<Vec<StandingGroup>> {
        let mut entries = self.entries.lock().await;
        match entries.get(&(league_id, season)) {
            Some(entry) if entry.expires_at > Utc::now() => Some(entry.groups.clone()),
            Some(_) => {
                entries.remove(&(league_id, season));
                None
            }
            None => None,
        }
    }
}

/// TTLs applied to a standings cache write, depending on whether the league
/// currently has a match in progress.
#[derive(Debug, Clone, Copy)]
pub struct StandingsTtls {
    pub live: Duration,
    pub idle: Duration,
}

impl Default for StandingsTtls {
    fn default() -> Self {
        StandingsTtls {
            live: Duration::from_secs(60),
            idle: Duration::from_secs(15 * 60),
        }
    }
}

/// Runs the per-league standings loop until `shutdown` resolves.
///
/// Anchors on today's fixture window, goes idle outside match days,
/// otherwise refreshes hourly (anchored, not wall-clock-aligned) for as
/// long as the window lasts.
pub async fn run_standings_refresher(
    league_id: i64,
    season: i32,
    upstream: Arc<dyn UpstreamClient>,
    repository: FixtureRepository,
    cache: Arc<dyn StandingsCache>,
    ttls: StandingsTtls,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    info!("Standings refresher started for league {} season {}", league_id, season);

    loop {
        if *shutdown.borrow() {
            return;
        }

        let now = Utc::now();
        let window = repository.get_daily_fixture_window(league_id, season, now).ok().flatten();

        let sleep_for = match window {
            Some((anchor, latest)) => {
                let window_end = latest + chrono::Duration::hours(3);
                if now < anchor {
                    duration_until(anchor, now)
                } else if now > window_end {
                    next_window_sleep(league_id, season, &repository, now)
                } else {
                    if let Err(e) = refresh_once(league_id, season, &upstream, &repository, &cache, ttls).await {
                        warn!("Standings refresh failed for league {} season {}: {}", league_id, season, e);
                    }
                    let next_tick = next_hourly_tick(anchor, now).min(window_end);
                    duration_until(next_tick, now)
                }
            }
            None => next_window_sleep(league_id, season, &repository, now),
        };

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// How long to sleep when there's no fixture window today: find the next
/// upcoming kickoff and sleep until its window opens, or 12h if there is
/// none scheduled at all.
fn next_window_sleep(
    league_id: i64,
    season: i32,
    repository: &FixtureRepository,
    now: DateTime<Utc>,
) -> Duration {
    match repository.get_next_upcoming_timestamp(league_id, season, now) {
        Ok(Some(next_kickoff)) => {
            match repository.get_daily_fixture_window(league_id, season, next_kickoff) {
                Ok(Some((anchor, _))) => duration_until(anchor, now),
                _ => Duration::from_secs(12 * 3600),
            }
        }
        _ => Duration::from_secs(12 * 3600),
    }
}

async fn refresh_once(
    league_id: i64,
    season: i32,
    upstream: &Arc<dyn UpstreamClient>,
    repository: &FixtureRepository,
    cache: &Arc<dyn StandingsCache>,
    ttls: StandingsTtls,
) -> anyhow::Result<()> {
    let groups = upstream.get_standings(league_id, season).await?;
    let live = repository.has_live_matches(league_id, season).unwrap_or(false);
    let ttl = if live { ttls.live } else { ttls.idle };
    cache.set(league_id, season, groups, ttl).await;
    Ok(())
}

/// The next hourly tick anchored on `anchor` (not wall-clock-aligned).
fn next_hourly_tick(anchor: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let elapsed = now.signed_duration_since(anchor);
    let elapsed_hours = (elapsed.num_seconds().max(0) / 3600) + 1;
    anchor + chrono::Duration::hours(elapsed_hours)
}

fn duration_until(target: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    target.signed_duration_since(now).to_std().unwrap_or(Duration::from_secs(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_hourly_tick_is_always_strictly_in_the_future() {
        let anchor = Utc::now() - chrono::Duration::minutes(125);
        let now = Utc::now();
        let next = next_hourly_tick(anchor, now);
        assert!(next > now);
    }

    #[tokio::test]
    async fn cache_expires_entries_after_ttl() {
        let cache = InMemoryStandingsCache::new();
        cache.set(6, 2025, vec![], Duration::from_millis(10)).await;
        assert!(cache.get(6, 2025).await.is_some());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get(6, 2025).await.is_none());
    }

    #[tokio::test]
    async fn cache_returns_none_for_unknown_key() {
        let cache = InMemoryStandingsCache::new();
        assert!(cache.get(99, 2025).await.is_none());
    }
}
