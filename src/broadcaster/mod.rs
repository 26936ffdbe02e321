//! Per-topic live polling and fan-out to gRPC stream subscribers.
//!
//! One background poller exists per `(leagueID, season)` topic, created
//! lazily on the first subscriber and torn down once the last one leaves.
//! Fan-out to each subscriber goes through a bounded `mpsc` channel; a slow
//! client is dropped from, not allowed to stall, the tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::diff::{detect_update_kind, has_significant_changes, new_events, recent_events};
use crate::model::{Fixture, FixtureEvent, StatusRecord, Update};
use crate::notify::{self, NoopNotificationHook, NotificationHook};
use crate::repository::FixtureRepository;
use crate::scheduler::{next_sleep, SchedulerBounds};
use crate::upstream::UpstreamClient;

pub type TopicKey = (i64, i32);

/// How many buffered updates a subscriber tolerates before being skipped
/// for a tick.
const SUBSCRIBER_BUFFER_SIZE: usize = 64;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Update>,
}

/// Per-fixture memory the poller keeps between ticks: the last snapshot it
/// fetched plus the events already seen, so [`crate::diff`] can compute a
/// delta instead of replaying the full history every tick.
#[derive(Clone)]
struct FixtureMemory {
    fixture: Fixture,
    events: Vec<FixtureEvent>,
}

struct TopicState {
    subscribers: Vec<Subscriber>,
    memory: HashMap<i64, FixtureMemory>,
    /// When each currently-halftime fixture first entered `Halftime`, for
    /// the scheduler's de-synchronization rule.
    halftime_since: HashMap<i64, chrono::DateTime<chrono::Utc>>,
    poller: Option<JoinHandle<()>>,
    paused: Arc<AtomicBool>,
}

impl TopicState {
    fn new() -> Self {
        TopicState {
            subscribers: Vec::new(),
            memory: HashMap::new(),
            halftime_since: HashMap::new(),
            poller: None,
            paused: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Owns every topic's poller and subscriber set.
pub struct LiveMatchBroadcaster {
    topics: Arc<Mutex<HashMap<TopicKey, TopicState>>>,
    upstream: Arc<dyn UpstreamClient>,
    repository: FixtureRepository,
    bounds: SchedulerBounds,
    next_subscriber_id: AtomicU64,
    /// Disabled only in tests that drive `run_tick` by hand — production
    /// always spawns a background poller on first subscriber.
    auto_spawn: bool,
    notify_hook: Arc<dyn NotificationHook>,
}

impl LiveMatchBroadcaster {
    pub fn new(
        upstream: Arc<dyn UpstreamClient>,
        repository: FixtureRepository,
        bounds: SchedulerBounds,
    ) -> Arc<Self> {
        Arc::new(LiveMatchBroadcaster {
            topics: Arc::new(Mutex::new(HashMap::new())),
            upstream,
            repository,
            bounds,
            next_subscriber_id: AtomicU64::new(1),
            auto_spawn: true,
            notify_hook: Arc::new(NoopNotificationHook),
        })
    }

    pub fn with_notification_hook(
        upstream: Arc<dyn UpstreamClient>,
        repository: FixtureRepository,
        bounds: SchedulerBounds,
        notify_hook: Arc<dyn NotificationHook>,
    ) -> Arc<Self> {
        Arc::new(LiveMatchBroadcaster {
            topics: Arc::new(Mutex::new(HashMap::new())),
            upstream,
            repository,
            bounds,
            next_subscriber_id: AtomicU64::new(1),
            auto_spawn: true,
            notify_hook,
        })
    }

    #[cfg(test)]
    fn new_for_test(
        upstream: Arc<dyn UpstreamClient>,
        repository: FixtureRepository,
        bounds: SchedulerBounds,
    ) -> Arc<Self> {
        Arc::new(LiveMatchBroadcaster {
            topics: Arc::new(Mutex::new(HashMap::new())),
            upstream,
            repository,
            bounds,
            next_subscriber_id: AtomicU64::new(1),
            auto_spawn: false,
            notify_hook: Arc::new(NoopNotificationHook),
        })
    }

    /// Register a new subscriber for `(league_id, season)`, spawning the
    /// topic's poller if this is the first subscriber for that key.
    pub async fn subscribe(
        self: &Arc<Self>,
        league_id: i64,
        season: i32,
    ) -> mpsc::Receiver<Update> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER_SIZE);
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        let key = (league_id, season);

        let mut topics = self.topics.lock().await;
        let state = topics.entry(key).or_insert_with(TopicState::new);
        state.subscribers.push(Subscriber { id, tx });

        if self.auto_spawn && state.poller.is_none() {
            info!("Starting poller for league {} season {}", league_id, season);
            let handle = self.clone().spawn_poller(key);
            state.poller = Some(handle);
        }

        rx
    }

    /// Remove a subscriber by the id returned implicitly via its channel
    /// closing; in practice the gRPC layer drops the receiver and the
    /// poller notices the send failing, so this is mostly exercised by
    /// tests and by an explicit unsubscribe RPC if one is added later.
    pub async fn unsubscribe(&self, league_id: i64, season: i32, subscriber_id: u64) {
        let mut topics = self.topics.lock().await;
        if let Some(state) = topics.get_mut(&(league_id, season)) {
            state.subscribers.retain(|s| s.id != subscriber_id);
            self.stop_poller_if_idle(&mut topics, (league_id, season));
        }
    }

    pub async fn subscriber_count(&self, league_id: i64, season: i32) -> usize {
        let topics = self.topics.lock().await;
        topics
            .get(&(league_id, season))
            .map(|s| s.subscribers.len())
            .unwrap_or(0)
    }

    pub async fn set_paused(&self, league_id: i64, season: i32, paused: bool) {
        let topics = self.topics.lock().await;
        if let Some(state) = topics.get(&(league_id, season)) {
            state.paused.store(paused, Ordering::SeqCst);
        }
    }

    fn stop_poller_if_idle(&self, topics: &mut HashMap<TopicKey, TopicState>, key: TopicKey) {
        let should_remove = topics
            .get(&key)
            .map(|s| s.subscribers.is_empty())
            .unwrap_or(false);
        if should_remove {
            if let Some(mut state) = topics.remove(&key) {
                if let Some(handle) = state.poller.take() {
                    handle.abort();
                }
                info!("Stopped poller for league {} season {} (no subscribers)", key.0, key.1);
            }
        }
    }

    fn spawn_poller(self: Arc<Self>, key: TopicKey) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let sleep_for = self.run_tick(key).await;

                let mut topics = self.topics.lock().await;
                let still_wanted = topics.get(&key).map(|s| !s.subscribers.is_empty()).unwrap_or(false);
                if !still_wanted {
                    if let Some(mut state) = topics.remove(&key) {
                        state.poller = None;
                        info!("Stopped poller for league {} season {} (no subscribers)", key.0, key.1);
                    }
                    return;
                }
                drop(topics);

                tokio::time::sleep(sleep_for).await;
            }
        })
    }

    /// One polling iteration for a topic: fetch, diff, persist, fan out,
    /// and return how long to sleep before the next tick.
    async fn run_tick(self: &Arc<Self>, key: TopicKey) -> std::time::Duration {
        let (league_id, season) = key;

        let is_paused = {
            let topics = self.topics.lock().await;
            topics.get(&key).map(|s| s.paused.load(Ordering::SeqCst)).unwrap_or(false)
        };

        if is_paused {
            return next_sleep(&self.bounds, true, 0, None, None, chrono::Utc::now());
        }

        let live_fixtures = match self.upstream.get_live_fixtures(league_id).await {
            Ok(fixtures) => fixtures,
            Err(e) => {
                warn!("Upstream fetch failed for league {}: {}", league_id, e);
                Vec::new()
            }
        };
        let live_fixtures: Vec<Fixture> = live_fixtures
            .into_iter()
            .filter(|f| f.season == season)
            .collect();

        let mut updates = Vec::new();
        let mut halftime_since: Option<chrono::DateTime<chrono::Utc>> = None;
        let tick_now = chrono::Utc::now();

        {
            let mut topics = self.topics.lock().await;
            let Some(state) = topics.get_mut(&key) else {
                return self.bounds.unknown_kickoff_interval;
            };

            // Prune subscribers whose receiver has already dropped, regardless
            // of whether this tick produces any update to fan out — otherwise
            // a topic that goes quiet right after its last subscriber
            // disconnects would never notice and its poller would run forever.
            state.subscribers.retain(|sub| !sub.tx.is_closed());

            state
                .halftime_since
                .retain(|id, _| live_fixtures.iter().any(|f| &f.api_fixture_id == id));

            for fixture in &live_fixtures {
                if fixture.status_short == crate::model::FixtureStatus::Halftime {
                    let entered_at = *state
                        .halftime_since
                        .entry(fixture.api_fixture_id)
                        .or_insert(tick_now);
                    halftime_since = Some(match halftime_since {
                        Some(earliest) => earliest.min(entered_at),
                        None => entered_at,
                    });
                } else {
                    state.halftime_since.remove(&fixture.api_fixture_id);
                }

                let events = match self.upstream.get_fixture_events(fixture.api_fixture_id).await {
                    Ok(events) => events,
                    Err(e) => {
                        debug!("Event fetch failed for fixture {}: {}", fixture.api_fixture_id, e);
                        Vec::new()
                    }
                };

                let previous = state.memory.get(&fixture.api_fixture_id).cloned();

                let fresh_events = previous
                    .as_ref()
                    .map(|p| new_events(&p.events, &events))
                    .unwrap_or_else(|| recent_events(&events));

                let changed = previous
                    .as_ref()
                    .map(|p| has_significant_changes(&p.fixture, fixture, &p.events, &events))
                    .unwrap_or(true);

                if changed || !fresh_events.is_empty() || previous.is_none() {
                    let kind = match &previous {
                        Some(p) => detect_update_kind(&p.fixture, fixture, &fresh_events),
                        // A fixture observed live for the first time this
                        // topic has seen it is always a `match_started`,
                        // regardless of status.
                        None => crate::model::UpdateKind::MatchStarted,
                    };

                    let update = Update {
                        fixture_id: fixture.api_fixture_id,
                        emission_time: chrono::Utc::now(),
                        kind,
                        fixture: fixture.clone(),
                        status: StatusRecord {
                            short: fixture.status_short,
                            long: fixture.status_long.clone(),
                            elapsed_minutes: fixture.elapsed_minutes,
                            extra_minutes: None,
                        },
                        events: recent_events(&events),
                        triggering_event: fresh_events.last().cloned(),
                    };
                    updates.push(update);
                }

                state.memory.insert(
                    fixture.api_fixture_id,
                    FixtureMemory { fixture: fixture.clone(), events },
                );
            }

            let finished: Vec<i64> = state
                .memory
                .keys()
                .filter(|id| !live_fixtures.iter().any(|f| &f.api_fixture_id == *id))
                .copied()
                .collect();
            for id in finished {
                if let Some(memory) = state.memory.remove(&id) {
                    state.halftime_since.remove(&id);
                    // On error fetching the final snapshot, fall back to the
                    // last known one rather than
                    // dropping the `match_finished` update entirely.
                    let final_fixture = match self.upstream.get_fixture_by_id(id).await {
                        Ok(f) => f,
                        Err(e) => {
                            warn!("Failed to fetch final snapshot for fixture {}: {}", id, e);
                            memory.fixture.clone()
                        }
                    };
                    let update = Update {
                        fixture_id: id,
                        emission_time: chrono::Utc::now(),
                        kind: crate::model::UpdateKind::MatchFinished,
                        fixture: final_fixture.clone(),
                        status: StatusRecord {
                            short: final_fixture.status_short,
                            long: final_fixture.status_long.clone(),
                            elapsed_minutes: final_fixture.elapsed_minutes,
                            extra_minutes: None,
                        },
                        events: recent_events(&memory.events),
                        triggering_event: None,
                    };
                    updates.push(update);
                    if let Err(e) = self.repository.upsert(&final_fixture) {
                        warn!("Failed to persist final fixture {}: {}", id, e);
                    }
                }
            }

            for fixture in &live_fixtures {
                if let Err(e) = self.repository.upsert(fixture) {
                    warn!("Failed to persist fixture {}: {}", fixture.api_fixture_id, e);
                }
            }

            for update in updates {
                if notify::should_notify(update.kind) {
                    notify::dispatch(self.notify_hook.clone(), update.clone());
                }
                fan_out(&mut state.subscribers, update);
            }
        }

        let next_kickoff = self
            .repository
            .get_next_upcoming_timestamp(league_id, season, chrono::Utc::now())
            .unwrap_or(None);

        next_sleep(
            &self.bounds,
            false,
            live_fixtures.len(),
            halftime_since,
            next_kickoff,
            chrono::Utc::now(),
        )
    }
}

/// Non-blocking send to every subscriber; a full channel drops the update
/// for that subscriber only, rather than stalling the tick for everyone
/// else.
fn fan_out(subscribers: &mut Vec<Subscriber>, update: Update) {
    subscribers.retain(|sub| match sub.tx.try_send(update.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("Subscriber {} buffer full, dropping update", sub.id);
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    });
}
