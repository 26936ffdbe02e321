use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

mod broadcaster;
mod config;
mod diff;
mod error;
mod grpc;
mod health;
mod model;
mod notify;
mod repository;
mod scheduler;
mod standings;
mod upstream;

use broadcaster::LiveMatchBroadcaster;
use config::Config;
use grpc::AfconService;
use repository::FixtureRepository;
use standings::{run_standings_refresher, InMemoryStandingsCache, StandingsCache};
use upstream::api_football::ApiFootballClient;
use upstream::UpstreamClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;
    let init_leagues = config.init_leagues()?;

    let repository = FixtureRepository::open(std::path::Path::new(&config.database_path))?;
    info!("Fixture repository opened at {}", config.database_path);

    let upstream: Arc<dyn UpstreamClient> = Arc::new(
        ApiFootballClient::new(
            &config.upstream_api_url,
            config.upstream_api_key.as_deref().unwrap_or_default(),
        )
        .context("failed to build upstream client")?,
    );

    // Initial-sync gate: for each configured league, prime
    // the repository from upstream iff it has no fixtures yet.
    if config.auto_init {
        for league in &init_leagues {
            match repository.has_fixtures(league.league_id, league.season) {
                Ok(true) => {
                    info!(
                        "Skipping initial sync for {} ({}:{}): fixtures already present",
                        league.name, league.league_id, league.season
                    );
                }
                Ok(false) => {
                    info!(
                        "Initial sync for {} ({}:{})",
                        league.name, league.league_id, league.season
                    );
                    match upstream
                        .get_fixtures_for_league_season(league.league_id, league.season)
                        .await
                    {
                        Ok(fixtures) => match repository.upsert_batch(&fixtures) {
                            Ok(count) => info!("Initial sync wrote {} fixtures for {}", count, league.name),
                            Err(e) => warn!("Initial sync upsert failed for {}: {}", league.name, e),
                        },
                        Err(e) => warn!("Initial sync fetch failed for {}: {}", league.name, e),
                    }
                }
                Err(e) => warn!("has_fixtures check failed for {}: {}", league.name, e),
            }
        }
    }

    let broadcaster = LiveMatchBroadcaster::new(
        upstream.clone(),
        repository.clone(),
        config.scheduler_bounds(),
    );

    if config.pause_afcon_live_matches {
        broadcaster
            .set_paused(config.afcon_league_id, config.afcon_season, true)
            .await;
        info!(
            "AFCON league {}:{} paused at startup (PAUSE_AFCON_LIVE_MATCHES)",
            config.afcon_league_id, config.afcon_season
        );
    }

    // Standings refresher: one independent loop per configured league,
    // sharing no subscribers with the broadcaster.
    let standings_cache: Arc<dyn StandingsCache> = Arc::new(InMemoryStandingsCache::new());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    for league in &init_leagues {
        let upstream = upstream.clone();
        let repository = repository.clone();
        let cache = standings_cache.clone();
        let ttls = config.standings_ttls();
        let shutdown_rx = shutdown_rx.clone();
        let league_id = league.league_id;
        let season = league.season;
        tokio::spawn(async move {
            run_standings_refresher(league_id, season, upstream, repository, cache, ttls, shutdown_rx)
                .await;
        });
    }

    if config.retention_sweep_interval_secs > 0 {
        let repository = repository.clone();
        let interval_secs = config.retention_sweep_interval_secs;
        let cutoff_days = config.retention_cutoff_days;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                let cutoff = chrono::Utc::now() - chrono::Duration::days(cutoff_days);
                match repository.delete_finished_fixtures(cutoff) {
                    Ok(removed) if removed > 0 => {
                        info!("Retention sweep removed {} finished fixtures", removed)
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Retention sweep failed: {}", e),
                }
            }
        });
    }

    let health_addr: SocketAddr = config.health_addr.parse().context("invalid HEALTH_ADDR")?;
    let health_listener = tokio::net::TcpListener::bind(health_addr).await?;
    info!("Health endpoint listening on http://{}", health_addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(health_listener, health::router()).await {
            error!("Health server exited: {}", e);
        }
    });

    let grpc_addr: SocketAddr = config.grpc_addr.parse().context("invalid GRPC_ADDR")?;
    info!("gRPC surface listening on {}", grpc_addr);
    let service = AfconService::new(broadcaster, upstream, repository);

    tonic::transport::Server::builder()
        .add_service(service.into_server())
        .serve(grpc_addr)
        .await?;

    let _ = shutdown_tx.send(true);
    Ok(())
}
