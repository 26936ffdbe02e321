use clap::Parser;

/// AFCON live-fixture middleware: ingestion, adaptive polling, and gRPC
/// streaming of live match updates to mobile clients.
#[derive(Parser, Debug, Clone)]
#[command(name = "afcon-live", version, about)]
pub struct Config {
    /// Upstream fixture provider base URL.
    #[arg(
        long,
        env = "UPSTREAM_API_URL",
        default_value = "https://v3.football.api-sports.io"
    )]
    pub upstream_api_url: String,

    /// Upstream fixture provider API key.
    #[arg(long, env = "UPSTREAM_API_KEY")]
    pub upstream_api_key: Option<String>,

    /// SQLite database path (stands in for the out-of-scope RDBMS).
    #[arg(long, env = "DATABASE_PATH", default_value = "afcon-live.db")]
    pub database_path: String,

    /// gRPC listen address.
    #[arg(long, env = "GRPC_ADDR", default_value = "0.0.0.0:50051")]
    pub grpc_addr: String,

    /// HTTP debug/health listen address.
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8080")]
    pub health_addr: String,

    /// Comma-separated `leagueID:season:humanName` entries initialized on
    /// startup, e.g. `6:2025:Africa Cup of Nations`.
    #[arg(long, env = "INIT_LEAGUES", value_delimiter = ',')]
    pub init_leagues: Vec<String>,

    /// Whether to run the initial-sync gate on startup.
    #[arg(long, env = "AUTO_INIT", default_value = "true")]
    pub auto_init: bool,

    /// League ID that `PAUSE_AFCON_LIVE_MATCHES` applies to.
    #[arg(long, env = "AFCON_LEAGUE_ID", default_value = "6")]
    pub afcon_league_id: i64,

    /// Season that `PAUSE_AFCON_LIVE_MATCHES` applies to.
    #[arg(long, env = "AFCON_SEASON", default_value = "2025")]
    pub afcon_season: i32,

    /// Pause flag for the AFCON-league topic, set at startup. A development
    /// and ops escape hatch for quieting polling without tearing down the
    /// topic entirely.
    #[arg(long, env = "PAUSE_AFCON_LIVE_MATCHES", default_value = "false")]
    pub pause_afcon_live_matches: bool,

    /// Retention sweep cadence in seconds. `0` disables the sweep; it is
    /// off by default since most deployments don't need one.
    #[arg(long, env = "RETENTION_SWEEP_INTERVAL_SECS", default_value = "0")]
    pub retention_sweep_interval_secs: u64,

    /// How old (days) a terminally-finished fixture must be before the
    /// retention sweep removes it.
    #[arg(long, env = "RETENTION_CUTOFF_DAYS", default_value = "30")]
    pub retention_cutoff_days: i64,

    // --- Poll-scheduler boundary constants ---
    /// Seconds to sleep while live or paused.
    #[arg(long, env = "POLL_LIVE_INTERVAL_SECS", default_value = "15")]
    pub poll_live_interval_secs: u64,

    /// Seconds to sleep when the next kickoff is more than 24h away.
    #[arg(long, env = "POLL_FAR_INTERVAL_SECS", default_value = "43200")]
    pub poll_far_interval_secs: u64,

    /// Seconds to sleep when the next kickoff is more than 6h away.
    #[arg(long, env = "POLL_MEDIUM_INTERVAL_SECS", default_value = "10800")]
    pub poll_medium_interval_secs: u64,

    /// Seconds to sleep when the next kickoff is more than 1h away.
    #[arg(long, env = "POLL_NEAR_INTERVAL_SECS", default_value = "1800")]
    pub poll_near_interval_secs: u64,

    /// Seconds to sleep when the next kickoff is more than 10min away.
    #[arg(long, env = "POLL_IMMINENT_INTERVAL_SECS", default_value = "300")]
    pub poll_imminent_interval_secs: u64,

    /// Seconds to sleep when no upcoming kickoff is known at all.
    #[arg(long, env = "POLL_UNKNOWN_KICKOFF_INTERVAL_SECS", default_value = "86400")]
    pub poll_unknown_kickoff_interval_secs: u64,

    /// Minutes after halftime entry the second half is expected to resume.
    #[arg(long, env = "HALFTIME_RESUME_MINUTES", default_value = "14")]
    pub halftime_resume_minutes: i64,

    /// Lead time (seconds) subtracted from the halftime resume estimate.
    #[arg(long, env = "HALFTIME_LEAD_SECONDS", default_value = "30")]
    pub halftime_lead_seconds: i64,

    // --- Standings cache TTLs ---
    /// Standings cache TTL in seconds while the league has a live match.
    #[arg(long, env = "STANDINGS_TTL_LIVE_SECS", default_value = "60")]
    pub standings_ttl_live_secs: u64,

    /// Standings cache TTL in seconds while the league is idle.
    #[arg(long, env = "STANDINGS_TTL_IDLE_SECS", default_value = "900")]
    pub standings_ttl_idle_secs: u64,
}

/// One entry from `INIT_LEAGUES`: `leagueID:season:humanName`.
#[derive(Debug, Clone, PartialEq)]
pub struct InitLeague {
    pub league_id: i64,
    pub season: i32,
    pub name: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_live_interval_secs == 0 {
            anyhow::bail!("poll_live_interval_secs must be positive");
        }
        if self.poll_far_interval_secs == 0 {
            anyhow::bail!("poll_far_interval_secs must be positive");
        }
        if self.poll_medium_interval_secs == 0 {
            anyhow::bail!("poll_medium_interval_secs must be positive");
        }
        if self.poll_near_interval_secs == 0 {
            anyhow::bail!("poll_near_interval_secs must be positive");
        }
        if self.poll_imminent_interval_secs == 0 {
            anyhow::bail!("poll_imminent_interval_secs must be positive");
        }
        if self.poll_unknown_kickoff_interval_secs == 0 {
            anyhow::bail!("poll_unknown_kickoff_interval_secs must be positive");
        }
        if self.halftime_resume_minutes <= 0 {
            anyhow::bail!("halftime_resume_minutes must be positive");
        }
        if self.halftime_lead_seconds < 0 {
            anyhow::bail!("halftime_lead_seconds must not be negative");
        }
        if self.standings_ttl_live_secs == 0 {
            anyhow::bail!("standings_ttl_live_secs must be positive");
        }
        if self.standings_ttl_idle_secs == 0 {
            anyhow::bail!("standings_ttl_idle_secs must be positive");
        }
        if self.retention_cutoff_days <= 0 {
            anyhow::bail!("retention_cutoff_days must be positive");
        }
        for raw in &self.init_leagues {
            parse_init_league(raw)?;
        }
        Ok(())
    }

    /// Parsed `INIT_LEAGUES` entries.
    pub fn init_leagues(&self) -> anyhow::Result<Vec<InitLeague>> {
        self.init_leagues.iter().map(|raw| parse_init_league(raw)).collect()
    }

    pub fn scheduler_bounds(&self) -> crate::scheduler::SchedulerBounds {
        crate::scheduler::SchedulerBounds {
            live_poll_interval: std::time::Duration::from_secs(self.poll_live_interval_secs),
            far_interval: std::time::Duration::from_secs(self.poll_far_interval_secs),
            medium_interval: std::time::Duration::from_secs(self.poll_medium_interval_secs),
            near_interval: std::time::Duration::from_secs(self.poll_near_interval_secs),
            imminent_interval: std::time::Duration::from_secs(self.poll_imminent_interval_secs),
            unknown_kickoff_interval: std::time::Duration::from_secs(
                self.poll_unknown_kickoff_interval_secs,
            ),
            halftime_resume_minutes: self.halftime_resume_minutes,
            halftime_lead_seconds: self.halftime_lead_seconds,
        }
    }

    pub fn standings_ttls(&self) -> crate::standings::StandingsTtls {
        crate::standings::StandingsTtls {
            live: std::time::Duration::from_secs(self.standings_ttl_live_secs),
            idle: std::time::Duration::from_secs(self.standings_ttl_idle_secs),
        }
    }
}

fn parse_init_league(raw: &str) -> anyhow::Result<InitLeague> {
    let mut parts = raw.splitn(3, ':');
    let league_id: i64 = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("INIT_LEAGUES entry '{}' missing leagueID", raw))?
        .parse()
        .map_err(|_| anyhow::anyhow!("INIT_LEAGUES entry '{}' has a non-numeric leagueID", raw))?;
    let season: i32 = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("INIT_LEAGUES entry '{}' missing season", raw))?
        .parse()
        .map_err(|_| anyhow::anyhow!("INIT_LEAGUES entry '{}' has a non-numeric season", raw))?;
    let name = parts.next().unwrap_or("").to_string();
    Ok(InitLeague { league_id, season, name })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_init_league_entry() {
        let parsed = parse_init_league("6:2025:Africa Cup of Nations").unwrap();
        assert_eq!(parsed.league_id, 6);
        assert_eq!(parsed.season, 2025);
        assert_eq!(parsed.name, "Africa Cup of Nations");
    }

    #[test]
    fn rejects_entry_missing_season() {
        assert!(parse_init_league("6").is_err());
    }

    #[test]
    fn rejects_non_numeric_league_id() {
        assert!(parse_init_league("abc:2025:Name").is_err());
    }
}
