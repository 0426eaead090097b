use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::models::MatchId;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:../data/squadsignal.db";
pub const DEFAULT_SIGNAL_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_VOTE_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_MIN_SAMPLE_SIZE: u32 = 10;
pub const DEFAULT_DEMO_MATCH_ID: MatchId = 999_999;
pub const DEFAULT_DEMO_DELAY: Duration = Duration::from_millis(600);

/// Runtime knobs for the signal engine, read from the environment (after `.env`).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    pub signal_ttl: Duration,
    pub vote_ttl: Duration,
    pub min_sample_size: u32,
    pub demo_match_id: MatchId,
    pub demo_delay: Duration,
    pub demo_seed: Option<u64>,
    pub fallback_on_outage: bool,
    pub vote_staging_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            signal_ttl: DEFAULT_SIGNAL_TTL,
            vote_ttl: DEFAULT_VOTE_TTL,
            min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
            demo_match_id: DEFAULT_DEMO_MATCH_ID,
            demo_delay: DEFAULT_DEMO_DELAY,
            demo_seed: None,
            fallback_on_outage: false,
            vote_staging_path: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            signal_ttl: env_parsed("SIGNAL_CACHE_TTL_SECS").map_or(defaults.signal_ttl, Duration::from_secs),
            vote_ttl: env_parsed("VOTE_CACHE_TTL_SECS").map_or(defaults.vote_ttl, Duration::from_secs),
            min_sample_size: env_parsed("MIN_SAMPLE_SIZE").unwrap_or(defaults.min_sample_size),
            demo_match_id: env_parsed("DEMO_MATCH_ID").unwrap_or(defaults.demo_match_id),
            demo_delay: env_parsed("DEMO_DELAY_MS").map_or(defaults.demo_delay, Duration::from_millis),
            demo_seed: env_parsed("DEMO_SEED"),
            fallback_on_outage: env_parsed("FALLBACK_ON_OUTAGE").unwrap_or(defaults.fallback_on_outage),
            vote_staging_path: env::var("VOTE_STAGING_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

/// Parse an env var, warning and returning `None` when it is set but malformed.
fn env_parsed<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={:?}, using default", name, raw);
            None
        }
    }
}
