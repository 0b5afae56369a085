//! Pipeline configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::poller::{PRECOMMIT_CHALLENGE_DELAY, SEAL_POLLER_INTERVAL, SEED_EPOCH_CONFIDENCE};
use crate::core::{AppResult, PipelineError};
use crate::util::serde::ChainEpoch;

/// Poller timing and chain policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between ticks.
    pub interval_secs: u64,
    /// Epochs past the seed epoch before PoRep may start.
    pub seed_epoch_confidence: ChainEpoch,
    /// Network pre-commit challenge delay, in epochs.
    pub precommit_challenge_delay: ChainEpoch,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: SEAL_POLLER_INTERVAL.as_secs(),
            seed_epoch_confidence: SEED_EPOCH_CONFIDENCE,
            precommit_challenge_delay: PRECOMMIT_CHALLENGE_DELAY,
        }
    }
}

impl PollerConfig {
    /// Tick interval.
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validate poller values.
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_secs == 0 {
            return Err("interval_secs must be greater than 0".into());
        }
        if self.seed_epoch_confidence < 0 {
            return Err("seed_epoch_confidence must not be negative".into());
        }
        if self.precommit_challenge_delay <= 0 {
            return Err("precommit_challenge_delay must be greater than 0".into());
        }
        Ok(())
    }
}

/// Window selection policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignerKind {
    /// Spread tasks across workers by in-pass assignment count.
    #[default]
    Spread,
}

/// Scheduler settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Window selection policy.
    pub assigner: AssignerKind,
}

/// Pipeline state store selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StoreBackendConfig {
    /// In-memory store for development/testing.
    #[default]
    InMemory,
    /// Postgres store.
    Postgres {
        /// Connection URL.
        url: String,
        /// Pool size.
        max_connections: u32,
    },
}

impl StoreBackendConfig {
    /// Validate backend values.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::InMemory => Ok(()),
            Self::Postgres { url, max_connections } => {
                if url.trim().is_empty() {
                    return Err("postgres url must not be empty".into());
                }
                if *max_connections == 0 {
                    return Err("max_connections must be greater than 0".into());
                }
                Ok(())
            }
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Poller settings.
    pub poller: PollerConfig,
    /// Scheduler settings.
    pub scheduler: SchedulerConfig,
    /// State store backend.
    pub store: StoreBackendConfig,
}

impl PipelineConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.poller
            .validate()
            .map_err(|e| format!("poller invalid: {e}"))?;
        self.store
            .validate()
            .map_err(|e| format!("store invalid: {e}"))?;
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overlaid with `SEAL_*` environment variables, after loading a
    /// `.env` file if one exists.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Overlay values from a variable lookup and validate.
    ///
    /// Recognised keys: `SEAL_POLL_INTERVAL_SECS`, `SEAL_SEED_EPOCH_CONFIDENCE`,
    /// `SEAL_PRECOMMIT_CHALLENGE_DELAY`, `SEAL_DATABASE_URL`,
    /// `SEAL_DATABASE_MAX_CONNECTIONS`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SEAL_POLL_INTERVAL_SECS") {
            self.poller.interval_secs = parse_var("SEAL_POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("SEAL_SEED_EPOCH_CONFIDENCE") {
            self.poller.seed_epoch_confidence = parse_var("SEAL_SEED_EPOCH_CONFIDENCE", &v)?;
        }
        if let Some(v) = lookup("SEAL_PRECOMMIT_CHALLENGE_DELAY") {
            self.poller.precommit_challenge_delay = parse_var("SEAL_PRECOMMIT_CHALLENGE_DELAY", &v)?;
        }
        if let Some(url) = lookup("SEAL_DATABASE_URL") {
            let max_connections = match lookup("SEAL_DATABASE_MAX_CONNECTIONS") {
                Some(v) => parse_var("SEAL_DATABASE_MAX_CONNECTIONS", &v)?,
                None => 8,
            };
            self.store = StoreBackendConfig::Postgres { url, max_connections };
        }
        self.validate().map_err(PipelineError::InvalidConfig)?;
        Ok(())
    }
}

fn parse_var<T>(key: &str, value: &str) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{key}={value}: {e}"))
}
