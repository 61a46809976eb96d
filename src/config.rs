//! Environment-based configuration
//!
//! Settings are fixed at process start. The invalidation limit in particular
//! is never changed while the coordinator runs.

use crate::{Error, Result};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const ENV_INVALIDATE_LIMIT: &str = "BLOCKREAPER_INVALIDATE_LIMIT";
const ENV_HEARTBEAT_INTERVAL_SECS: &str = "BLOCKREAPER_HEARTBEAT_INTERVAL_SECS";
const ENV_HEARTBEAT_RECHECK_SECS: &str = "BLOCKREAPER_HEARTBEAT_RECHECK_SECS";
const ENV_INVALIDATE_WORK_PCT: &str = "BLOCKREAPER_INVALIDATE_WORK_PCT";
const ENV_REPLICATION_INTERVAL_SECS: &str = "BLOCKREAPER_REPLICATION_INTERVAL_SECS";

/// Lower bound on the per-node limit, in blocks per second of heartbeat interval
const INVALIDATE_BLOCKS_PER_HEARTBEAT_SEC: usize = 20;

/// Invalidation scheduling configuration
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidateConfig {
    /// Configured maximum blocks sent to one datanode per pass
    pub invalidate_limit: usize,
    /// Datanode heartbeat interval
    pub heartbeat_interval: Duration,
    /// How often heartbeat expiry is re-evaluated
    pub heartbeat_recheck_interval: Duration,
    /// Fraction of live datanodes served per pass, in (0, 1]
    pub invalidate_work_pct: f64,
    /// Period of the maintenance loop
    pub replication_interval: Duration,
}

impl Default for InvalidateConfig {
    fn default() -> Self {
        Self {
            invalidate_limit: 1000,
            heartbeat_interval: Duration::from_secs(3),
            heartbeat_recheck_interval: Duration::from_secs(300), // 5 minutes
            invalidate_work_pct: 0.32,
            replication_interval: Duration::from_secs(3),
        }
    }
}

impl InvalidateConfig {
    /// Load configuration from environment
    ///
    /// Environment variables (all optional):
    /// - BLOCKREAPER_INVALIDATE_LIMIT: blocks per datanode per pass (default: 1000)
    /// - BLOCKREAPER_HEARTBEAT_INTERVAL_SECS: heartbeat interval (default: 3)
    /// - BLOCKREAPER_HEARTBEAT_RECHECK_SECS: heartbeat recheck interval (default: 300)
    /// - BLOCKREAPER_INVALIDATE_WORK_PCT: fraction of live datanodes per pass (default: 0.32)
    /// - BLOCKREAPER_REPLICATION_INTERVAL_SECS: maintenance period (default: 3)
    pub fn from_env() -> Result<Self> {
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        info!(
            invalidate_limit = config.effective_invalidate_limit(),
            heartbeat_interval_secs = config.heartbeat_interval.as_secs(),
            invalidate_work_pct = config.invalidate_work_pct,
            replication_interval_secs = config.replication_interval.as_secs(),
            "Loaded invalidation config"
        );
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            invalidate_limit: parse_or(&lookup, ENV_INVALIDATE_LIMIT, defaults.invalidate_limit)?,
            heartbeat_interval: Duration::from_secs(parse_or(
                &lookup,
                ENV_HEARTBEAT_INTERVAL_SECS,
                defaults.heartbeat_interval.as_secs(),
            )?),
            heartbeat_recheck_interval: Duration::from_secs(parse_or(
                &lookup,
                ENV_HEARTBEAT_RECHECK_SECS,
                defaults.heartbeat_recheck_interval.as_secs(),
            )?),
            invalidate_work_pct: parse_or(
                &lookup,
                ENV_INVALIDATE_WORK_PCT,
                defaults.invalidate_work_pct,
            )?,
            replication_interval: Duration::from_secs(parse_or(
                &lookup,
                ENV_REPLICATION_INTERVAL_SECS,
                defaults.replication_interval.as_secs(),
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.invalidate_limit == 0 {
            return Err(Error::Config(format!(
                "{ENV_INVALIDATE_LIMIT} must be greater than zero"
            )));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::Config(format!(
                "{ENV_HEARTBEAT_INTERVAL_SECS} must be greater than zero"
            )));
        }
        if self.replication_interval.is_zero() {
            return Err(Error::Config(format!(
                "{ENV_REPLICATION_INTERVAL_SECS} must be greater than zero"
            )));
        }
        if !(self.invalidate_work_pct > 0.0 && self.invalidate_work_pct <= 1.0) {
            return Err(Error::Config(format!(
                "{ENV_INVALIDATE_WORK_PCT} must be in (0, 1], got {}",
                self.invalidate_work_pct
            )));
        }
        Ok(())
    }

    /// Per-datanode limit actually used by the scheduler.
    ///
    /// Never below 20 blocks per second of heartbeat interval, so a datanode
    /// heartbeating slowly still gets enough work per command.
    pub fn effective_invalidate_limit(&self) -> usize {
        let heartbeat_secs = self.heartbeat_interval.as_secs() as usize;
        let floor = INVALIDATE_BLOCKS_PER_HEARTBEAT_SEC * heartbeat_secs;
        self.invalidate_limit.max(floor)
    }

    /// Time without heartbeats after which a datanode is declared dead
    pub fn heartbeat_expiry(&self) -> Duration {
        2 * self.heartbeat_recheck_interval + 10 * self.heartbeat_interval
    }

    /// Node budget for one pass given the number of live datanodes
    pub fn nodes_to_process(&self, live_nodes: usize) -> usize {
        (live_nodes as f64 * self.invalidate_work_pct).ceil() as usize
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(default);
    }
    raw.parse::<T>()
        .map_err(|e| Error::Config(format!("{key} has invalid value '{raw}': {e}")))
}
