use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::SentryError;

fn default_control_socket() -> PathBuf {
    PathBuf::from("/tmp/sentryd.sock")
}

fn default_cache_ttl_seconds() -> u64 {
    60
}

fn default_hard_stale_seconds() -> u64 {
    300
}

fn default_reconciler_interval_seconds() -> u64 {
    30
}

fn default_warning_minutes() -> i64 {
    10
}

fn default_critical_minutes() -> i64 {
    30
}

fn default_min_usd_precheck() -> rust_decimal::Decimal {
    rust_decimal::Decimal::from(5)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountsConfig {
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_hard_stale_seconds")]
    pub hard_stale_seconds: u64,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: default_cache_ttl_seconds(),
            hard_stale_seconds: default_hard_stale_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_reconciler_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_warning_minutes")]
    pub warning_minutes: i64,
    #[serde(default = "default_critical_minutes")]
    pub critical_minutes: i64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_reconciler_interval_seconds(),
            warning_minutes: default_warning_minutes(),
            critical_minutes: default_critical_minutes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrdersConfig {
    pub default_notional_usd: rust_decimal::Decimal,
    #[serde(default = "default_min_usd_precheck")]
    pub min_usd_precheck: rust_decimal::Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotDefaultsConfig {
    pub default_confirmation_minutes: i64,
    pub default_cooldown_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub refill_per_sec: u64,
    pub burst: usize,
}

/// Top-level daemon configuration, loaded from JSON at startup (spec
/// §6, §13). Mirrors the teacher's `StrategyConfig::load` pattern of
/// reading a flat JSON document via `serde_json::from_reader`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    pub orders: OrdersConfig,
    pub bot: BotDefaultsConfig,
    pub ratelimit: RateLimitConfig,
    /// The bots this daemon owns, seeded into the persistence layer at
    /// startup. Edited and reloaded via SIGHUP (§13).
    #[serde(default)]
    pub bots: Vec<sentry_persistence::Bot>,
    /// Unix-domain socket `sentryd run` listens on for `bots
    /// start`/`stop` issued by a separate CLI invocation (spec §6).
    #[serde(default = "default_control_socket")]
    pub control_socket: PathBuf,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, SentryError> {
        let file = std::fs::File::open(path)?;
        let config = serde_json::from_reader(file)?;
        Ok(config)
    }
}
