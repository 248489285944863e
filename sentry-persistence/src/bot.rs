use rust_decimal::Decimal;
use sentry_instrument::Pair;
use sentry_ta::SignalConfig;
use serde::{Deserialize, Serialize};

/// Lifecycle status (spec §3: "only `RUNNING` bots consume ticks").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum BotStatus {
    Stopped,
    Running,
}

/// The trade envelope governing how a bot places and spaces orders
/// (spec §3).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TradeEnvelope {
    pub position_size_usd: Decimal,
    pub confirmation_minutes: i64,
    pub cooldown_minutes: i64,
    pub skip_signals_on_low_balance: bool,
    pub min_price_step_pct: Option<Decimal>,
}

/// A bot's durable configuration: its signal weights and trade
/// envelope. Owned by the persistence layer; the live `BotEvaluator`
/// holds a private copy, replaced (never mutated) on change (spec §3
/// "Ownership and lifecycle").
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BotConfig {
    pub signals: Vec<SignalConfig>,
    pub envelope: TradeEnvelope,
}

/// A bot's durable identity and configuration (spec §3).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Bot {
    pub id: i64,
    pub name: String,
    pub pair: Pair,
    pub status: BotStatus,
    pub config: BotConfig,
}
