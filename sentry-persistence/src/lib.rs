//! Durable storage boundary: bots, trade records, fills (spec §6
//! "Persistence interface"). A linearizable single-writer store at
//! record granularity; this crate ships one in-memory implementation
//! ([`InMemoryPersistence`]) — embedded/SQL backends are a Non-goal
//! (spec §1).

pub mod bot;
pub mod error;
pub mod memory;
pub mod trade;

pub use bot::{Bot, BotConfig, BotStatus, TradeEnvelope};
pub use error::PersistenceError;
pub use memory::InMemoryPersistence;
pub use trade::PersistedTradeRecord;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentry_execution::{ExchangeOrderId, Fill, TradeStatus};
use sentry_instrument::Pair;

/// Durable CRUD over bots, trade records, and fills (spec §6).
///
/// Trade-record transitions are compare-and-set on current status;
/// terminal states are write-once. Fill upserts are no-ops on a
/// duplicate `fill_id`.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn create_bot(&self, bot: Bot) -> Result<(), PersistenceError>;
    async fn get_bot(&self, id: i64) -> Result<Bot, PersistenceError>;
    async fn list_bots(&self) -> Vec<Bot>;
    async fn set_bot_status(&self, id: i64, status: BotStatus) -> Result<(), PersistenceError>;
    async fn update_bot_config(&self, id: i64, config: BotConfig) -> Result<(), PersistenceError>;
    async fn delete_bot(&self, id: i64) -> Result<(), PersistenceError>;

    #[allow(clippy::too_many_arguments)]
    async fn create_trade(
        &self,
        bot_id: i64,
        pair: Pair,
        side: sentry_instrument::Side,
        submitted_notional_usd: rust_decimal::Decimal,
        exchange_order_id: ExchangeOrderId,
        origin_score: rust_decimal::Decimal,
        submitted_at: DateTime<Utc>,
    ) -> Result<PersistedTradeRecord, PersistenceError>;
    async fn transition_trade(
        &self,
        id: i64,
        to: TradeStatus,
        filled_at: Option<DateTime<Utc>>,
    ) -> Result<PersistedTradeRecord, PersistenceError>;

    /// Create an already-`failed` record for a submit-time validation
    /// error that never reached the exchange, with no
    /// `exchange_order_id` (spec §4.H step 6).
    #[allow(clippy::too_many_arguments)]
    async fn create_failed_trade(
        &self,
        bot_id: i64,
        pair: Pair,
        side: sentry_instrument::Side,
        submitted_notional_usd: rust_decimal::Decimal,
        origin_score: rust_decimal::Decimal,
        reason: String,
        submitted_at: DateTime<Utc>,
    ) -> Result<PersistedTradeRecord, PersistenceError>;
    async fn trades_for_bot(&self, bot_id: i64) -> Vec<PersistedTradeRecord>;
    async fn trades_for_pair(&self, pair: &Pair) -> Vec<PersistedTradeRecord>;
    async fn trades_with_status(&self, status: TradeStatus) -> Vec<PersistedTradeRecord>;

    /// No-op if `fill.fill_id` has already been stored.
    async fn upsert_fill(&self, fill: Fill) -> bool;
    async fn fills_for_pair(&self, pair: &Pair) -> Vec<Fill>;
}
