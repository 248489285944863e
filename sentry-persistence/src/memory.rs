use crate::bot::{Bot, BotConfig, BotStatus};
use crate::error::PersistenceError;
use crate::trade::PersistedTradeRecord;
use crate::Persistence;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentry_execution::{ExchangeOrderId, Fill, FillStore, TradeStatus};
use sentry_instrument::{Pair, Side};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Single-process, in-memory [`Persistence`] implementation backed by
/// `parking_lot`-guarded maps. Suffices for the single-process
/// deployment the spec calls out as sufficient (spec §6).
#[derive(Default)]
pub struct InMemoryPersistence {
    bots: parking_lot::RwLock<HashMap<i64, Bot>>,
    trades: parking_lot::RwLock<HashMap<i64, PersistedTradeRecord>>,
    fills: FillStore,
    next_trade_id: AtomicI64,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            bots: parking_lot::RwLock::new(HashMap::new()),
            trades: parking_lot::RwLock::new(HashMap::new()),
            fills: FillStore::new(),
            next_trade_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn create_bot(&self, bot: Bot) -> Result<(), PersistenceError> {
        let mut bots = self.bots.write();
        if bots.contains_key(&bot.id) {
            return Err(PersistenceError::BotAlreadyExists(bot.id));
        }
        bots.insert(bot.id, bot);
        Ok(())
    }

    async fn get_bot(&self, id: i64) -> Result<Bot, PersistenceError> {
        self.bots
            .read()
            .get(&id)
            .cloned()
            .ok_or(PersistenceError::BotNotFound(id))
    }

    async fn list_bots(&self) -> Vec<Bot> {
        self.bots.read().values().cloned().collect()
    }

    async fn set_bot_status(&self, id: i64, status: BotStatus) -> Result<(), PersistenceError> {
        let mut bots = self.bots.write();
        let bot = bots.get_mut(&id).ok_or(PersistenceError::BotNotFound(id))?;
        bot.status = status;
        Ok(())
    }

    async fn update_bot_config(&self, id: i64, config: BotConfig) -> Result<(), PersistenceError> {
        let mut bots = self.bots.write();
        let bot = bots.get_mut(&id).ok_or(PersistenceError::BotNotFound(id))?;
        bot.config = config;
        Ok(())
    }

    async fn delete_bot(&self, id: i64) -> Result<(), PersistenceError> {
        let mut bots = self.bots.write();
        bots.remove(&id).ok_or(PersistenceError::BotNotFound(id))?;
        Ok(())
    }

    async fn create_trade(
        &self,
        bot_id: i64,
        pair: Pair,
        side: Side,
        submitted_notional_usd: rust_decimal::Decimal,
        exchange_order_id: ExchangeOrderId,
        origin_score: rust_decimal::Decimal,
        submitted_at: DateTime<Utc>,
    ) -> Result<PersistedTradeRecord, PersistenceError> {
        let id = self.next_trade_id.fetch_add(1, Ordering::SeqCst);
        let record = PersistedTradeRecord {
            id,
            bot_id,
            pair,
            side,
            submitted_notional_usd,
            submitted_at,
            exchange_order_id: Some(exchange_order_id),
            status: TradeStatus::Pending,
            filled_at: None,
            origin_score,
            failure_reason: None,
        };
        self.trades.write().insert(id, record.clone());
        Ok(record)
    }

    async fn create_failed_trade(
        &self,
        bot_id: i64,
        pair: Pair,
        side: Side,
        submitted_notional_usd: rust_decimal::Decimal,
        origin_score: rust_decimal::Decimal,
        reason: String,
        submitted_at: DateTime<Utc>,
    ) -> Result<PersistedTradeRecord, PersistenceError> {
        let id = self.next_trade_id.fetch_add(1, Ordering::SeqCst);
        let record = PersistedTradeRecord {
            id,
            bot_id,
            pair,
            side,
            submitted_notional_usd,
            submitted_at,
            exchange_order_id: None,
            status: TradeStatus::Failed,
            filled_at: None,
            origin_score,
            failure_reason: Some(reason),
        };
        self.trades.write().insert(id, record.clone());
        Ok(record)
    }

    async fn transition_trade(
        &self,
        id: i64,
        to: TradeStatus,
        filled_at: Option<DateTime<Utc>>,
    ) -> Result<PersistedTradeRecord, PersistenceError> {
        let mut trades = self.trades.write();
        let record = trades.get_mut(&id).ok_or(PersistenceError::TradeNotFound(id))?;
        if record.status != TradeStatus::Pending {
            return Err(PersistenceError::TradeAlreadyTerminal {
                id,
                status: status_label(record.status),
            });
        }
        record.status = to;
        record.filled_at = filled_at;
        Ok(record.clone())
    }

    async fn trades_for_bot(&self, bot_id: i64) -> Vec<PersistedTradeRecord> {
        self.trades
            .read()
            .values()
            .filter(|t| t.bot_id == bot_id)
            .cloned()
            .collect()
    }

    async fn trades_for_pair(&self, pair: &Pair) -> Vec<PersistedTradeRecord> {
        self.trades
            .read()
            .values()
            .filter(|t| &t.pair == pair)
            .cloned()
            .collect()
    }

    async fn trades_with_status(&self, status: TradeStatus) -> Vec<PersistedTradeRecord> {
        self.trades
            .read()
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect()
    }

    async fn upsert_fill(&self, fill: Fill) -> bool {
        self.fills.append(fill)
    }

    async fn fills_for_pair(&self, pair: &Pair) -> Vec<Fill> {
        self.fills.fills_for_pair(pair)
    }
}

fn status_label(status: TradeStatus) -> &'static str {
    match status {
        TradeStatus::Pending => "pending",
        TradeStatus::Completed => "completed",
        TradeStatus::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bot(id: i64) -> Bot {
        Bot {
            id,
            name: "test bot".to_string(),
            pair: Pair::from("BTC-USD"),
            status: BotStatus::Stopped,
            config: crate::BotConfig {
                signals: vec![],
                envelope: crate::TradeEnvelope {
                    position_size_usd: dec!(10),
                    confirmation_minutes: 5,
                    cooldown_minutes: 15,
                    skip_signals_on_low_balance: true,
                    min_price_step_pct: None,
                },
            },
        }
    }

    #[tokio::test]
    async fn create_bot_rejects_duplicate_id() {
        let store = InMemoryPersistence::new();
        store.create_bot(bot(1)).await.unwrap();
        let err = store.create_bot(bot(1)).await.unwrap_err();
        assert_eq!(err, PersistenceError::BotAlreadyExists(1));
    }

    #[tokio::test]
    async fn set_bot_status_persists() {
        let store = InMemoryPersistence::new();
        store.create_bot(bot(1)).await.unwrap();
        store.set_bot_status(1, BotStatus::Running).await.unwrap();
        assert_eq!(store.get_bot(1).await.unwrap().status, BotStatus::Running);
    }

    #[tokio::test]
    async fn trade_transition_is_cas_and_terminal_is_immutable() {
        let store = InMemoryPersistence::new();
        let record = store
            .create_trade(1, Pair::from("BTC-USD"), Side::Buy, dec!(10), ExchangeOrderId("e1".into()), dec!(-0.2), Utc::now())
            .await
            .unwrap();
        store
            .transition_trade(record.id, TradeStatus::Completed, Some(Utc::now()))
            .await
            .unwrap();
        let err = store
            .transition_trade(record.id, TradeStatus::Failed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::TradeAlreadyTerminal { status: "completed", .. }));
    }

    #[tokio::test]
    async fn create_failed_trade_has_no_order_id_and_is_already_terminal() {
        let store = InMemoryPersistence::new();
        let record = store
            .create_failed_trade(1, Pair::from("BTC-USD"), Side::Buy, dec!(10), dec!(-0.2), "below minimum size".to_string(), Utc::now())
            .await
            .unwrap();
        assert_eq!(record.status, TradeStatus::Failed);
        assert_eq!(record.exchange_order_id, None);
        assert_eq!(record.failure_reason.as_deref(), Some("below minimum size"));
        let err = store
            .transition_trade(record.id, TradeStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::TradeAlreadyTerminal { status: "failed", .. }));
    }

    #[tokio::test]
    async fn fill_upsert_is_idempotent_by_fill_id() {
        let store = InMemoryPersistence::new();
        let fill = Fill {
            fill_id: "f1".to_string(),
            exchange_order_id: "o1".to_string(),
            pair: Pair::from("BTC-USD"),
            side: Side::Buy,
            base_qty: dec!(0.001),
            quote_value_usd: dec!(50),
            price: dec!(50000),
            commission_usd: dec!(0.05),
            executed_at: Utc::now(),
        };
        assert!(store.upsert_fill(fill.clone()).await);
        assert!(!store.upsert_fill(fill.clone()).await);
        let pair = Pair::from("BTC-USD");
        assert_eq!(store.fills_for_pair(&pair).await.len(), 1);
    }

    #[tokio::test]
    async fn trades_for_bot_filters_correctly() {
        let store = InMemoryPersistence::new();
        store
            .create_trade(1, Pair::from("BTC-USD"), Side::Buy, dec!(10), ExchangeOrderId("e1".into()), dec!(-0.2), Utc::now())
            .await
            .unwrap();
        store
            .create_trade(2, Pair::from("ETH-USD"), Side::Buy, dec!(10), ExchangeOrderId("e2".into()), dec!(-0.2), Utc::now())
            .await
            .unwrap();
        assert_eq!(store.trades_for_bot(1).await.len(), 1);
        assert_eq!(store.trades_for_bot(2).await.len(), 1);
    }
}
