use crate::balance::AccountBalance;
use crate::client::{
    ExchangeClient, ExchangeOrderId, ExchangeOrderStatus, OrderSize, OrderStatusResponse,
    SubmitMarketOrder, TickerStream,
};
use crate::error::ExchangeError;
use crate::fill_store::Fill;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sentry_instrument::{Candle, CandleInterval, Pair, Side, Ticker};
use sentry_integration::rate_limit::{Priority, RateLimiter};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Fee/price model a [`SimulatedExchange`] fills every order at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedMarket {
    pub fee_pct: Decimal,
}

impl Default for SimulatedMarket {
    fn default() -> Self {
        Self {
            fee_pct: Decimal::new(1, 3), // 0.001
        }
    }
}

/// Deterministic [`ExchangeClient`] test double: fills every submitted
/// order immediately and in full at a caller-supplied mark price. No
/// wire adapters for real venues ship in this workspace (spec §16) —
/// this is the only concrete implementation.
pub struct SimulatedExchange {
    market: SimulatedMarket,
    balances: parking_lot::RwLock<HashMap<String, AccountBalance>>,
    candles: parking_lot::RwLock<HashMap<Pair, Vec<Candle>>>,
    marks: parking_lot::RwLock<HashMap<Pair, Decimal>>,
    orders: parking_lot::RwLock<HashMap<String, OrderStatusResponse>>,
    ticker_tx: parking_lot::Mutex<Option<tokio::sync::mpsc::UnboundedSender<Ticker>>>,
    next_order_id: AtomicU64,
    next_fill_id: AtomicU64,
    healthy: std::sync::atomic::AtomicBool,
    rate_limiter: RateLimiter,
}

impl SimulatedExchange {
    pub fn new(market: SimulatedMarket) -> Self {
        Self::with_rate_limiter(market, RateLimiter::new(10, Duration::from_secs(1)))
    }

    /// Construct with an explicit [`RateLimiter`] (config keys
    /// `ratelimit.burst` / `ratelimit.refill_per_sec`, spec §6).
    pub fn with_rate_limiter(market: SimulatedMarket, rate_limiter: RateLimiter) -> Self {
        Self {
            market,
            balances: parking_lot::RwLock::new(HashMap::new()),
            candles: parking_lot::RwLock::new(HashMap::new()),
            marks: parking_lot::RwLock::new(HashMap::new()),
            orders: parking_lot::RwLock::new(HashMap::new()),
            ticker_tx: parking_lot::Mutex::new(None),
            next_order_id: AtomicU64::new(1),
            next_fill_id: AtomicU64::new(1),
            healthy: std::sync::atomic::AtomicBool::new(true),
            rate_limiter,
        }
    }

    pub fn set_balance(&self, currency: &str, balance: AccountBalance) {
        self.balances.write().insert(currency.to_string(), balance);
    }

    pub fn set_candles(&self, pair: Pair, candles: Vec<Candle>) {
        self.candles.write().insert(pair, candles);
    }

    pub fn set_mark(&self, pair: Pair, price: Decimal) {
        self.marks.write().insert(pair, price);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Push a ticker to every subscriber, as a real feed's stream would
    /// (spec §6 MarketFeed).
    pub fn push_ticker(&self, ticker: Ticker) {
        if let Some(tx) = self.ticker_tx.lock().as_ref() {
            let _ = tx.send(ticker);
        }
    }

    fn mark_price(&self, pair: &Pair) -> Decimal {
        self.marks.read().get(pair).copied().unwrap_or(Decimal::ZERO)
    }
}

#[async_trait]
impl ExchangeClient for SimulatedExchange {
    async fn subscribe(&self, _pairs: &[Pair]) -> Result<TickerStream, ExchangeError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        *self.ticker_tx.lock() = Some(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn health(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn get_candles(
        &self,
        pair: &Pair,
        _interval: CandleInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.rate_limiter.acquire(Priority::Normal).await;
        let candles = self.candles.read().get(pair).cloned().unwrap_or_default();
        let skip = candles.len().saturating_sub(limit);
        Ok(candles[skip..].to_vec())
    }

    async fn list_balances(&self) -> Result<HashMap<String, AccountBalance>, ExchangeError> {
        self.rate_limiter.acquire(Priority::Normal).await;
        Ok(self.balances.read().clone())
    }

    async fn submit_market_order(
        &self,
        order: SubmitMarketOrder,
    ) -> Result<ExchangeOrderId, ExchangeError> {
        self.rate_limiter.acquire(Priority::High).await;
        let mark = self.mark_price(&order.pair);
        if mark.is_zero() {
            return Err(ExchangeError::Validation("no mark price set for pair".to_string()));
        }

        let (base_qty, quote_value) = match order.size {
            OrderSize::QuoteNotionalUsd(notional) => (notional / mark, notional),
            OrderSize::BaseSize(base) => (base, base * mark),
        };
        if base_qty <= Decimal::ZERO {
            return Err(ExchangeError::Validation("order size must be positive".to_string()));
        }

        let order_id = format!("sim-{}", self.next_order_id.fetch_add(1, Ordering::SeqCst));
        let fill_id = format!("sim-fill-{}", self.next_fill_id.fetch_add(1, Ordering::SeqCst));
        let commission = quote_value * self.market.fee_pct;

        let fill = Fill {
            fill_id,
            exchange_order_id: order_id.clone(),
            pair: order.pair,
            side: order.side,
            base_qty,
            quote_value_usd: quote_value,
            price: mark,
            commission_usd: commission,
            executed_at: Utc::now(),
        };
        self.apply_fill_to_balances(&fill);

        self.orders.write().insert(
            order_id.clone(),
            OrderStatusResponse {
                status: ExchangeOrderStatus::Filled,
                fills: vec![fill],
            },
        );

        Ok(ExchangeOrderId(order_id))
    }

    async fn get_order(&self, id: &ExchangeOrderId) -> Result<OrderStatusResponse, ExchangeError> {
        self.rate_limiter.acquire(Priority::High).await;
        self.orders
            .read()
            .get(&id.0)
            .cloned()
            .ok_or_else(|| ExchangeError::Validation(format!("unknown order {}", id.0)))
    }
}

impl SimulatedExchange {
    fn apply_fill_to_balances(&self, fill: &Fill) {
        let base_currency = fill.pair.as_str().split('-').next().unwrap_or("").to_string();
        let mut balances = self.balances.write();
        match fill.side {
            Side::Buy => {
                let usd = balances.entry("USD".to_string()).or_insert(AccountBalance {
                    available: Decimal::ZERO,
                    held: Decimal::ZERO,
                });
                usd.available -= fill.quote_value_usd + fill.commission_usd;
                let base = balances.entry(base_currency).or_insert(AccountBalance {
                    available: Decimal::ZERO,
                    held: Decimal::ZERO,
                });
                base.available += fill.base_qty;
            }
            Side::Sell => {
                let base = balances.entry(base_currency).or_insert(AccountBalance {
                    available: Decimal::ZERO,
                    held: Decimal::ZERO,
                });
                base.available -= fill.base_qty;
                let usd = balances.entry("USD".to_string()).or_insert(AccountBalance {
                    available: Decimal::ZERO,
                    held: Decimal::ZERO,
                });
                usd.available += fill.quote_value_usd - fill.commission_usd;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn buy_order_fills_immediately_and_debits_usd() {
        let exchange = SimulatedExchange::new(SimulatedMarket::default());
        let pair = Pair::from("BTC-USD");
        exchange.set_mark(pair.clone(), dec!(50000));
        exchange.set_balance("USD", AccountBalance { available: dec!(1000), held: Decimal::ZERO });

        let order_id = exchange
            .submit_market_order(SubmitMarketOrder {
                pair,
                side: Side::Buy,
                size: OrderSize::QuoteNotionalUsd(dec!(100)),
                idempotency_key: "k1".to_string(),
            })
            .await
            .unwrap();

        let status = exchange.get_order(&order_id).await.unwrap();
        assert_eq!(status.status, ExchangeOrderStatus::Filled);
        assert_eq!(status.fills.len(), 1);
        assert_eq!(status.fills[0].base_qty, dec!(0.002));

        let balances = exchange.list_balances().await.unwrap();
        let usd = balances.get("USD").unwrap();
        assert_eq!(usd.available, dec!(1000) - dec!(100) - dec!(0.1));
    }

    #[tokio::test]
    async fn sell_order_fills_immediately_and_credits_usd() {
        let exchange = SimulatedExchange::new(SimulatedMarket::default());
        let pair = Pair::from("BTC-USD");
        exchange.set_mark(pair.clone(), dec!(50000));
        exchange.set_balance("BTC", AccountBalance { available: dec!(1), held: Decimal::ZERO });

        exchange
            .submit_market_order(SubmitMarketOrder {
                pair,
                side: Side::Sell,
                size: OrderSize::BaseSize(dec!(0.01)),
                idempotency_key: "k1".to_string(),
            })
            .await
            .unwrap();

        let balances = exchange.list_balances().await.unwrap();
        let usd = balances.get("USD").unwrap();
        assert_eq!(usd.available, dec!(500) - dec!(0.5));
        let btc = balances.get("BTC").unwrap();
        assert_eq!(btc.available, dec!(0.99));
    }

    #[tokio::test]
    async fn order_without_a_mark_price_is_a_validation_error() {
        let exchange = SimulatedExchange::new(SimulatedMarket::default());
        let err = exchange
            .submit_market_order(SubmitMarketOrder {
                pair: Pair::from("ETH-USD"),
                side: Side::Buy,
                size: OrderSize::QuoteNotionalUsd(dec!(10)),
                idempotency_key: "k1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));
    }

    #[tokio::test]
    async fn get_candles_respects_limit() {
        let exchange = SimulatedExchange::new(SimulatedMarket::default());
        let pair = Pair::from("BTC-USD");
        let candles: Vec<Candle> = (0..5)
            .map(|i| Candle {
                ts: Utc::now(),
                open: dec!(1),
                high: dec!(1),
                low: dec!(1),
                close: Decimal::from(i),
                volume: dec!(1),
            })
            .collect();
        exchange.set_candles(pair.clone(), candles);

        let result = exchange.get_candles(&pair, CandleInterval::OneMinute, 2).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[1].close, Decimal::from(4));
    }
}
