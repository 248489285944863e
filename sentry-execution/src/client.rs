use crate::error::ExchangeError;
use crate::fill_store::Fill;
use async_trait::async_trait;
use futures::Stream;
use rust_decimal::Decimal;
use sentry_instrument::{Candle, CandleInterval, Pair, Side, Ticker};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;

/// Exchange-issued identifier for a submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ExchangeOrderId(pub String);

/// Whether a market order's size is denominated in quote notional (a
/// BUY spends this many USD) or base size (a SELL sells this much base
/// asset) — spec §4.H step 3.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub enum OrderSize {
    QuoteNotionalUsd(Decimal),
    BaseSize(Decimal),
}

/// Request to submit a market order (spec §6:
/// `submitMarketOrder({pair, side, notional_or_size, idempotency_key})`).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubmitMarketOrder {
    pub pair: Pair,
    pub side: Side,
    pub size: OrderSize,
    pub idempotency_key: String,
}

/// Exchange-side status of a previously-submitted order (spec §6:
/// `getOrder(...) -> {status, fills}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ExchangeOrderStatus {
    Open,
    Filled,
    Cancelled,
    Failed,
}

impl ExchangeOrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExchangeOrderStatus::Filled | ExchangeOrderStatus::Cancelled | ExchangeOrderStatus::Failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderStatusResponse {
    pub status: ExchangeOrderStatus,
    pub fills: Vec<Fill>,
}

pub type TickerStream = Pin<Box<dyn Stream<Item = Ticker> + Send>>;

/// Bidirectional bridge to the exchange (spec §4.A): streaming ticker
/// subscription plus the REST surface the core needs (accounts, candles,
/// order submission and lookup). Exactly one implementation ships in
/// this workspace ([`crate::simulated::SimulatedExchange`]) — concrete
/// wire adapters for real venues are a Non-goal (spec §16).
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Subscribe to a set of pairs; ticker events are delivered in
    /// arrival order per pair (spec §6). The returned stream represents
    /// one live connection — reconnection with resubscription is the
    /// implementation's responsibility.
    async fn subscribe(&self, pairs: &[Pair]) -> Result<TickerStream, ExchangeError>;

    /// `true` if the streaming connection is currently healthy.
    async fn health(&self) -> bool;

    async fn get_candles(
        &self,
        pair: &Pair,
        interval: CandleInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn list_balances(&self) -> Result<HashMap<String, crate::balance::AccountBalance>, ExchangeError>;

    async fn submit_market_order(
        &self,
        order: SubmitMarketOrder,
    ) -> Result<ExchangeOrderId, ExchangeError>;

    async fn get_order(&self, id: &ExchangeOrderId) -> Result<OrderStatusResponse, ExchangeError>;
}
