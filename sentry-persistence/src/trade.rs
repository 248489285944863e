use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sentry_execution::{ExchangeOrderId, TradeStatus};
use sentry_instrument::{Pair, Side};
use serde::{Deserialize, Serialize};

/// The durable counterpart of [`sentry_execution::TradeRecord`] (spec
/// §3, §6). Created either `pending` with an already-confirmed
/// `exchange_order_id`, or directly `failed` with no order id for a
/// submit-time validation error (spec §4.H step 6); transitioned to a
/// terminal status by the reconciler; never deleted.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PersistedTradeRecord {
    pub id: i64,
    pub bot_id: i64,
    pub pair: Pair,
    pub side: Side,
    pub submitted_notional_usd: Decimal,
    pub submitted_at: DateTime<Utc>,
    /// Nullable only until submission is confirmed (spec §3).
    pub exchange_order_id: Option<ExchangeOrderId>,
    pub status: TradeStatus,
    pub filled_at: Option<DateTime<Utc>>,
    pub origin_score: Decimal,
    pub failure_reason: Option<String>,
}
