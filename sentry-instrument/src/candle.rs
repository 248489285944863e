use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical candle bucket width. The controller only ever asks an
/// [`crate`]'s `ExchangeClient` for one interval at a time per pair.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum CandleInterval {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    OneHour,
}

impl CandleInterval {
    pub fn as_seconds(self) -> i64 {
        match self {
            CandleInterval::OneMinute => 60,
            CandleInterval::FiveMinutes => 5 * 60,
            CandleInterval::FifteenMinutes => 15 * 60,
            CandleInterval::OneHour => 60 * 60,
        }
    }
}

/// Time-bucketed OHLCV for a pair at a [`CandleInterval`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Candle {
    pub ts: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}
