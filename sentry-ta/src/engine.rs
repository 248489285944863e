use crate::config::{SignalConfig, SignalKind};
use crate::indicators::{ema_series, sma_series};
use crate::patterns::{ma_crossover_subscore, macd_subscore};
use crate::rsi::{rsi, rsi_to_subscore};
use rust_decimal::Decimal;
use sentry_instrument::Candle;

/// Outcome of one [`IndicatorEngine::evaluate`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    /// A combined signed score in `[-1, +1]`.
    Value(Decimal),
    /// Not enough candle history for at least one enabled signal.
    NoSignal,
}

impl Score {
    pub fn value(self) -> Decimal {
        match self {
            Score::Value(v) => v,
            Score::NoSignal => Decimal::ZERO,
        }
    }
}

/// Coarse display bucket over `|score|` (spec §4.E). Pure function of
/// the score magnitude — the same score always yields the same
/// temperature (spec §8 property 5).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Temperature {
    Hot,
    Warm,
    Cool,
    Frozen,
}

pub fn temperature(score: Decimal) -> Temperature {
    let magnitude = score.abs();
    if magnitude >= Decimal::new(3, 1) {
        Temperature::Hot
    } else if magnitude >= Decimal::new(15, 2) {
        Temperature::Warm
    } else if magnitude >= Decimal::new(5, 2) {
        Temperature::Cool
    } else {
        Temperature::Frozen
    }
}

/// Pure, stateless given a candle series: computes RSI / MA-crossover /
/// MACD sub-scores and combines them into a single signed weighted score
/// (spec §4.E).
#[derive(Debug, Default, Clone, Copy)]
pub struct IndicatorEngine;

impl IndicatorEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `signals` against `candles` (oldest first). Returns
    /// [`Score::NoSignal`] if any enabled signal lacks sufficient
    /// history (spec §4.E).
    pub fn evaluate(&self, signals: &[SignalConfig], candles: &[Candle]) -> Score {
        let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();

        let mut total = Decimal::ZERO;
        for signal in signals {
            if closes.len() < signal.kind.required_history() {
                return Score::NoSignal;
            }
            let Some(subscore) = self.subscore(&signal.kind, &closes) else {
                return Score::NoSignal;
            };
            total += subscore * signal.weight;
        }

        Score::Value(total.clamp(-Decimal::ONE, Decimal::ONE))
    }

    fn subscore(&self, kind: &SignalKind, closes: &[Decimal]) -> Option<Decimal> {
        match kind {
            SignalKind::Rsi(p) => {
                let value = rsi(closes, p.period)?;
                Some(rsi_to_subscore(value, p.buy_threshold, p.sell_threshold))
            }
            SignalKind::MaCrossover(p) => {
                let fast = sma_series(closes, p.fast_period)?;
                let slow = sma_series(closes, p.slow_period)?;
                Some(ma_crossover_subscore(fast, slow))
            }
            SignalKind::Macd(p) => {
                let fast_ema = ema_series(closes, p.fast_period)?;
                let slow_ema = ema_series(closes, p.slow_period)?;
                let macd_line = fast_ema - slow_ema;
                // signal line: EMA of the macd line over its own recent
                // history. We approximate by recomputing the macd series
                // tail and smoothing it, which only needs `signal_period`
                // extra closes beyond the slow EMA's own requirement.
                let macd_series: Vec<Decimal> = (0..=closes.len().saturating_sub(p.slow_period))
                    .filter_map(|i| {
                        let window = &closes[..p.slow_period + i];
                        let f = ema_series(window, p.fast_period)?;
                        let s = ema_series(window, p.slow_period)?;
                        Some(f - s)
                    })
                    .collect();
                let signal_line = ema_series(&macd_series, p.signal_period)?;
                let histogram = macd_line - signal_line;
                Some(macd_subscore(histogram, slow_ema))
            }
        }
    }
}
