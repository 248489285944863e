use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance for the "sum of enabled weights == 1.0" invariant (spec
/// §3, §8 property 4).
pub const WEIGHT_TOLERANCE: Decimal = dec!(0.000001);

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RsiParams {
    pub period: usize,
    pub buy_threshold: Decimal,
    pub sell_threshold: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct MaCrossoverParams {
    pub fast_period: usize,
    pub slow_period: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct MacdParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalKind {
    Rsi(RsiParams),
    MaCrossover(MaCrossoverParams),
    Macd(MacdParams),
}

impl SignalKind {
    /// Number of candles needed before this signal can produce a value.
    pub fn required_history(&self) -> usize {
        match self {
            SignalKind::Rsi(p) => p.period + 1,
            SignalKind::MaCrossover(p) => p.slow_period,
            SignalKind::Macd(p) => p.slow_period + p.signal_period,
        }
    }
}

/// One enabled indicator within a bot's signal configuration: what to
/// compute, and how much it contributes to the combined score.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SignalConfig {
    pub kind: SignalKind,
    pub weight: Decimal,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SignalConfigError {
    #[error("signal weights must sum to 1.0 (+/- {tolerance}), got {actual}")]
    WeightsDoNotSumToOne {
        actual: Decimal,
        tolerance: Decimal,
    },
    #[error("signal config must enable at least one indicator")]
    Empty,
}

/// Validate that `signals` is non-empty and its weights sum to 1.0
/// within [`WEIGHT_TOLERANCE`] (spec §3 invariant, §8 property 4).
pub fn validate_signals(signals: &[SignalConfig]) -> Result<(), SignalConfigError> {
    if signals.is_empty() {
        return Err(SignalConfigError::Empty);
    }
    let sum: Decimal = signals.iter().map(|s| s.weight).sum();
    let diff = (sum - Decimal::ONE).abs();
    if diff > WEIGHT_TOLERANCE {
        return Err(SignalConfigError::WeightsDoNotSumToOne {
            actual: sum,
            tolerance: WEIGHT_TOLERANCE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsi(weight: Decimal) -> SignalConfig {
        SignalConfig {
            kind: SignalKind::Rsi(RsiParams {
                period: 14,
                buy_threshold: dec!(30),
                sell_threshold: dec!(70),
            }),
            weight,
        }
    }

    #[test]
    fn exact_one_passes() {
        assert!(validate_signals(&[rsi(Decimal::ONE)]).is_ok());
    }

    #[test]
    fn within_tolerance_passes() {
        assert!(validate_signals(&[rsi(dec!(1.0000005))]).is_ok());
    }

    #[test]
    fn outside_tolerance_fails() {
        assert!(validate_signals(&[rsi(dec!(0.9))]).is_err());
    }

    #[test]
    fn empty_fails() {
        assert_eq!(validate_signals(&[]), Err(SignalConfigError::Empty));
    }
}
