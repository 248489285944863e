use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Clamp applied to normalized crossover/MACD magnitudes before they are
/// scaled into `[-1, +1]` (spec §4.E, §9 open question — curve pinned
/// here and locked down by the tests below).
pub const MAGNITUDE_CLAMP: Decimal = dec!(0.02);

/// Normalize `(fast - slow) / slow` into a signed sub-score in
/// `[-1, +1]`: the ratio is clamped to `±MAGNITUDE_CLAMP` and then
/// scaled so the clamp boundary maps to `±1`.
pub fn normalize_magnitude(fast: Decimal, slow: Decimal) -> Decimal {
    if slow == Decimal::ZERO {
        return Decimal::ZERO;
    }
    let ratio = (fast - slow) / slow;
    let clamped = ratio.clamp(-MAGNITUDE_CLAMP, MAGNITUDE_CLAMP);
    clamped / MAGNITUDE_CLAMP
}

/// Sub-score for a fast/slow moving-average crossover: sign of
/// `(fast - slow)` scaled by the normalized magnitude (spec §4.E).
pub fn ma_crossover_subscore(fast: Decimal, slow: Decimal) -> Decimal {
    normalize_magnitude(fast, slow)
}

/// Sub-score for a MACD histogram: sign of the histogram, magnitude
/// normalized relative to the slow EMA the same way the MA crossover is
/// normalized relative to its slow leg (spec §4.E, §9).
pub fn macd_subscore(histogram: Decimal, slow_ema: Decimal) -> Decimal {
    let reference = slow_ema.abs();
    if reference == Decimal::ZERO {
        return Decimal::ZERO;
    }
    let ratio = histogram / reference;
    let clamped = ratio.clamp(-MAGNITUDE_CLAMP, MAGNITUDE_CLAMP);
    clamped / MAGNITUDE_CLAMP
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_at_boundary() {
        // fast 2% above slow -> exactly +1
        let slow = dec!(100);
        let fast = dec!(102);
        assert_eq!(normalize_magnitude(fast, slow), Decimal::ONE);
    }

    #[test]
    fn normalize_beyond_boundary_still_clamped() {
        let slow = dec!(100);
        let fast = dec!(110); // 10% above, way past the 2% clamp
        assert_eq!(normalize_magnitude(fast, slow), Decimal::ONE);
    }

    #[test]
    fn normalize_halfway_to_boundary() {
        // fast 1% above slow -> halfway to the clamp -> +0.5
        let slow = dec!(100);
        let fast = dec!(101);
        assert_eq!(normalize_magnitude(fast, slow), dec!(0.5));
    }

    #[test]
    fn normalize_negative_direction() {
        let slow = dec!(100);
        let fast = dec!(98);
        assert_eq!(normalize_magnitude(fast, slow), -Decimal::ONE);
    }
}

#[cfg(test)]
mod macd_tests {
    use super::*;

    #[test]
    fn macd_subscore_pins_sign_and_clamp() {
        assert_eq!(macd_subscore(dec!(2), dec!(100)), Decimal::ONE);
        assert_eq!(macd_subscore(dec!(-2), dec!(100)), -Decimal::ONE);
        assert_eq!(macd_subscore(dec!(1), dec!(100)), dec!(0.5));
        assert_eq!(macd_subscore(dec!(0), dec!(100)), Decimal::ZERO);
    }
}
