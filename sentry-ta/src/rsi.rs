use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Wilder-smoothed RSI over `closes`, period `period`. Returns `None` if
/// fewer than `period + 1` closes are available (one delta is needed per
/// period, plus the seed close).
pub fn rsi(closes: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let deltas: Vec<Decimal> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let (seed_gains, seed_losses) = deltas[..period].iter().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(gains, losses), &d| {
            if d > Decimal::ZERO {
                (gains + d, losses)
            } else {
                (gains, losses - d)
            }
        },
    );
    let mut avg_gain = seed_gains / Decimal::from(period as u64);
    let mut avg_loss = seed_losses / Decimal::from(period as u64);

    for &d in &deltas[period..] {
        let (gain, loss) = if d > Decimal::ZERO {
            (d, Decimal::ZERO)
        } else {
            (Decimal::ZERO, -d)
        };
        let n = Decimal::from(period as u64);
        avg_gain = (avg_gain * (n - Decimal::ONE) + gain) / n;
        avg_loss = (avg_loss * (n - Decimal::ONE) + loss) / n;
    }

    Some(if avg_loss == Decimal::ZERO {
        dec!(100)
    } else {
        let rs = avg_gain / avg_loss;
        dec!(100) - (dec!(100) / (Decimal::ONE + rs))
    })
}

/// Map an RSI value in `[0, 100]` to a signed sub-score in `[-1, +1]`:
/// linearly interpolate from `buy_threshold` (-> -1) through 50 (-> 0)
/// to `sell_threshold` (-> +1), clamped outside that range (spec §4.E).
pub fn rsi_to_subscore(rsi: Decimal, buy_threshold: Decimal, sell_threshold: Decimal) -> Decimal {
    let fifty = dec!(50);
    if rsi <= buy_threshold {
        return -Decimal::ONE;
    }
    if rsi >= sell_threshold {
        return Decimal::ONE;
    }
    if rsi <= fifty {
        // interpolate [buy_threshold, 50] -> [-1, 0]
        let span = fifty - buy_threshold;
        if span == Decimal::ZERO {
            return Decimal::ZERO;
        }
        -Decimal::ONE + (rsi - buy_threshold) / span
    } else {
        // interpolate [50, sell_threshold] -> [0, 1]
        let span = sell_threshold - fifty;
        if span == Decimal::ZERO {
            return Decimal::ZERO;
        }
        (rsi - fifty) / span
    }
}
