use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Simple moving average, updated incrementally.
#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    period: usize,
    values: VecDeque<Decimal>,
    sum: Decimal,
}

impl SimpleMovingAverage {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            values: VecDeque::new(),
            sum: Decimal::ZERO,
        }
    }

    pub fn update(&mut self, value: Decimal) -> Decimal {
        self.values.push_back(value);
        self.sum += value;
        if self.values.len() > self.period {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.average()
    }

    pub fn average(&self) -> Decimal {
        if self.values.is_empty() {
            Decimal::ZERO
        } else {
            self.sum / Decimal::from(self.values.len() as u64)
        }
    }

    pub fn is_ready(&self) -> bool {
        self.values.len() >= self.period
    }
}

/// Exponential moving average, updated incrementally.
#[derive(Debug, Clone)]
pub struct ExponentialMovingAverage {
    multiplier: Decimal,
    value: Option<Decimal>,
}

impl ExponentialMovingAverage {
    pub fn new(period: usize) -> Self {
        let multiplier = Decimal::from(2u64) / Decimal::from(period as u64 + 1);
        Self {
            multiplier,
            value: None,
        }
    }

    pub fn update(&mut self, price: Decimal) -> Decimal {
        match self.value {
            Some(val) => {
                let next = (price - val) * self.multiplier + val;
                self.value = Some(next);
                next
            }
            None => {
                self.value = Some(price);
                price
            }
        }
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }
}

/// Run a [`SimpleMovingAverage`] over a full series, one-shot. Returns
/// `None` if `values` has fewer than `period` entries (spec §4.E:
/// "Insufficient history ... returns 'no signal'").
pub fn sma_series(values: &[Decimal], period: usize) -> Option<Decimal> {
    if values.len() < period {
        return None;
    }
    let mut sma = SimpleMovingAverage::new(period);
    let mut last = Decimal::ZERO;
    for &v in values {
        last = sma.update(v);
    }
    Some(last)
}

/// Run an [`ExponentialMovingAverage`] over a full series, one-shot.
/// Returns `None` if `values` has fewer than `period` entries.
pub fn ema_series(values: &[Decimal], period: usize) -> Option<Decimal> {
    if values.len() < period {
        return None;
    }
    let mut ema = ExponentialMovingAverage::new(period);
    let mut last = Decimal::ZERO;
    for &v in values {
        last = ema.update(v);
    }
    Some(last)
}
