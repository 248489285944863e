//! FIFO cost-basis P&L over a pair's fill history (spec §4.I).

use rust_decimal::Decimal;
use sentry_execution::Fill;
use sentry_instrument::Side;
use std::collections::VecDeque;

/// An open BUY lot awaiting SELL matches.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Lot {
    remaining_base: Decimal,
    unit_cost_usd: Decimal,
}

/// Realized, unrealized and total P&L for one pair, plus the remaining
/// open lots (spec §4.I).
#[derive(Debug, Clone, PartialEq)]
pub struct PnLSnapshot {
    pub realized_usd: Decimal,
    pub unrealized_usd: Decimal,
    pub open_base_qty: Decimal,
}

impl PnLSnapshot {
    pub fn total_usd(&self) -> Decimal {
        self.realized_usd + self.unrealized_usd
    }
}

/// Replays a pair's fills in `executed_at` order through a FIFO queue
/// of open BUY lots (spec §4.I). Buying and holding with no sells
/// yields `realized = 0`, never `realized = -cost_basis` (spec §4.I,
/// §8 properties 8–9 — the historical bug this corrects).
#[derive(Debug, Default)]
pub struct PnLCalculator {
    open_lots: VecDeque<Lot>,
    realized_usd: Decimal,
}

impl PnLCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay `fills` (already in `executed_at` order, per
    /// [`sentry_execution::FillStore::fills_for_pair`]) from scratch.
    pub fn from_fills(fills: &[Fill]) -> Self {
        let mut calc = Self::new();
        for fill in fills {
            calc.apply(fill);
        }
        calc
    }

    pub fn apply(&mut self, fill: &Fill) {
        match fill.side {
            Side::Buy => {
                let unit_cost = if fill.base_qty.is_zero() {
                    Decimal::ZERO
                } else {
                    fill.quote_value_usd / fill.base_qty
                };
                self.open_lots.push_back(Lot {
                    remaining_base: fill.base_qty,
                    unit_cost_usd: unit_cost,
                });
                self.realized_usd -= fill.commission_usd;
            }
            Side::Sell => {
                let sell_price = if fill.base_qty.is_zero() {
                    Decimal::ZERO
                } else {
                    fill.quote_value_usd / fill.base_qty
                };
                let mut remaining_to_match = fill.base_qty;
                while remaining_to_match > Decimal::ZERO {
                    let Some(lot) = self.open_lots.front_mut() else {
                        // Selling more than has ever been bought (e.g. a
                        // pre-existing position outside this fill
                        // history) — treat the excess as zero-cost.
                        self.realized_usd += remaining_to_match * sell_price;
                        remaining_to_match = Decimal::ZERO;
                        break;
                    };
                    let matched = remaining_to_match.min(lot.remaining_base);
                    self.realized_usd += matched * (sell_price - lot.unit_cost_usd);
                    lot.remaining_base -= matched;
                    remaining_to_match -= matched;
                    if lot.remaining_base <= Decimal::ZERO {
                        self.open_lots.pop_front();
                    }
                }
                self.realized_usd -= fill.commission_usd;
            }
        }
    }

    pub fn snapshot(&self, current_price: Decimal) -> PnLSnapshot {
        let mut unrealized = Decimal::ZERO;
        let mut open_base_qty = Decimal::ZERO;
        for lot in &self.open_lots {
            unrealized += lot.remaining_base * (current_price - lot.unit_cost_usd);
            open_base_qty += lot.remaining_base;
        }
        PnLSnapshot {
            realized_usd: self.realized_usd,
            unrealized_usd: unrealized,
            open_base_qty,
        }
    }
}
