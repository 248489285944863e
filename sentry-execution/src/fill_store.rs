use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sentry_instrument::{Pair, Side};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An exchange-reported execution of (part of) an order — the
/// authoritative unit for P&L (spec §3).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Fill {
    /// Exchange-unique idempotency key.
    pub fill_id: String,
    pub exchange_order_id: String,
    pub pair: Pair,
    pub side: Side,
    pub base_qty: Decimal,
    pub quote_value_usd: Decimal,
    pub price: Decimal,
    pub commission_usd: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// Append-only log of exchange-confirmed fills, keyed by `fill_id`
/// (spec §2.C, §4.C). The sole input to [`crate`]'s PnL calculation.
#[derive(Debug, Default)]
pub struct FillStore {
    // Insertion-ordered per pair so `fills_for_pair` can return in
    // `executed_at` order without re-sorting on every read (spec §5:
    // "Fills are appended in executed_at order within a pair").
    by_pair: parking_lot::RwLock<HashMap<Pair, Vec<Fill>>>,
    seen_ids: parking_lot::RwLock<std::collections::HashSet<String>>,
}

impl FillStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `fill` if its `fill_id` is new; otherwise a no-op (spec
    /// §4.C, §8 properties 3 and 10 — idempotent regardless of how many
    /// reconciliation sweeps observe the same fill).
    pub fn append(&self, fill: Fill) -> bool {
        {
            let mut seen = self.seen_ids.write();
            if !seen.insert(fill.fill_id.clone()) {
                return false;
            }
        }
        self.by_pair
            .write()
            .entry(fill.pair.clone())
            .or_default()
            .push(fill);
        true
    }

    /// Enumerate fills for a pair in `executed_at` order, with `fill_id`
    /// as the tie-break for identical timestamps (spec §5).
    pub fn fills_for_pair(&self, pair: &Pair) -> Vec<Fill> {
        let mut fills = self
            .by_pair
            .read()
            .get(pair)
            .cloned()
            .unwrap_or_default();
        fills.sort_by(|a, b| a.executed_at.cmp(&b.executed_at).then_with(|| a.fill_id.cmp(&b.fill_id)));
        fills
    }

    pub fn len(&self) -> usize {
        self.by_pair.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(id: &str, ts_secs: i64) -> Fill {
        Fill {
            fill_id: id.to_string(),
            exchange_order_id: "order-1".to_string(),
            pair: Pair::from("BTC-USD"),
            side: Side::Buy,
            base_qty: dec!(0.0002),
            quote_value_usd: dec!(10),
            price: dec!(50000),
            commission_usd: dec!(0.05),
            executed_at: DateTime::from_timestamp(ts_secs, 0).unwrap(),
        }
    }

    #[test]
    fn duplicate_fill_id_is_no_op() {
        let store = FillStore::new();
        assert!(store.append(fill("f1", 1)));
        assert!(!store.append(fill("f1", 1)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn replaying_fills_any_number_of_times_is_idempotent() {
        let store = FillStore::new();
        let fills = vec![fill("f1", 1), fill("f2", 2)];
        for _ in 0..5 {
            for f in &fills {
                store.append(f.clone());
            }
        }
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn fills_returned_in_executed_at_order() {
        let store = FillStore::new();
        store.append(fill("f2", 2));
        store.append(fill("f1", 1));
        let pair = Pair::from("BTC-USD");
        let fills = store.fills_for_pair(&pair);
        assert_eq!(fills[0].fill_id, "f1");
        assert_eq!(fills[1].fill_id, "f2");
    }

    #[test]
    fn tie_broken_by_fill_id_for_identical_timestamps() {
        let store = FillStore::new();
        store.append(fill("fb", 1));
        store.append(fill("fa", 1));
        let pair = Pair::from("BTC-USD");
        let fills = store.fills_for_pair(&pair);
        assert_eq!(fills[0].fill_id, "fa");
        assert_eq!(fills[1].fill_id, "fb");
    }
}
