use crate::Pair;
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single price observation from the streaming feed, `{pair, price, ts}`.
///
/// `ts` is a monotonic timestamp from the exchange's perspective, not a
/// wall-clock guarantee — [`crate`] consumers must drop ticks whose `ts`
/// does not strictly advance past the last one seen for the pair (spec
/// §3, §6).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Ticker {
    pub pair: Pair,
    pub price: Decimal,
    pub ts: DateTime<Utc>,
}

impl Ticker {
    /// `true` if `self` is newer than `other` under the latest-wins rule.
    ///
    /// A tick whose `ts` equals the last seen `ts` is dropped (spec §8
    /// boundary behaviour) — this is `>`, not `>=`.
    pub fn supersedes(&self, other: &Ticker) -> bool {
        self.ts > other.ts
    }
}
