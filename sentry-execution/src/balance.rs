use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-currency balance as reported by `listBalances()` (spec §6):
/// `{available, held}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct AccountBalance {
    pub available: Decimal,
    pub held: Decimal,
}

impl AccountBalance {
    pub fn total(&self) -> Decimal {
        self.available + self.held
    }
}

/// An [`AccountBalance`] together with the instant it was observed, as
/// returned by the [`crate::account_cache::AccountCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedBalance {
    pub balance: AccountBalance,
    pub observed_at: DateTime<Utc>,
}

impl CachedBalance {
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.observed_at
    }
}
