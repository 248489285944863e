//! Shared identity and market-data types for the trading controller.
//!
//! Every other crate in the workspace depends on this one for the
//! vocabulary of [`Pair`], [`Side`], [`Candle`] and [`Ticker`] so that no
//! two crates invent their own incompatible notion of "a price".

use derive_more::{Constructor, Display};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod candle;
pub mod ticker;

pub use candle::{Candle, CandleInterval};
pub use ticker::Ticker;

/// Exchange-listed trading instrument identifier, e.g. `BTC-USD`.
///
/// Immutable once a [`crate::Pair`] is bound to a bot.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Constructor,
)]
pub struct Pair(pub String);

impl Pair {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Pair {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Pair {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Order side / intent direction.
///
/// Convention fixed by the [`crate`] score direction: positive score
/// biases `Sell`, negative score biases `Buy` (spec §4.E).
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Stable integer identifier for a [`crate`] bot, as assigned by the
/// persistence layer.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash, Deserialize, Serialize, Constructor, Display,
)]
pub struct BotId(pub i64);

/// Money amount denominated in USD quote currency.
///
/// A thin newtype over [`Decimal`] so notional/price/quantity are not
/// accidentally mixed up at call sites.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize, Constructor, Display,
)]
pub struct UsdAmount(pub Decimal);

impl UsdAmount {
    pub const ZERO: UsdAmount = UsdAmount(Decimal::ZERO);
}
