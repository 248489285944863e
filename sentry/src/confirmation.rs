use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sentry_instrument::Side;

/// A non-HOLD trading intent (spec §3 `OrderIntent.side`, §4.G step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Buy,
    Sell,
    Hold,
}

impl Intent {
    pub fn from_score(score: Decimal, buy_threshold: Decimal, sell_threshold: Decimal) -> Self {
        if score <= -buy_threshold {
            Intent::Buy
        } else if score >= sell_threshold {
            Intent::Sell
        } else {
            Intent::Hold
        }
    }

    pub fn side(self) -> Option<Side> {
        match self {
            Intent::Buy => Some(Side::Buy),
            Intent::Sell => Some(Side::Sell),
            Intent::Hold => None,
        }
    }

    pub fn opposes(self, other: Intent) -> bool {
        matches!(
            (self, other),
            (Intent::Buy, Intent::Sell) | (Intent::Sell, Intent::Buy)
        )
    }
}

/// A bot's active confirmation window (spec §3 ephemeral state, §4.G
/// step 6; §9: "a single `Confirmation` value... as a sum type" — here
/// the sum is represented by `Option<Confirmation>`, absent meaning no
/// active window).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Confirmation {
    pub action: Intent,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub action_at_start: Intent,
    pub score_at_start: Decimal,
}

impl Confirmation {
    pub fn start(action: Intent, score: Decimal, now: DateTime<Utc>, confirmation_minutes: i64) -> Self {
        Self {
            action,
            started_at: now,
            deadline: now + chrono::Duration::minutes(confirmation_minutes),
            action_at_start: action,
            score_at_start: score,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}

/// Why a bot is not currently acting (spec §7 "User-visible behavior").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingReason {
    NoSignal,
    Confirming,
    CoolingDown,
    PendingOrder,
    InsufficientBalance,
    AwaitingPriceStep,
    AuthDegraded,
}
