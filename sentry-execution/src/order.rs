use crate::client::ExchangeOrderId;
use crate::error::OrderTrackerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sentry_instrument::{Pair, Side};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum TradeStatus {
    Pending,
    Completed,
    Failed,
}

impl TradeStatus {
    fn as_str(self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Completed => "completed",
            TradeStatus::Failed => "failed",
        }
    }
}

/// The locally tracked order (spec §3 `TradeRecord`). Created either by
/// [`OrderTracker::create_pending`] (submission confirmed) or
/// [`OrderTracker::create_failed`] (submission never reached the
/// exchange), and only ever transitioned forward from there.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub id: i64,
    pub bot_id: i64,
    pub pair: Pair,
    pub side: Side,
    pub submitted_notional_usd: Decimal,
    pub submitted_at: DateTime<Utc>,
    /// Nullable only until submission is confirmed (spec §3) — `None`
    /// for a record created directly as `failed` by
    /// [`OrderTracker::create_failed`].
    pub exchange_order_id: Option<ExchangeOrderId>,
    pub status: TradeStatus,
    pub filled_at: Option<DateTime<Utc>>,
    pub origin_score: Decimal,
    pub failure_reason: Option<String>,
}

/// How long a pending record has gone unresolved, for operator attention
/// (spec §4.D: flagged at 10 min, critical at 30 min — never
/// auto-failed, the fill may still arrive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationHealth {
    Ok,
    Warning,
    Critical,
}

/// The `pending -> {completed, failed}` state machine (spec §4.D).
/// Transitions are compare-and-set on the current status; terminal
/// states are write-once (spec §5).
pub struct OrderTracker {
    next_id: AtomicI64,
    records: parking_lot::RwLock<HashMap<i64, TradeRecord>>,
    // Enforces the single-outstanding-order rule: at most one pending
    // TradeRecord per bot at a time.
    pending_by_bot: parking_lot::RwLock<HashMap<i64, i64>>,
    warning_after: chrono::Duration,
    critical_after: chrono::Duration,
}

impl OrderTracker {
    pub fn new(warning_after: Duration, critical_after: Duration) -> Self {
        Self {
            next_id: AtomicI64::new(1),
            records: parking_lot::RwLock::new(HashMap::new()),
            pending_by_bot: parking_lot::RwLock::new(HashMap::new()),
            warning_after: chrono::Duration::from_std(warning_after)
                .unwrap_or(chrono::Duration::minutes(10)),
            critical_after: chrono::Duration::from_std(critical_after)
                .unwrap_or(chrono::Duration::minutes(30)),
        }
    }

    pub fn has_pending(&self, bot_id: i64) -> bool {
        self.pending_by_bot.read().contains_key(&bot_id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_pending(
        &self,
        bot_id: i64,
        pair: Pair,
        side: Side,
        submitted_notional_usd: Decimal,
        origin_score: Decimal,
        exchange_order_id: ExchangeOrderId,
        now: DateTime<Utc>,
    ) -> Result<TradeRecord, OrderTrackerError> {
        let mut pending_by_bot = self.pending_by_bot.write();
        if let Some(&existing_id) = pending_by_bot.get(&bot_id) {
            return Err(OrderTrackerError::AlreadyPending {
                bot_id,
                existing_id,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = TradeRecord {
            id,
            bot_id,
            pair,
            side,
            submitted_notional_usd,
            submitted_at: now,
            exchange_order_id: Some(exchange_order_id),
            status: TradeStatus::Pending,
            filled_at: None,
            origin_score,
            failure_reason: None,
        };
        pending_by_bot.insert(bot_id, id);
        self.records.write().insert(id, record.clone());
        Ok(record)
    }

    /// Create an already-terminal `failed` record for a submit-time
    /// validation error that never reached the exchange (spec §4.H step
    /// 6: no `exchange_order_id` was ever confirmed, so it never
    /// occupies the single-outstanding-order slot).
    #[allow(clippy::too_many_arguments)]
    pub fn create_failed(
        &self,
        bot_id: i64,
        pair: Pair,
        side: Side,
        submitted_notional_usd: Decimal,
        origin_score: Decimal,
        reason: String,
        now: DateTime<Utc>,
    ) -> TradeRecord {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = TradeRecord {
            id,
            bot_id,
            pair,
            side,
            submitted_notional_usd,
            submitted_at: now,
            exchange_order_id: None,
            status: TradeStatus::Failed,
            filled_at: None,
            origin_score,
            failure_reason: Some(reason),
        };
        self.records.write().insert(id, record.clone());
        record
    }

    /// Transition a pending record to `completed` (reconciler observed a
    /// terminal fill).
    pub fn complete(&self, id: i64, filled_at: DateTime<Utc>) -> Result<TradeRecord, OrderTrackerError> {
        self.transition(id, TradeStatus::Completed, Some(filled_at))
    }

    /// Transition a pending record to `failed` (submit-time validation
    /// failure, or reconciler observed cancelled/failed).
    pub fn fail(&self, id: i64) -> Result<TradeRecord, OrderTrackerError> {
        self.transition(id, TradeStatus::Failed, None)
    }

    fn transition(
        &self,
        id: i64,
        to: TradeStatus,
        filled_at: Option<DateTime<Utc>>,
    ) -> Result<TradeRecord, OrderTrackerError> {
        let mut records = self.records.write();
        let record = records.get_mut(&id).ok_or(OrderTrackerError::NotFound { id })?;
        if record.status != TradeStatus::Pending {
            return Err(OrderTrackerError::AlreadyTerminal {
                id,
                status: record.status.as_str(),
            });
        }
        record.status = to;
        record.filled_at = filled_at;
        let updated = record.clone();
        self.pending_by_bot.write().retain(|_, v| *v != id);
        Ok(updated)
    }

    pub fn get(&self, id: i64) -> Option<TradeRecord> {
        self.records.read().get(&id).cloned()
    }

    /// Pending records older than `grace`, for the reconciliation sweep
    /// (spec §4.D).
    pub fn pending_older_than(&self, grace: chrono::Duration, now: DateTime<Utc>) -> Vec<TradeRecord> {
        self.records
            .read()
            .values()
            .filter(|r| r.status == TradeStatus::Pending && now - r.submitted_at >= grace)
            .cloned()
            .collect()
    }

    pub fn reconciliation_health(&self, record: &TradeRecord, now: DateTime<Utc>) -> ReconciliationHealth {
        if record.status != TradeStatus::Pending {
            return ReconciliationHealth::Ok;
        }
        let age = now - record.submitted_at;
        if age >= self.critical_after {
            ReconciliationHealth::Critical
        } else if age >= self.warning_after {
            ReconciliationHealth::Warning
        } else {
            ReconciliationHealth::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tracker() -> OrderTracker {
        OrderTracker::new(Duration::from_secs(600), Duration::from_secs(1800))
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn single_outstanding_order_rule_rejects_second_pending() {
        let tracker = tracker();
        let pair = Pair::from("BTC-USD");
        tracker
            .create_pending(1, pair.clone(), Side::Buy, dec!(10), dec!(-0.2), ExchangeOrderId("e1".into()), now())
            .unwrap();
        let err = tracker
            .create_pending(1, pair, Side::Buy, dec!(10), dec!(-0.2), ExchangeOrderId("e2".into()), now())
            .unwrap_err();
        assert!(matches!(err, OrderTrackerError::AlreadyPending { bot_id: 1, .. }));
    }

    #[test]
    fn different_bots_may_each_have_a_pending_order() {
        let tracker = tracker();
        let pair = Pair::from("BTC-USD");
        tracker
            .create_pending(1, pair.clone(), Side::Buy, dec!(10), dec!(-0.2), ExchangeOrderId("e1".into()), now())
            .unwrap();
        let record = tracker
            .create_pending(2, pair, Side::Buy, dec!(10), dec!(-0.2), ExchangeOrderId("e2".into()), now())
            .unwrap();
        assert_eq!(record.bot_id, 2);
    }

    #[test]
    fn completing_clears_the_single_outstanding_slot() {
        let tracker = tracker();
        let pair = Pair::from("BTC-USD");
        let record = tracker
            .create_pending(1, pair.clone(), Side::Buy, dec!(10), dec!(-0.2), ExchangeOrderId("e1".into()), now())
            .unwrap();
        tracker.complete(record.id, now()).unwrap();
        assert!(!tracker.has_pending(1));
        tracker
            .create_pending(1, pair, Side::Buy, dec!(10), dec!(-0.2), ExchangeOrderId("e3".into()), now())
            .unwrap();
    }

    #[test]
    fn terminal_states_are_immutable() {
        let tracker = tracker();
        let pair = Pair::from("BTC-USD");
        let record = tracker
            .create_pending(1, pair, Side::Buy, dec!(10), dec!(-0.2), ExchangeOrderId("e1".into()), now())
            .unwrap();
        tracker.complete(record.id, now()).unwrap();
        let err = tracker.fail(record.id).unwrap_err();
        assert!(matches!(
            err,
            OrderTrackerError::AlreadyTerminal { status: "completed", .. }
        ));
    }

    #[test]
    fn reconciliation_health_thresholds() {
        let tracker = tracker();
        let pair = Pair::from("BTC-USD");
        let record = tracker
            .create_pending(1, pair, Side::Buy, dec!(10), dec!(-0.2), ExchangeOrderId("e1".into()), now())
            .unwrap();

        assert_eq!(tracker.reconciliation_health(&record, now()), ReconciliationHealth::Ok);
        assert_eq!(
            tracker.reconciliation_health(&record, now() + chrono::Duration::minutes(11)),
            ReconciliationHealth::Warning
        );
        assert_eq!(
            tracker.reconciliation_health(&record, now() + chrono::Duration::minutes(31)),
            ReconciliationHealth::Critical
        );
    }

    #[test]
    fn create_failed_is_terminal_and_does_not_occupy_the_pending_slot() {
        let tracker = tracker();
        let pair = Pair::from("BTC-USD");
        let record = tracker.create_failed(1, pair.clone(), Side::Buy, dec!(10), dec!(-0.2), "below minimum size".to_string(), now());
        assert_eq!(record.status, TradeStatus::Failed);
        assert_eq!(record.exchange_order_id, None);
        assert_eq!(record.failure_reason.as_deref(), Some("below minimum size"));
        assert!(!tracker.has_pending(1));
        tracker
            .create_pending(1, pair, Side::Buy, dec!(10), dec!(-0.2), ExchangeOrderId("e1".into()), now())
            .unwrap();
    }

    #[test]
    fn pending_older_than_filters_by_grace_and_status() {
        let tracker = tracker();
        let pair = Pair::from("BTC-USD");
        let record = tracker
            .create_pending(1, pair, Side::Buy, dec!(10), dec!(-0.2), ExchangeOrderId("e1".into()), now())
            .unwrap();
        let later = now() + chrono::Duration::seconds(45);
        let stale = tracker.pending_older_than(chrono::Duration::seconds(30), later);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, record.id);

        tracker.complete(record.id, later).unwrap();
        let stale_after_complete = tracker.pending_older_than(chrono::Duration::seconds(30), later);
        assert!(stale_after_complete.is_empty());
    }
}
