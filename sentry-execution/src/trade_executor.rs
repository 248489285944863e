use crate::account_cache::AccountCache;
use crate::client::{ExchangeClient, OrderSize, SubmitMarketOrder};
use crate::error::ExchangeError;
use crate::order::{OrderTracker, TradeRecord};
use chrono::Utc;
use rust_decimal::Decimal;
use rand::Rng;
use sentry_instrument::{Pair, Side};
use std::sync::Arc;

/// An evaluated bot decision awaiting submission (spec §3 `OrderIntent`,
/// not persisted).
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub bot_id: i64,
    pub pair: Pair,
    pub side: Side,
    pub notional_usd: Decimal,
    pub reference_price: Decimal,
    pub origin_score: Decimal,
}

/// Outcome of handing an [`OrderIntent`] to the executor, for the
/// daemon's event log.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Placed(TradeRecord),
    Dropped { reason: DropReason },
    Failed { reason: String },
    TransientError { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    PendingOrder,
    InsufficientBalance,
}

/// Minimum tradable increment below which the exchange rejects an
/// order outright (spec §4.H step 3: "apply the exchange's minimum
/// increments").
const MIN_BASE_INCREMENT: Decimal = Decimal::from_parts(1, 0, 0, false, 8); // 0.00000001
const MIN_NOTIONAL_USD: Decimal = Decimal::from_parts(1, 0, 0, false, 0); // 1

/// Turns [`OrderIntent`]s into exchange submissions (spec §4.H). Owns
/// no in-memory bot state; every decision re-derives from [`OrderTracker`]
/// and [`AccountCache`] so the single-outstanding-order rule holds even
/// under concurrent bot workers.
pub struct TradeExecutor<C: ExchangeClient> {
    client: Arc<C>,
    tracker: Arc<OrderTracker>,
    account_cache: Arc<AccountCache>,
}

impl<C: ExchangeClient> TradeExecutor<C> {
    pub fn new(client: Arc<C>, tracker: Arc<OrderTracker>, account_cache: Arc<AccountCache>) -> Self {
        Self {
            client,
            tracker,
            account_cache,
        }
    }

    pub async fn execute(&self, intent: OrderIntent) -> ExecutionOutcome {
        if self.tracker.has_pending(intent.bot_id) {
            return ExecutionOutcome::Dropped {
                reason: DropReason::PendingOrder,
            };
        }

        if let Some(outcome) = self.check_balance(&intent).await {
            return outcome;
        }

        let size = self.compute_size(&intent);
        let order = SubmitMarketOrder {
            pair: intent.pair.clone(),
            side: intent.side,
            size,
            idempotency_key: fresh_idempotency_key(),
        };

        match self.client.submit_market_order(order).await {
            Ok(exchange_order_id) => {
                match self.tracker.create_pending(
                    intent.bot_id,
                    intent.pair,
                    intent.side,
                    intent.notional_usd,
                    intent.origin_score,
                    exchange_order_id,
                    Utc::now(),
                ) {
                    Ok(record) => ExecutionOutcome::Placed(record),
                    Err(err) => ExecutionOutcome::TransientError {
                        reason: err.to_string(),
                    },
                }
            }
            Err(ExchangeError::Validation(reason)) => {
                // No exchange_order_id was ever confirmed, so this never
                // occupies the single-outstanding-order slot (spec §4.H
                // step 6, distinguished from step 7's transient case).
                self.tracker.create_failed(
                    intent.bot_id,
                    intent.pair,
                    intent.side,
                    intent.notional_usd,
                    intent.origin_score,
                    reason.clone(),
                    Utc::now(),
                );
                ExecutionOutcome::Failed { reason }
            }
            Err(err) if err.is_retryable() => ExecutionOutcome::TransientError {
                reason: err.to_string(),
            },
            Err(err) => ExecutionOutcome::Failed {
                reason: err.to_string(),
            },
        }
    }

    async fn check_balance(&self, intent: &OrderIntent) -> Option<ExecutionOutcome> {
        let estimated_fee = intent.notional_usd * Decimal::new(1, 3); // 0.001, a conservative taker-fee estimate
        let sufficient = match intent.side {
            Side::Buy => {
                let usd = match self.account_cache.get("USD").await {
                    Ok(b) => b.balance.available,
                    Err(_) => return Some(failed_balance_lookup()),
                };
                usd >= intent.notional_usd + estimated_fee
            }
            Side::Sell => {
                let base_currency = intent.pair.as_str().split('-').next().unwrap_or("");
                let base = match self.account_cache.get(base_currency).await {
                    Ok(b) => b.balance.available,
                    Err(_) => return Some(failed_balance_lookup()),
                };
                if intent.reference_price.is_zero() {
                    return Some(ExecutionOutcome::Dropped {
                        reason: DropReason::InsufficientBalance,
                    });
                }
                base >= intent.notional_usd / intent.reference_price
            }
        };

        if sufficient {
            None
        } else {
            Some(ExecutionOutcome::Dropped {
                reason: DropReason::InsufficientBalance,
            })
        }
    }

    fn compute_size(&self, intent: &OrderIntent) -> OrderSize {
        match intent.side {
            Side::Buy => {
                let notional = intent.notional_usd.max(MIN_NOTIONAL_USD);
                OrderSize::QuoteNotionalUsd(notional)
            }
            Side::Sell => {
                let base_size = if intent.reference_price.is_zero() {
                    Decimal::ZERO
                } else {
                    intent.notional_usd / intent.reference_price
                };
                OrderSize::BaseSize(round_to_increment(base_size, MIN_BASE_INCREMENT))
            }
        }
    }
}

/// A fresh per-submission token (spec §4.H step 4). Random rather than
/// sequential so it is safe to generate outside any lock.
fn fresh_idempotency_key() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn round_to_increment(value: Decimal, increment: Decimal) -> Decimal {
    if increment.is_zero() {
        return value;
    }
    (value / increment).trunc() * increment
}

fn failed_balance_lookup() -> ExecutionOutcome {
    ExecutionOutcome::TransientError {
        reason: "account balance lookup failed".to_string(),
    }
}
