use crate::candle_cache::CandleCache;
use crate::confirmation::{BlockingReason, Confirmation, Intent};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sentry_execution::{AccountCache, ExchangeClient, ExecutionOutcome, OrderIntent};
use sentry_instrument::{CandleInterval, Pair, Side, Ticker};
use sentry_persistence::TradeEnvelope;
use sentry_ta::{IndicatorEngine, SignalConfig, Temperature};
use std::sync::Arc;

/// Minimum USD a bot needs on hand to even attempt a BUY (spec §4.G
/// step 1 default).
pub const MIN_USD_PRECHECK: Decimal = rust_decimal::Decimal::from_parts(5, 0, 0, false, 0);
/// Default BUY/SELL activation threshold on the combined score (spec
/// §4.G step 3).
pub const DEFAULT_ACTION_THRESHOLD: Decimal = rust_decimal::Decimal::from_parts(5, 0, 0, false, 2); // 0.05

/// Everything the evaluator needs to know about its bot (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct BotEvaluatorConfig {
    pub bot_id: i64,
    pub pair: Pair,
    pub signals: Vec<SignalConfig>,
    pub envelope: TradeEnvelope,
}

/// Snapshot of a bot's observable state (spec §4.G step 7, §7
/// "User-visible behavior").
#[derive(Debug, Clone, PartialEq)]
pub struct BotStatusSnapshot {
    pub score: Decimal,
    pub temperature: Temperature,
    pub next_action: Intent,
    pub blocking_reason: Option<BlockingReason>,
    pub confirmation: Option<Confirmation>,
}

/// Per-bot state machine (spec §4.G). Owns its ephemeral state
/// exclusively; evaluated serially, one tick at a time, never
/// re-entered (spec §5 "within a bot worker, tick handling is
/// serialized").
pub struct BotEvaluator {
    config: BotEvaluatorConfig,
    engine: IndicatorEngine,
    candle_cache: CandleCache,
    confirmation: Option<Confirmation>,
    last_completed_trade_at: Option<DateTime<Utc>>,
    last_completed_trade_price: Option<Decimal>,
}

impl BotEvaluator {
    pub fn new(config: BotEvaluatorConfig, candle_interval: CandleInterval, candle_history: usize) -> Self {
        let candle_cache = CandleCache::new(config.pair.clone(), candle_interval, candle_history);
        Self {
            config,
            engine: IndicatorEngine::new(),
            candle_cache,
            confirmation: None,
            last_completed_trade_at: None,
            last_completed_trade_price: None,
        }
    }

    /// Replace the bot's config wholesale (spec §3: "replaced, never
    /// mutated, when a config change is observed").
    pub fn replace_config(&mut self, config: BotEvaluatorConfig) {
        self.config = config;
    }

    /// Called by the reconciler/executor once an order this bot placed
    /// reaches a terminal `completed` status, to anchor cooldown and
    /// the price-step gate (spec §4.G steps 4–5).
    pub fn record_completed_trade(&mut self, at: DateTime<Utc>, price: Decimal) {
        self.last_completed_trade_at = Some(at);
        self.last_completed_trade_price = Some(price);
    }

    /// Run one tick of the seven-step algorithm (spec §4.G). Returns
    /// the bot's new observable status and, if step 6 concluded a
    /// confirmation window, an [`OrderIntent`] for the executor.
    pub async fn evaluate<C: ExchangeClient + ?Sized>(
        &mut self,
        client: &C,
        account_cache: &AccountCache,
        ticker: &Ticker,
        now: DateTime<Utc>,
    ) -> (BotStatusSnapshot, Option<OrderIntent>) {
        // Step 1: optimization pre-check.
        if self.config.envelope.skip_signals_on_low_balance {
            if let Some(reason) = self.low_balance_reason(account_cache).await {
                return (
                    BotStatusSnapshot {
                        score: Decimal::ZERO,
                        temperature: Temperature::Frozen,
                        next_action: Intent::Hold,
                        blocking_reason: Some(reason),
                        confirmation: None,
                    },
                    None,
                );
            }
        }

        // Step 2: score.
        let candles = match self.candle_cache.get(client, now).await {
            Ok(candles) => candles,
            Err(_) => {
                return (
                    BotStatusSnapshot {
                        score: Decimal::ZERO,
                        temperature: Temperature::Frozen,
                        next_action: Intent::Hold,
                        blocking_reason: Some(BlockingReason::NoSignal),
                        confirmation: self.confirmation,
                    },
                    None,
                )
            }
        };
        let score = self.engine.evaluate(&self.config.signals, candles).value();
        let temperature = sentry_ta::engine::temperature(score);

        // Step 3: raw intent.
        let raw_intent = Intent::from_score(score, DEFAULT_ACTION_THRESHOLD, DEFAULT_ACTION_THRESHOLD);

        // Step 4: cooldown.
        if let Some(last_trade_at) = self.last_completed_trade_at {
            let cooldown = chrono::Duration::minutes(self.config.envelope.cooldown_minutes);
            if now - last_trade_at < cooldown {
                self.confirmation = None;
                return (
                    BotStatusSnapshot {
                        score,
                        temperature,
                        next_action: Intent::Hold,
                        blocking_reason: Some(BlockingReason::CoolingDown),
                        confirmation: None,
                    },
                    None,
                );
            }
        }

        // Step 5: price-step gate.
        if raw_intent != Intent::Hold {
            if let (Some(min_step), Some(last_price)) =
                (self.config.envelope.min_price_step_pct, self.last_completed_trade_price)
            {
                if min_step > Decimal::ZERO && !last_price.is_zero() {
                    // Signed, not magnitude: the price must have moved by
                    // at least min_step *in the intent's direction* (down
                    // for BUY, up for SELL). A large move the wrong way
                    // still blocks.
                    let moved_pct = (ticker.price - last_price) / last_price;
                    let advanced = match raw_intent {
                        Intent::Buy => moved_pct <= -min_step,
                        Intent::Sell => moved_pct >= min_step,
                        Intent::Hold => true,
                    };
                    if !advanced {
                        self.confirmation = None;
                        return (
                            BotStatusSnapshot {
                                score,
                                temperature,
                                next_action: Intent::Hold,
                                blocking_reason: Some(BlockingReason::AwaitingPriceStep),
                                confirmation: None,
                            },
                            None,
                        );
                    }
                }
            }
        }

        // Step 6: confirmation window.
        let mut emitted_intent = None;
        match (raw_intent, self.confirmation) {
            (Intent::Hold, _) => {
                self.confirmation = None;
            }
            (intent, Some(active)) if intent == active.action => {
                if active.is_due(now) {
                    emitted_intent = Some(OrderIntent {
                        bot_id: self.config.bot_id,
                        pair: self.config.pair.clone(),
                        side: intent.side().expect("non-hold intent has a side"),
                        notional_usd: self.config.envelope.position_size_usd,
                        reference_price: ticker.price,
                        origin_score: score,
                    });
                    self.confirmation = None;
                }
            }
            (intent, Some(active)) if intent.opposes(active.action) => {
                self.confirmation = Some(Confirmation::start(
                    intent,
                    score,
                    now,
                    self.config.envelope.confirmation_minutes,
                ));
            }
            (intent, None) => {
                self.confirmation = Some(Confirmation::start(
                    intent,
                    score,
                    now,
                    self.config.envelope.confirmation_minutes,
                ));
            }
            _ => {}
        }

        // Step 7: publish status.
        let blocking_reason = if emitted_intent.is_some() {
            None
        } else if self.confirmation.is_some() {
            Some(BlockingReason::Confirming)
        } else {
            Some(BlockingReason::NoSignal)
        };

        (
            BotStatusSnapshot {
                score,
                temperature,
                next_action: raw_intent,
                blocking_reason,
                confirmation: self.confirmation,
            },
            emitted_intent,
        )
    }

    async fn low_balance_reason(&self, account_cache: &AccountCache) -> Option<BlockingReason> {
        let base_currency = self.config.pair.as_str().split('-').next().unwrap_or("");
        let usd_ok = account_cache
            .get("USD")
            .await
            .map(|b| b.balance.available >= MIN_USD_PRECHECK)
            .unwrap_or(false);
        let base_ok = account_cache
            .get(base_currency)
            .await
            .map(|b| !b.balance.available.is_zero())
            .unwrap_or(false);
        if !usd_ok && !base_ok {
            Some(BlockingReason::InsufficientBalance)
        } else {
            None
        }
    }

    /// Whether the last known `ExecutionOutcome` should be surfaced
    /// instead of this evaluator's own blocking reason (spec §7:
    /// `pending_order` / `insufficient_balance` come from the
    /// executor, not the evaluator).
    pub fn blocking_reason_from_outcome(outcome: &ExecutionOutcome) -> Option<BlockingReason> {
        match outcome {
            ExecutionOutcome::Dropped {
                reason: sentry_execution::DropReason::PendingOrder,
            } => Some(BlockingReason::PendingOrder),
            ExecutionOutcome::Dropped {
                reason: sentry_execution::DropReason::InsufficientBalance,
            } => Some(BlockingReason::InsufficientBalance),
            _ => None,
        }
    }
}
