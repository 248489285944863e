use crate::bot_evaluator::{BotEvaluator, BotEvaluatorConfig};
use crate::error::SentryError;
use crate::ticker_router::TickerRouter;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use rust_decimal::Decimal;
use sentry_execution::{
    AccountCache, ExchangeClient, ExchangeOrderId, ExchangeOrderStatus, ExecutionOutcome, OrderTracker,
    TradeExecutor, TradeStatus,
};
use sentry_instrument::{CandleInterval, Pair};
use sentry_persistence::{BotStatus, Persistence, PersistedTradeRecord};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How many historical candles a bot's [`crate::candle_cache::CandleCache`]
/// keeps on hand (spec §4.G: enough history for the slowest configured
/// indicator period).
const CANDLE_HISTORY: usize = 200;

/// Out-of-band events a bot worker reacts to alongside its ticker
/// queue (spec §13 config hot-swap; spec §4.D reconciliation anchoring
/// the cooldown/price-step gate to the fill that just completed).
enum WorkerEvent {
    ConfigUpdated(BotEvaluatorConfig),
    TradeCompleted { at: DateTime<Utc>, price: Decimal },
    /// Sent by [`Daemon::stop_bot`]; the worker finishes the tick
    /// already in flight, then breaks out before picking up another.
    Stop,
}

/// Ties the per-pair ticker fan-out, per-bot evaluation workers, the
/// order executor, and the background reconciler together (spec §5
/// "Concurrency and resource model").
///
/// One `Daemon` per process. Long-running tasks are tracked so
/// `shutdown` can await their completion.
pub struct Daemon<C: ExchangeClient + 'static, P: Persistence + 'static> {
    client: Arc<C>,
    persistence: Arc<P>,
    router: Arc<TickerRouter>,
    tracker: Arc<OrderTracker>,
    account_cache: Arc<AccountCache>,
    executor: Arc<TradeExecutor<C>>,
    candle_interval: CandleInterval,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    // One event channel per running bot worker, used to hot-swap its
    // config (§13), anchor its cooldown/price-step gate on a fill the
    // reconciler observed (§4.D, §4.G steps 4-5), and signal a graceful
    // stop. Shared with the reconciler task, so it is wrapped in its own
    // `Arc`. A bot's presence as a key is this daemon's single source of
    // truth for "does this bot currently have a running worker".
    worker_events: Arc<Mutex<HashMap<i64, mpsc::UnboundedSender<WorkerEvent>>>>,
    // Pairs with an active ticker-ingest task, so `start_bot` only spins
    // up a second one if the pair is genuinely new to this process.
    ingested_pairs: Mutex<HashSet<Pair>>,
}

impl<C: ExchangeClient + 'static, P: Persistence + 'static> Daemon<C, P> {
    pub fn new(
        client: Arc<C>,
        persistence: Arc<P>,
        account_cache: Arc<AccountCache>,
        tracker: Arc<OrderTracker>,
        queue_capacity: usize,
        candle_interval: CandleInterval,
    ) -> Self {
        let executor = Arc::new(TradeExecutor::new(client.clone(), tracker.clone(), account_cache.clone()));
        Self {
            client,
            persistence,
            router: Arc::new(TickerRouter::new(queue_capacity)),
            tracker,
            account_cache,
            executor,
            candle_interval,
            tasks: Mutex::new(Vec::new()),
            worker_events: Arc::new(Mutex::new(HashMap::new())),
            ingested_pairs: Mutex::new(HashSet::new()),
        }
    }

    /// Start one ticker-ingest task per distinct pair among the
    /// persisted bots, one bot-worker task per `RUNNING` bot, and the
    /// background reconciler (spec §5).
    pub async fn start(&self) {
        let pairs: Vec<Pair> = {
            let mut seen = HashSet::new();
            self.persistence
                .list_bots()
                .await
                .into_iter()
                .filter(|bot| seen.insert(bot.pair.clone()))
                .map(|bot| bot.pair)
                .collect()
        };
        {
            let mut ingested = self.ingested_pairs.lock().await;
            ingested.extend(pairs.iter().cloned());
        }
        for pair in pairs {
            self.spawn_ticker_ingest(pair).await;
        }

        for bot in self.persistence.list_bots().await {
            if bot.status == BotStatus::Running {
                self.spawn_bot_worker(bot.id, bot.pair, bot.config.signals, bot.config.envelope)
                    .await;
            }
        }

        self.spawn_reconciler(std::time::Duration::from_secs(30), chrono::Duration::seconds(5))
            .await;
    }

    async fn spawn_ticker_ingest(&self, pair: Pair) {
        let client = self.client.clone();
        let router = self.router.clone();
        let handle = tokio::spawn(async move {
            loop {
                match client.subscribe(&[pair.clone()]).await {
                    Ok(mut stream) => {
                        while let Some(ticker) = stream.next().await {
                            router.route(ticker);
                        }
                        warn!(pair = %pair.as_str(), "ticker stream ended, reconnecting");
                    }
                    Err(err) => {
                        error!(pair = %pair.as_str(), error = %err, "ticker subscription failed, retrying");
                    }
                }
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            }
        });
        self.tasks.lock().await.push(handle);
    }

    /// Spawn the exclusive worker for one `RUNNING` bot: owns its
    /// [`BotEvaluator`], receives tickers serially from its dispatch
    /// queue, and hands any emitted [`sentry_execution::OrderIntent`]
    /// to the shared executor (spec §4.G, §5: "within a bot worker,
    /// tick handling is serialized").
    async fn spawn_bot_worker(
        &self,
        bot_id: i64,
        pair: Pair,
        signals: Vec<sentry_ta::SignalConfig>,
        envelope: sentry_persistence::TradeEnvelope,
    ) {
        let mut rx = self.router.subscribe(pair.clone(), bot_id);
        let router = self.router.clone();
        let stop_pair = pair.clone();
        let client = self.client.clone();
        let account_cache = self.account_cache.clone();
        let executor = self.executor.clone();
        let persistence = self.persistence.clone();
        let candle_interval = self.candle_interval;

        let config = BotEvaluatorConfig { bot_id, pair, signals, envelope };
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        self.worker_events.lock().await.insert(bot_id, event_tx);
        let mut evaluator = BotEvaluator::new(config, candle_interval, CANDLE_HISTORY);

        let handle = tokio::spawn(async move {
            loop {
                let ticker = tokio::select! {
                    ticker = rx.recv() => match ticker {
                        Some(ticker) => ticker,
                        None => break,
                    },
                    event = event_rx.recv() => match event {
                        Some(WorkerEvent::ConfigUpdated(new_config)) => {
                            info!(bot_id, "bot config hot-swapped");
                            evaluator.replace_config(new_config);
                            continue;
                        }
                        Some(WorkerEvent::TradeCompleted { at, price }) => {
                            evaluator.record_completed_trade(at, price);
                            continue;
                        }
                        Some(WorkerEvent::Stop) => break,
                        None => continue,
                    },
                };
                let now = chrono::Utc::now();
                let (status, intent) = evaluator.evaluate(client.as_ref(), &account_cache, &ticker, now).await;
                info!(bot_id, score = %status.score, next_action = ?status.next_action, "bot tick evaluated");

                if let Some(intent) = intent {
                    let origin_score = intent.origin_score;
                    let pair = intent.pair.clone();
                    let side = intent.side;
                    let notional_usd = intent.notional_usd;
                    match executor.execute(intent).await {
                        ExecutionOutcome::Placed(record) => {
                            // Anchoring cooldown/price-step happens once the
                            // reconciler observes a terminal fill (§4.D), not
                            // at submission time.
                            let exchange_order_id = record
                                .exchange_order_id
                                .clone()
                                .expect("a placed record always has a confirmed exchange_order_id");
                            if let Err(err) = persistence
                                .create_trade(
                                    record.bot_id,
                                    record.pair.clone(),
                                    record.side,
                                    record.submitted_notional_usd,
                                    exchange_order_id,
                                    origin_score,
                                    record.submitted_at,
                                )
                                .await
                            {
                                error!(bot_id, error = %err, "failed to persist placed trade");
                            }
                        }
                        ExecutionOutcome::Dropped { reason } => {
                            warn!(bot_id, ?reason, "order intent dropped");
                        }
                        ExecutionOutcome::Failed { reason } => {
                            warn!(bot_id, reason, "order submission failed");
                            if let Err(err) = persistence
                                .create_failed_trade(bot_id, pair, side, notional_usd, origin_score, reason, now)
                                .await
                            {
                                error!(bot_id, error = %err, "failed to persist failed trade");
                            }
                        }
                        ExecutionOutcome::TransientError { reason } => {
                            warn!(bot_id, reason, "order submission hit a transient error, will retry next tick");
                        }
                    }
                }
            }
            // Graceful cancellation (spec §4.F): the tick in flight has
            // already completed above, so just discard whatever queued
            // up behind it and unsubscribe. A pending order, if any, is
            // left for the reconciler to carry to a terminal state.
            rx.drain_discard();
            router.unsubscribe(&stop_pair, bot_id);
            info!(bot_id, "bot worker stopped");
        });
        self.tasks.lock().await.push(handle);
    }

    /// Start a `STOPPED` bot: flips its persisted status to `RUNNING`,
    /// ensures its pair has a ticker-ingest task, and spawns its worker
    /// (spec §4.F, §6 "start/stop a bot by id"). A no-op if the bot
    /// already has a running worker in this process.
    pub async fn start_bot(&self, bot_id: i64) -> Result<(), SentryError> {
        if self.worker_events.lock().await.contains_key(&bot_id) {
            return Ok(());
        }
        let bot = self.persistence.get_bot(bot_id).await?;
        self.persistence.set_bot_status(bot_id, BotStatus::Running).await?;
        {
            let mut ingested = self.ingested_pairs.lock().await;
            if ingested.insert(bot.pair.clone()) {
                self.spawn_ticker_ingest(bot.pair.clone()).await;
            }
        }
        self.spawn_bot_worker(bot.id, bot.pair, bot.config.signals, bot.config.envelope)
            .await;
        Ok(())
    }

    /// Stop a `RUNNING` bot: flips its persisted status to `STOPPED` and
    /// signals its worker to drain, unsubscribe, and exit (spec §4.F,
    /// §6). A no-op if the bot has no running worker in this process.
    /// Does not touch a pending order; ownership stays with the
    /// reconciler until it reaches a terminal state.
    pub async fn stop_bot(&self, bot_id: i64) -> Result<(), SentryError> {
        self.persistence.set_bot_status(bot_id, BotStatus::Stopped).await?;
        let mut events = self.worker_events.lock().await;
        if let Some(tx) = events.remove(&bot_id) {
            let _ = tx.send(WorkerEvent::Stop);
        }
        Ok(())
    }

    /// Background sweep over pending trade records and a periodic
    /// account-cache refresh (spec §4.D, §4.B). Singleton across the
    /// process. `grace` is the minimum age before a pending record is
    /// eligible for an exchange lookup, giving the submission time to
    /// register upstream before the first poll.
    ///
    /// On a terminal `get_order` response this writes every returned
    /// fill (idempotent via `fill_id`), transitions both the in-memory
    /// [`OrderTracker`] record and the durable
    /// [`sentry_persistence::PersistedTradeRecord`] to `completed` or
    /// `failed`, and pushes a [`WorkerEvent::TradeCompleted`] to the
    /// owning bot so its cooldown and price-step gate anchor on the
    /// fill rather than the submission (spec §4.D, §4.G steps 4-5).
    async fn spawn_reconciler(&self, interval: std::time::Duration, grace: chrono::Duration) {
        let tracker = self.tracker.clone();
        let account_cache = self.account_cache.clone();
        let client = self.client.clone();
        let persistence = self.persistence.clone();
        let worker_events = self.worker_events.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = chrono::Utc::now();
                let stale = tracker.pending_older_than(grace, now);
                for record in &stale {
                    let Some(exchange_order_id) = record.exchange_order_id.as_ref() else {
                        // A pending record always has a confirmed id
                        // (create_pending's invariant); nothing to poll.
                        continue;
                    };
                    match client.get_order(exchange_order_id).await {
                        Ok(response) if response.status.is_terminal() => {
                            for fill in response.fills.iter().cloned() {
                                persistence.upsert_fill(fill).await;
                            }
                            let last_fill_price = response.fills.last().map(|f| f.price);
                            let completed = response.status == ExchangeOrderStatus::Filled;
                            let transition = if completed {
                                tracker.complete(record.id, now)
                            } else {
                                tracker.fail(record.id)
                            };
                            if let Err(err) = transition {
                                error!(trade_id = record.id, error = %err, "order tracker transition failed");
                                continue;
                            }

                            let persisted_status = if completed { TradeStatus::Completed } else { TradeStatus::Failed };
                            match find_pending_persisted_trade(persistence.as_ref(), exchange_order_id).await {
                                Some(persisted) => {
                                    if let Err(err) = persistence
                                        .transition_trade(persisted.id, persisted_status, Some(now))
                                        .await
                                    {
                                        error!(bot_id = record.bot_id, error = %err, "failed to persist trade transition");
                                    }
                                }
                                None => {
                                    error!(bot_id = record.bot_id, trade_id = record.id, "no persisted trade found for exchange order");
                                }
                            }

                            if completed {
                                if let Some(price) = last_fill_price {
                                    let events = worker_events.lock().await;
                                    if let Some(tx) = events.get(&record.bot_id) {
                                        let _ = tx.send(WorkerEvent::TradeCompleted { at: now, price });
                                    }
                                }
                            }
                            info!(trade_id = record.id, bot_id = record.bot_id, status = ?response.status, "trade reconciled");
                        }
                        Ok(_) => {
                            let health = tracker.reconciliation_health(record, now);
                            warn!(trade_id = record.id, bot_id = record.bot_id, ?health, "pending order unresolved");
                        }
                        Err(err) => {
                            warn!(trade_id = record.id, bot_id = record.bot_id, error = %err, "order status lookup failed");
                        }
                    }
                }
                if let Err(err) = account_cache.get("USD").await {
                    error!(error = %err, "reconciler account-cache refresh failed");
                }
            }
        });
        self.tasks.lock().await.push(handle);
    }

    /// Hot-swap a running bot's config (spec §13 SIGHUP reload, §3
    /// "replaced, never mutated, when a config change is observed"). A
    /// no-op if the bot has no running worker.
    pub async fn reload_bot_config(&self, config: BotEvaluatorConfig) {
        let events = self.worker_events.lock().await;
        if let Some(tx) = events.get(&config.bot_id) {
            let _ = tx.send(WorkerEvent::ConfigUpdated(config));
        }
    }

    pub fn router(&self) -> &Arc<TickerRouter> {
        &self.router
    }

    pub fn order_tracker(&self) -> &Arc<OrderTracker> {
        &self.tracker
    }

    /// Abort every background task. Used on SIGINT/SIGTERM shutdown.
    pub async fn shutdown(&self) {
        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }
    }
}

/// [`OrderTracker`] and [`Persistence`] each assign their own ids to a
/// trade record, so the reconciler correlates the two via the shared
/// `exchange_order_id` rather than record id.
async fn find_pending_persisted_trade<P: Persistence>(
    persistence: &P,
    exchange_order_id: &ExchangeOrderId,
) -> Option<PersistedTradeRecord> {
    persistence
        .trades_with_status(TradeStatus::Pending)
        .await
        .into_iter()
        .find(|record| record.exchange_order_id.as_ref() == Some(exchange_order_id))
}
