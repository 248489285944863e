use parking_lot::RwLock;
use sentry_instrument::{Pair, Ticker};
use sentry_integration::channel::{bounded_drop_oldest, BoundedDropOldestRx, BoundedDropOldestTx};
use std::collections::HashMap;

/// Default per-bot dispatch queue depth (spec §5 default: 16).
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Fans a single exchange ticker stream out to per-bot dispatch queues
/// (spec §4.F). Maintains the latest-price table and the `pair ->
/// subscribers` mapping; never blocks on a slow subscriber.
pub struct TickerRouter {
    latest: RwLock<HashMap<Pair, Ticker>>,
    subscribers: RwLock<HashMap<Pair, HashMap<i64, BoundedDropOldestTx<Ticker>>>>,
    queue_capacity: usize,
}

impl TickerRouter {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            latest: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
            queue_capacity,
        }
    }

    /// Subscribe `bot_id` to `pair`'s ticker stream, returning the receiving
    /// end of its bounded dispatch queue. Called when a bot transitions to
    /// `RUNNING`.
    pub fn subscribe(&self, pair: Pair, bot_id: i64) -> BoundedDropOldestRx<Ticker> {
        let (tx, rx) = bounded_drop_oldest(self.queue_capacity);
        self.subscribers.write().entry(pair).or_default().insert(bot_id, tx);
        rx
    }

    /// Remove `bot_id`'s subscription to `pair`. Called when a bot
    /// transitions to `STOPPED`. A no-op if not subscribed.
    pub fn unsubscribe(&self, pair: &Pair, bot_id: i64) {
        if let Some(subs) = self.subscribers.write().get_mut(pair) {
            subs.remove(&bot_id);
        }
    }

    /// Look up the latest known price for `pair`, if any ticker has been
    /// routed for it yet.
    pub fn latest(&self, pair: &Pair) -> Option<Ticker> {
        self.latest.read().get(pair).cloned()
    }

    /// Route an incoming ticker: update the latest-price table (monotone
    /// by `ts`, dropping late arrivals) and enqueue a dispatch to every
    /// current subscriber of its pair. Never blocks.
    pub fn route(&self, ticker: Ticker) {
        {
            let mut latest = self.latest.write();
            let is_newer = match latest.get(&ticker.pair) {
                Some(prev) => ticker.supersedes(prev),
                None => true,
            };
            if !is_newer {
                return;
            }
            latest.insert(ticker.pair.clone(), ticker.clone());
        }
        if let Some(subs) = self.subscribers.read().get(&ticker.pair) {
            for tx in subs.values() {
                tx.push(ticker.clone());
            }
        }
    }

    pub fn subscriber_count(&self, pair: &Pair) -> usize {
        self.subscribers.read().get(pair).map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use rust_decimal_macros::dec;

    fn ticker(pair: &str, price: rust_decimal::Decimal, secs: i64) -> Ticker {
        Ticker::new(Pair::from(pair), price, DateTime::from_timestamp(secs, 0).unwrap())
    }

    #[tokio::test]
    async fn subscriber_receives_routed_ticker() {
        let router = TickerRouter::new(DEFAULT_QUEUE_CAPACITY);
        let pair = Pair::from("BTC-USD");
        let mut rx = router.subscribe(pair.clone(), 1);
        router.route(ticker("BTC-USD", dec!(100), 1));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.price, dec!(100));
    }

    #[tokio::test]
    async fn late_arrival_is_dropped_and_not_dispatched() {
        let router = TickerRouter::new(DEFAULT_QUEUE_CAPACITY);
        let pair = Pair::from("BTC-USD");
        let mut rx = router.subscribe(pair.clone(), 1);
        router.route(ticker("BTC-USD", dec!(100), 10));
        router.route(ticker("BTC-USD", dec!(999), 5));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.price, dec!(100));
        assert_eq!(router.latest(&pair).unwrap().price, dec!(100));
    }

    #[tokio::test]
    async fn equal_timestamp_is_dropped() {
        let router = TickerRouter::new(DEFAULT_QUEUE_CAPACITY);
        let pair = Pair::from("BTC-USD");
        router.route(ticker("BTC-USD", dec!(100), 10));
        router.route(ticker("BTC-USD", dec!(999), 10));
        assert_eq!(router.latest(&pair).unwrap().price, dec!(100));
    }

    #[tokio::test]
    async fn unsubscribe_stops_dispatch() {
        let router = TickerRouter::new(DEFAULT_QUEUE_CAPACITY);
        let pair = Pair::from("BTC-USD");
        let _rx = router.subscribe(pair.clone(), 1);
        router.unsubscribe(&pair, 1);
        assert_eq!(router.subscriber_count(&pair), 0);
        router.route(ticker("BTC-USD", dec!(100), 1));
    }

    #[tokio::test]
    async fn independent_pairs_do_not_interfere() {
        let router = TickerRouter::new(DEFAULT_QUEUE_CAPACITY);
        let btc = Pair::from("BTC-USD");
        let eth = Pair::from("ETH-USD");
        let mut btc_rx = router.subscribe(btc.clone(), 1);
        let mut eth_rx = router.subscribe(eth.clone(), 2);
        router.route(ticker("BTC-USD", dec!(100), 1));
        router.route(ticker("ETH-USD", dec!(3000), 1));
        assert_eq!(btc_rx.recv().await.unwrap().price, dec!(100));
        assert_eq!(eth_rx.recv().await.unwrap().price, dec!(3000));
    }
}
