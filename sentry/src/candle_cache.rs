use chrono::{DateTime, Utc};
use sentry_execution::{ExchangeClient, ExchangeError};
use sentry_instrument::{Candle, CandleInterval, Pair};

/// A per-bot cache of its pair's candle series, refreshed when older
/// than one interval (spec §4.G step 2: "Fetch the cached candle
/// series (refresh if older than one interval)").
pub struct CandleCache {
    pair: Pair,
    interval: CandleInterval,
    limit: usize,
    candles: Vec<Candle>,
    fetched_at: Option<DateTime<Utc>>,
}

impl CandleCache {
    pub fn new(pair: Pair, interval: CandleInterval, limit: usize) -> Self {
        Self {
            pair,
            interval,
            limit,
            candles: Vec::new(),
            fetched_at: None,
        }
    }

    pub async fn get<C: ExchangeClient + ?Sized>(
        &mut self,
        client: &C,
        now: DateTime<Utc>,
    ) -> Result<&[Candle], ExchangeError> {
        let stale = match self.fetched_at {
            None => true,
            Some(fetched_at) => now - fetched_at >= chrono::Duration::seconds(self.interval.as_seconds()),
        };
        if stale {
            self.candles = client.get_candles(&self.pair, self.interval, self.limit).await?;
            self.fetched_at = Some(now);
        }
        Ok(&self.candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use sentry_execution::{ExchangeOrderId, OrderStatusResponse, SubmitMarketOrder, TickerStream};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingClient {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ExchangeClient for CountingClient {
        async fn subscribe(&self, _pairs: &[Pair]) -> Result<TickerStream, ExchangeError> {
            unimplemented!()
        }
        async fn health(&self) -> bool {
            true
        }
        async fn get_candles(
            &self,
            _pair: &Pair,
            _interval: CandleInterval,
            _limit: usize,
        ) -> Result<Vec<Candle>, ExchangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Candle {
                ts: Utc::now(),
                open: Decimal::ONE,
                high: Decimal::ONE,
                low: Decimal::ONE,
                close: Decimal::ONE,
                volume: Decimal::ONE,
            }])
        }
        async fn list_balances(
            &self,
        ) -> Result<HashMap<String, sentry_execution::AccountBalance>, ExchangeError> {
            unimplemented!()
        }
        async fn submit_market_order(
            &self,
            _order: SubmitMarketOrder,
        ) -> Result<ExchangeOrderId, ExchangeError> {
            unimplemented!()
        }
        async fn get_order(&self, _id: &ExchangeOrderId) -> Result<OrderStatusResponse, ExchangeError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn does_not_refetch_within_one_interval() {
        let client = CountingClient { calls: AtomicU32::new(0) };
        let mut cache = CandleCache::new(Pair::from("BTC-USD"), CandleInterval::OneMinute, 50);
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        cache.get(&client, t0).await.unwrap();
        cache.get(&client, t0 + chrono::Duration::seconds(10)).await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refetches_after_one_interval() {
        let client = CountingClient { calls: AtomicU32::new(0) };
        let mut cache = CandleCache::new(Pair::from("BTC-USD"), CandleInterval::OneMinute, 50);
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        cache.get(&client, t0).await.unwrap();
        cache.get(&client, t0 + chrono::Duration::seconds(61)).await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }
}
