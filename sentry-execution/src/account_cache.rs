use crate::balance::{AccountBalance, CachedBalance};
use crate::client::ExchangeClient;
use crate::error::ExchangeError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct Inner {
    balances: HashMap<String, AccountBalance>,
    observed_at: Option<DateTime<Utc>>,
    last_error: Option<ExchangeError>,
    hits: u64,
    misses: u64,
}

/// Time-bounded cache of per-currency available balances, with
/// single-flight refresh on miss (spec §4.B).
pub struct AccountCache {
    client: Arc<dyn ExchangeClient>,
    ttl: chrono::Duration,
    hard_stale_limit: chrono::Duration,
    inner: parking_lot::RwLock<Inner>,
    // Concurrent misses block on this lock and share the single in-flight
    // refresh's result rather than each issuing their own upstream call.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl AccountCache {
    pub fn new(client: Arc<dyn ExchangeClient>, ttl: Duration, hard_stale_limit: Duration) -> Self {
        Self {
            client,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(60)),
            hard_stale_limit: chrono::Duration::from_std(hard_stale_limit)
                .unwrap_or(chrono::Duration::seconds(300)),
            inner: parking_lot::RwLock::new(Inner {
                balances: HashMap::new(),
                observed_at: None,
                last_error: None,
                hits: 0,
                misses: 0,
            }),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Get the cached balance for `currency`, refreshing from the
    /// exchange on a cache miss. A refresh failure serves the previous
    /// value if it is younger than `hard_stale_limit`; otherwise the
    /// error is surfaced (spec §4.B).
    pub async fn get(&self, currency: &str) -> Result<CachedBalance, ExchangeError> {
        if let Some(cached) = self.read_if_fresh(currency) {
            return Ok(cached);
        }

        self.inner.write().misses += 1;
        self.refresh().await?;

        let inner = self.inner.read();
        let observed_at = inner.observed_at.unwrap_or_else(Utc::now);
        let balance = inner.balances.get(currency).copied().unwrap_or(AccountBalance {
            available: rust_decimal::Decimal::ZERO,
            held: rust_decimal::Decimal::ZERO,
        });
        Ok(CachedBalance { balance, observed_at })
    }

    pub fn last_error(&self) -> Option<ExchangeError> {
        self.inner.read().last_error.clone()
    }

    pub fn hit_count(&self) -> u64 {
        self.inner.read().hits
    }

    pub fn miss_count(&self) -> u64 {
        self.inner.read().misses
    }

    fn read_if_fresh(&self, currency: &str) -> Option<CachedBalance> {
        let inner = self.inner.read();
        let observed_at = inner.observed_at?;
        if Utc::now() - observed_at >= self.ttl {
            return None;
        }
        drop(inner);
        self.inner.write().hits += 1;
        let inner = self.inner.read();
        let balance = inner.balances.get(currency).copied().unwrap_or(AccountBalance {
            available: rust_decimal::Decimal::ZERO,
            held: rust_decimal::Decimal::ZERO,
        });
        Some(CachedBalance { balance, observed_at })
    }

    async fn refresh(&self) -> Result<(), ExchangeError> {
        let _guard = self.refresh_lock.lock().await;

        // Double-checked: a caller that queued on `refresh_lock` may find
        // the cache already fresh by the time it acquires the guard.
        {
            let inner = self.inner.read();
            if let Some(observed_at) = inner.observed_at {
                if Utc::now() - observed_at < self.ttl {
                    return Ok(());
                }
            }
        }

        match self.client.list_balances().await {
            Ok(balances) => {
                let mut inner = self.inner.write();
                inner.balances = balances;
                inner.observed_at = Some(Utc::now());
                inner.last_error = None;
                Ok(())
            }
            Err(err) => {
                let mut inner = self.inner.write();
                inner.last_error = Some(err.clone());
                let can_serve_stale = inner
                    .observed_at
                    .map(|observed_at| Utc::now() - observed_at < self.hard_stale_limit)
                    .unwrap_or(false);
                if can_serve_stale {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ExchangeOrderId, OrderStatusResponse, SubmitMarketOrder, TickerStream};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use sentry_instrument::{Candle, CandleInterval, Pair};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubClient {
        calls: AtomicU32,
        fail_after: Option<u32>,
    }

    #[async_trait]
    impl ExchangeClient for StubClient {
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
            unimplemented!()
        }
        async fn list_balances(&self) -> Result<HashMap<String, AccountBalance>, ExchangeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(fail_after) = self.fail_after {
                if n > fail_after {
                    return Err(ExchangeError::Transient("down".into()));
                }
            }
            let mut map = HashMap::new();
            map.insert(
                "USD".to_string(),
                AccountBalance {
                    available: dec!(100),
                    held: dec!(0),
                },
            );
            Ok(map)
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
    async fn serves_from_cache_within_ttl() {
        let client = Arc::new(StubClient {
            calls: AtomicU32::new(0),
            fail_after: None,
        });
        let cache = AccountCache::new(client.clone(), Duration::from_secs(60), Duration::from_secs(300));

        cache.get("USD").await.unwrap();
        cache.get("USD").await.unwrap();

        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.hit_count(), 1);
        assert_eq!(cache.miss_count(), 1);
    }

    #[tokio::test]
    async fn refresh_failure_serves_stale_within_hard_limit() {
        let client = Arc::new(StubClient {
            calls: AtomicU32::new(0),
            fail_after: Some(1),
        });
        let cache = AccountCache::new(
            client.clone(),
            Duration::from_millis(1),
            Duration::from_secs(300),
        );
        let first = cache.get("USD").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = cache.get("USD").await.unwrap();

        assert_eq!(first.balance.available, second.balance.available);
        assert!(cache.last_error().is_some());
    }

    #[tokio::test]
    async fn refresh_failure_past_hard_limit_surfaces_error() {
        let client = Arc::new(StubClient {
            calls: AtomicU32::new(0),
            fail_after: Some(1),
        });
        let cache = AccountCache::new(
            client.clone(),
            Duration::from_millis(1),
            Duration::from_millis(1),
        );
        cache.get("USD").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let result = cache.get("USD").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn concurrent_misses_share_a_single_refresh() {
        let client = Arc::new(StubClient {
            calls: AtomicU32::new(0),
            fail_after: None,
        });
        let cache = Arc::new(AccountCache::new(
            client.clone(),
            Duration::from_secs(60),
            Duration::from_secs(300),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get("USD").await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }
}
