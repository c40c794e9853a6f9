//! Shared memoization of price fetches and derived return series.
//!
//! The cache is the only shared mutable resource in the engine. Population is
//! single-flight: under concurrent first access for the same
//! (symbol, range, granularity) key, exactly one caller hits the provider
//! while the rest wait on the key's slot. Failed fetches are not cached.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use dashmap::DashMap;
use rust_decimal::prelude::*;
use strategy_core::{EngineError, Granularity, PriceBar, PriceHistoryProvider};

/// Cache key: one price window at one granularity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub granularity: Granularity,
}

type Slot<T> = Arc<Mutex<Option<Arc<T>>>>;

/// Concurrent, at-most-once price series cache.
#[derive(Default)]
pub struct PriceCache {
    bars: DashMap<SeriesKey, Slot<Vec<PriceBar>>>,
    returns: DashMap<SeriesKey, Slot<Vec<f64>>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch bars through the cache. Concurrent first access for the same key
    /// performs exactly one provider call.
    pub fn get_bars(
        &self,
        provider: &dyn PriceHistoryProvider,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
    ) -> Result<Arc<Vec<PriceBar>>, EngineError> {
        let key = SeriesKey {
            symbol: symbol.to_string(),
            start,
            end,
            granularity,
        };

        // Clone the slot out of the shard so the provider call below never
        // holds a dashmap lock.
        let slot = self
            .bars
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(bars) = guard.as_ref() {
            tracing::debug!(symbol, %start, %end, "price cache hit");
            return Ok(bars.clone());
        }

        let bars = Arc::new(provider.get_bars(symbol, start, end, granularity)?);
        *guard = Some(bars.clone());
        tracing::debug!(symbol, %start, %end, bars = bars.len(), "price cache populated");
        Ok(bars)
    }

    /// Daily close-to-close returns for a window, derived once per key.
    pub fn get_daily_returns(
        &self,
        provider: &dyn PriceHistoryProvider,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
    ) -> Result<Arc<Vec<f64>>, EngineError> {
        let key = SeriesKey {
            symbol: symbol.to_string(),
            start,
            end,
            granularity,
        };

        let slot = self
            .returns
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(returns) = guard.as_ref() {
            return Ok(returns.clone());
        }

        let bars = self.get_bars(provider, symbol, start, end, granularity)?;
        let closes: Vec<f64> = bars
            .iter()
            .map(|b| b.close.to_f64().unwrap_or(0.0))
            .collect();
        let returns = Arc::new(perf_metrics::daily_returns(&closes));
        *guard = Some(returns.clone());
        Ok(returns)
    }

    /// Number of populated price series (diagnostics).
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strategy_core::PriceBar;

    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingProvider {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    impl PriceHistoryProvider for CountingProvider {
        fn get_bars(
            &self,
            _symbol: &str,
            start: NaiveDate,
            end: NaiveDate,
            _granularity: Granularity,
        ) -> Result<Vec<PriceBar>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EngineError::DataUnavailable("offline".to_string()));
            }
            let mut bars = Vec::new();
            let mut date = start;
            let mut price = Decimal::from(100);
            while date <= end {
                bars.push(PriceBar {
                    timestamp: date,
                    open: price,
                    high: price + Decimal::ONE,
                    low: price - Decimal::ONE,
                    close: price + Decimal::ONE,
                    volume: 1000.0,
                });
                price += Decimal::ONE;
                date += chrono::Duration::days(1);
            }
            Ok(bars)
        }
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn second_fetch_hits_cache() {
        let cache = PriceCache::new();
        let provider = CountingProvider::new(false);

        let a = cache
            .get_bars(&provider, "AAA", d("2024-01-01"), d("2024-01-10"), Granularity::Day)
            .unwrap();
        let b = cache
            .get_bars(&provider, "AAA", d("2024-01-01"), d("2024-01-10"), Granularity::Day)
            .unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_keys_fetch_separately() {
        let cache = PriceCache::new();
        let provider = CountingProvider::new(false);

        cache
            .get_bars(&provider, "AAA", d("2024-01-01"), d("2024-01-10"), Granularity::Day)
            .unwrap();
        cache
            .get_bars(&provider, "BBB", d("2024-01-01"), d("2024-01-10"), Granularity::Day)
            .unwrap();
        cache
            .get_bars(&provider, "AAA", d("2024-01-01"), d("2024-01-11"), Granularity::Day)
            .unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = PriceCache::new();
        let failing = CountingProvider::new(true);

        assert!(cache
            .get_bars(&failing, "AAA", d("2024-01-01"), d("2024-01-10"), Granularity::Day)
            .is_err());
        assert!(cache
            .get_bars(&failing, "AAA", d("2024-01-01"), d("2024-01-10"), Granularity::Day)
            .is_err());
        // Each attempt reached the provider: the error was never memoized
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_first_access_populates_once() {
        let cache = Arc::new(PriceCache::new());
        let provider = Arc::new(CountingProvider::new(false));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let provider = provider.clone();
                std::thread::spawn(move || {
                    cache
                        .get_bars(
                            provider.as_ref(),
                            "AAA",
                            d("2024-01-01"),
                            d("2024-03-01"),
                            Granularity::Day,
                        )
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn derived_returns_are_memoized() {
        let cache = PriceCache::new();
        let provider = CountingProvider::new(false);

        let a = cache
            .get_daily_returns(&provider, "AAA", d("2024-01-01"), d("2024-01-05"), Granularity::Day)
            .unwrap();
        let b = cache
            .get_daily_returns(&provider, "AAA", d("2024-01-01"), d("2024-01-05"), Granularity::Day)
            .unwrap();

        assert_eq!(a.len(), 4);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
