/*
 *  freshness.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Time-to-live cache around a single remote value
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use log::{debug, warn};
use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::BoardError;

/// Fetch bookkeeping, summed up by the diagnostics log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchStats {
    pub attempts: u32,
    pub errors: u32,
}

impl FetchStats {
    pub fn merge(self, other: FetchStats) -> FetchStats {
        FetchStats {
            attempts: self.attempts + other.attempts,
            errors: self.errors + other.errors,
        }
    }
}

/// One remote value plus the instant it arrived.
///
/// `value` stays `None` until the first successful fetch. Staleness is
/// decided by the caller's `now`, so the cache never reads a clock itself.
#[derive(Debug)]
pub struct FreshnessCache<T> {
    name: &'static str,
    value: Option<T>,
    fetched_at: Option<Instant>,
    stats: FetchStats,
}

impl<T: Clone> FreshnessCache<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            value: None,
            fetched_at: None,
            stats: FetchStats::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stats(&self) -> FetchStats {
        self.stats
    }

    /// Cached value regardless of age.
    pub fn peek(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.fetched_at.map(|t| now.saturating_duration_since(t))
    }

    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        self.value.is_some() && self.age(now).is_some_and(|age| age < ttl)
    }

    /// Store a value fetched elsewhere (batch requests fill several caches).
    pub fn store(&mut self, value: T, now: Instant) {
        self.stats.attempts += 1;
        self.value = Some(value);
        self.fetched_at = Some(now);
    }

    /// Count a failed attempt made elsewhere.
    pub fn record_error(&mut self, err: &BoardError) {
        self.stats.attempts += 1;
        self.stats.errors += 1;
        warn!("{} fetch failed: {} (errors: {})", self.name, err, self.stats.errors);
    }

    /// Serve the cached value while younger than `ttl`, otherwise fetch.
    ///
    /// A failed fetch serves the previous value when there is one, else `None`.
    pub async fn get_or_fetch<F, Fut>(&mut self, now: Instant, ttl: Duration, fetch: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BoardError>>,
    {
        if self.is_fresh(now, ttl) {
            debug!("Using cached {} (age: {}s)", self.name,
                self.age(now).map(|a| a.as_secs()).unwrap_or(0));
            return self.value.clone();
        }

        self.stats.attempts += 1;
        match fetch().await {
            Ok(value) => {
                self.value = Some(value);
                self.fetched_at = Some(now);
                debug!("{} fetch #{} ok, errors: {}", self.name, self.stats.attempts, self.stats.errors);
                self.value.clone()
            }
            Err(e) => {
                self.stats.errors += 1;
                match (&self.value, self.age(now)) {
                    (Some(_), Some(age)) => {
                        warn!("{} fetch failed: {} - using stale cache (age: {}s)", self.name, e, age.as_secs());
                    }
                    _ => warn!("{} fetch failed: {} - no cached data", self.name, e),
                }
                self.value.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const TTL: Duration = Duration::from_secs(300);

    fn counting<'a, T: 'a>(calls: &'a Cell<u32>, value: T)
        -> impl FnOnce() -> std::future::Ready<Result<T, BoardError>> + 'a
    {
        move || {
            calls.set(calls.get() + 1);
            std::future::ready(Ok(value))
        }
    }

    #[tokio::test]
    async fn test_hit_within_ttl_never_fetches() {
        let mut cache: FreshnessCache<i32> = FreshnessCache::new("weather");
        let calls = Cell::new(0);
        let t0 = Instant::now();

        assert_eq!(cache.get_or_fetch(t0, TTL, counting(&calls, 21)).await, Some(21));

        for secs in [1, 60, 299] {
            let v = cache.get_or_fetch(t0 + Duration::from_secs(secs), TTL, counting(&calls, 99)).await;
            assert_eq!(v, Some(21));
        }
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_expired_fetches_exactly_once() {
        let mut cache: FreshnessCache<i32> = FreshnessCache::new("forecast");
        let calls = Cell::new(0);
        let t0 = Instant::now();

        cache.get_or_fetch(t0, TTL, counting(&calls, 1)).await;
        let later = t0 + TTL;
        assert_eq!(cache.get_or_fetch(later, TTL, counting(&calls, 2)).await, Some(2));
        let v = cache.get_or_fetch(later + Duration::from_secs(1), TTL, counting(&calls, 3)).await;
        assert_eq!(v, Some(2));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_failure_serves_stale_and_counts() {
        let mut cache: FreshnessCache<&str> = FreshnessCache::new("weather");
        let t0 = Instant::now();
        cache.get_or_fetch(t0, TTL, || async { Ok("sunny") }).await;

        let v = cache.get_or_fetch(t0 + TTL * 2, TTL,
            || async { Err(BoardError::RemoteApi("HTTP 503".into())) }).await;
        assert_eq!(v, Some("sunny"));
        assert_eq!(cache.stats(), FetchStats { attempts: 2, errors: 1 });
    }

    #[tokio::test]
    async fn test_failure_without_cache_is_none() {
        let mut cache: FreshnessCache<i32> = FreshnessCache::new("quote");
        let v = cache.get_or_fetch(Instant::now(), TTL,
            || async { Err(BoardError::NetworkUnavailable("down".into())) }).await;
        assert_eq!(v, None);
        assert!(!cache.has_value());
        assert_eq!(cache.stats().errors, 1);
    }

    #[test]
    fn test_store_and_peek() {
        let mut cache: FreshnessCache<f64> = FreshnessCache::new("quote");
        let t0 = Instant::now();
        assert!(cache.peek().is_none());
        cache.store(101.5, t0);
        assert_eq!(cache.peek(), Some(&101.5));
        assert!(cache.is_fresh(t0 + Duration::from_secs(10), TTL));
        assert_eq!(cache.age(t0 + Duration::from_secs(10)), Some(Duration::from_secs(10)));
    }
}
