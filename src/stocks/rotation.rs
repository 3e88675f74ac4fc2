/*
 *  stocks/rotation.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Which stocks to show this cycle and whether their quotes may be refetched
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

use chrono::{Datelike, NaiveDateTime, Timelike};
use log::{debug, info};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::BoardError;
use crate::freshness::{FetchStats, FreshnessCache};
use crate::settings::DisplaySettings;
use crate::windows::{GracePeriodTracker, MarketWindow};

use super::StockEntry;
use super::api::{PricePoint, Quote, StockProvider};

/// Twelve Data free tier allows 8 credits a minute.
pub const FETCH_INTERVAL: Duration = Duration::from_secs(65);

const MULTI_COLLECT: usize = 4;
const MULTI_SHOW: usize = 3;
const MULTI_MIN: usize = 2;

/// Where the trading day stands for fetch gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarketPhase {
    pub market: bool,
    pub grace: bool,
}

/// One panel worth of stock data.
#[derive(Debug, Clone, PartialEq)]
pub enum StockView {
    Chart {
        entry: StockEntry,
        quote: Quote,
        series: Vec<PricePoint>,
    },
    Rows(Vec<(StockEntry, Quote)>),
}

/// Rotation cursor plus the quote caches behind it.
pub struct StockRotation {
    entries: Vec<StockEntry>,
    symbols: Vec<String>,
    offset: usize,
    window: MarketWindow,
    tracker: GracePeriodTracker,
    quotes: HashMap<String, FreshnessCache<Quote>>,
    intraday: HashMap<String, FreshnessCache<Vec<PricePoint>>>,
    last_fetch: Option<Instant>,
    fetch_interval: Duration,
}

impl StockRotation {
    pub fn new(entries: Vec<StockEntry>, window: MarketWindow, fetch_interval: Duration) -> Self {
        let symbols = entries.iter().map(|e| e.symbol.clone()).collect();
        Self {
            entries,
            symbols,
            offset: 0,
            window,
            tracker: GracePeriodTracker::new(),
            quotes: HashMap::new(),
            intraday: HashMap::new(),
            last_fetch: None,
            fetch_interval,
        }
    }

    pub fn entries(&self) -> &[StockEntry] {
        &self.entries
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn tracker(&self) -> &GracePeriodTracker {
        &self.tracker
    }

    pub fn cached_quote(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.get(symbol).and_then(|c| c.peek())
    }

    pub fn stats(&self) -> FetchStats {
        self.quotes
            .values()
            .map(FreshnessCache::stats)
            .chain(self.intraday.values().map(FreshnessCache::stats))
            .fold(FetchStats::default(), FetchStats::merge)
    }

    /// Classify `now` and feed the grace tracker.
    ///
    /// 24/7 mode uses the dynamic grace extension.
    pub fn phase(&mut self, now: &NaiveDateTime, respect_market_hours: bool) -> MarketPhase {
        let minute = (now.hour() * 60 + now.minute()) as i32;
        let weekday = now.weekday().num_days_from_monday();

        let market = self.window.is_market_hours(minute, weekday);
        let grace = if respect_market_hours {
            self.window.is_grace_period(minute, weekday)
        } else {
            self.tracker.in_extended_grace(&self.window, minute, weekday, &self.symbols)
        };
        self.tracker.observe(grace);
        MarketPhase { market, grace }
    }

    /// Per-symbol half of the fetch decision.
    pub fn may_refetch(&self, symbol: &str, phase: MarketPhase) -> bool {
        if !self.quotes.get(symbol).is_some_and(FreshnessCache::has_value) {
            return true;
        }
        if phase.market {
            return true;
        }
        phase.grace && !self.tracker.has_fetched(symbol)
    }

    /// Global rate limit across every stock request.
    pub fn rate_limit_open(&self, now: Instant) -> bool {
        self.last_fetch
            .is_none_or(|last| now.saturating_duration_since(last) >= self.fetch_interval)
    }

    pub fn should_fetch(&self, symbol: &str, phase: MarketPhase, now: Instant) -> bool {
        self.rate_limit_open(now) && self.may_refetch(symbol, phase)
    }

    fn advance(&mut self, by: usize) {
        if !self.entries.is_empty() {
            self.offset = (self.offset + by) % self.entries.len();
        }
    }

    /// Up to `MULTI_COLLECT` non-highlighted entries from the cursor, wrapping.
    fn collect_rows(&self) -> Vec<StockEntry> {
        let n = self.entries.len();
        (0..n)
            .map(|i| &self.entries[(self.offset + i) % n])
            .filter(|e| !e.highlight)
            .take(MULTI_COLLECT)
            .cloned()
            .collect()
    }

    async fn refresh_quotes<P: StockProvider>(&mut self, provider: &P, symbols: &[String], phase: MarketPhase, now: Instant) {
        self.last_fetch = Some(now);
        match provider.quotes(symbols).await {
            Ok(mut fetched) => {
                for symbol in symbols {
                    let cache = self.quotes
                        .entry(symbol.clone())
                        .or_insert_with(|| FreshnessCache::new("stock quote"));
                    match fetched.remove(symbol) {
                        Some(q) => {
                            cache.store(q, now);
                            if phase.grace {
                                self.tracker.mark_fetched(symbol);
                            }
                        }
                        None => cache.record_error(&BoardError::CacheMiss(format!("quote for {}", symbol))),
                    }
                }
            }
            Err(e) => {
                for symbol in symbols {
                    self.quotes
                        .entry(symbol.clone())
                        .or_insert_with(|| FreshnessCache::new("stock quote"))
                        .record_error(&e);
                }
            }
        }
    }

    /// Decide and fetch this cycle's stock panel, if any.
    ///
    /// The cursor moves by 1 after a chart and by 3 after a row panel. A row
    /// batch without enough data still moves the cursor past it.
    pub async fn next_view<P: StockProvider>(
        &mut self,
        provider: &P,
        cycle: u64,
        settings: &DisplaySettings,
        local_now: &NaiveDateTime,
        now: Instant,
    ) -> Option<StockView> {
        if self.entries.is_empty() {
            return None;
        }
        let frequency = settings.stocks_display_frequency.max(1) as u64;
        if cycle % frequency != 0 {
            return None;
        }

        let phase = self.phase(local_now, settings.stocks_respect_market_hours);
        if settings.stocks_respect_market_hours && !phase.market && !phase.grace {
            debug!("Outside market hours - skipping stocks");
            return None;
        }

        let current = self.entries[self.offset % self.entries.len()].clone();
        if current.highlight {
            self.chart_view(provider, current, phase, now).await
        } else {
            self.rows_view(provider, phase, now).await
        }
    }

    async fn chart_view<P: StockProvider>(&mut self, provider: &P, entry: StockEntry, phase: MarketPhase, now: Instant) -> Option<StockView> {
        let symbol = entry.symbol.clone();
        if self.should_fetch(&symbol, phase, now) {
            self.refresh_quotes(provider, std::slice::from_ref(&symbol), phase, now).await;
            let cache = self.intraday
                .entry(symbol.clone())
                .or_insert_with(|| FreshnessCache::new("stock intraday"));
            cache.get_or_fetch(now, Duration::ZERO, || provider.intraday(&symbol)).await;
        }
        self.advance(1);

        let quote = self.cached_quote(&symbol)?.clone();
        let series = self.intraday
            .get(&symbol)
            .and_then(|c| c.peek())
            .cloned()
            .unwrap_or_default();
        info!("Stock chart: {} ({} points)", entry.display_name, series.len());
        Some(StockView::Chart { entry, quote, series })
    }

    async fn rows_view<P: StockProvider>(&mut self, provider: &P, phase: MarketPhase, now: Instant) -> Option<StockView> {
        let batch = self.collect_rows();
        let wanted: Vec<String> = batch
            .iter()
            .filter(|e| self.may_refetch(&e.symbol, phase))
            .map(|e| e.symbol.clone())
            .collect();
        if !wanted.is_empty() && self.rate_limit_open(now) {
            self.refresh_quotes(provider, &wanted, phase, now).await;
        }
        // Fixed stride: a highlighted entry the batch stepped over only gets
        // its chart when the cursor lands on it, which never happens for a
        // highlight at offset 1 or 2 of a list whose length is a multiple of 3.
        self.advance(MULTI_SHOW);

        let rows: Vec<(StockEntry, Quote)> = batch
            .into_iter()
            .filter_map(|e| {
                let q = self.cached_quote(&e.symbol)?.clone();
                Some((e, q))
            })
            .take(MULTI_SHOW)
            .collect();
        if rows.len() < MULTI_MIN {
            info!("Only {} stocks with data - skipping display", rows.len());
            return None;
        }
        Some(StockView::Rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::windows::compute_market_window;
    use chrono::NaiveDate;
    use std::cell::RefCell;

    struct FakeMarket {
        calls: RefCell<Vec<Vec<String>>>,
        missing: Vec<&'static str>,
    }

    impl FakeMarket {
        fn new() -> Self {
            Self { calls: RefCell::new(Vec::new()), missing: Vec::new() }
        }
    }

    impl StockProvider for FakeMarket {
        async fn quotes(&self, symbols: &[String]) -> Result<HashMap<String, Quote>, BoardError> {
            self.calls.borrow_mut().push(symbols.to_vec());
            Ok(symbols
                .iter()
                .filter(|s| !self.missing.iter().any(|m| *m == s.as_str()))
                .map(|s| (s.clone(), Quote::new(100.0, 99.0, 1.0)))
                .collect())
        }

        async fn intraday(&self, _symbol: &str) -> Result<Vec<PricePoint>, BoardError> {
            Ok(vec![PricePoint { datetime: "09:30".into(), open: 99.0, close: 100.0 }])
        }
    }

    fn entries(rows: &str) -> Vec<StockEntry> {
        crate::stocks::parse_stock_list(rows)
    }

    fn wednesday(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 14).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn settings(respect: bool) -> DisplaySettings {
        DisplaySettings {
            display_stocks: true,
            stocks_display_frequency: 1,
            stocks_respect_market_hours: respect,
            ..DisplaySettings::default()
        }
    }

    fn rotation(list: &str) -> StockRotation {
        StockRotation::new(entries(list), compute_market_window(Some(-5), 30), Duration::ZERO)
    }

    #[tokio::test]
    async fn test_rows_advance_by_three() {
        let mut r = rotation("A,a\nB,b\nC,c\nD,d\nE,e\nF,f\nG,g\n");
        let market = FakeMarket::new();
        let t0 = Instant::now();

        let view = r.next_view(&market, 1, &settings(true), &wednesday(10, 0), t0).await;
        match view {
            Some(StockView::Rows(rows)) => {
                let names: Vec<&str> = rows.iter().map(|(e, _)| e.symbol.as_str()).collect();
                assert_eq!(names, vec!["A", "B", "C"]);
            }
            other => panic!("expected rows, got {:?}", other),
        }
        assert_eq!(r.offset(), 3);
        assert_eq!(market.calls.borrow()[0], vec!["A", "B", "C", "D"]);

        r.next_view(&market, 2, &settings(true), &wednesday(10, 1), t0).await;
        assert_eq!(r.offset(), 6);
    }

    #[tokio::test]
    async fn test_highlight_chart_advances_by_one() {
        let mut r = rotation("CRM,Salesforce,stock,CRM,1\nA,a\nB,b\n");
        let market = FakeMarket::new();

        let view = r.next_view(&market, 3, &settings(true), &wednesday(11, 0), Instant::now()).await;
        match view {
            Some(StockView::Chart { entry, series, .. }) => {
                assert_eq!(entry.symbol, "CRM");
                assert_eq!(series.len(), 1);
            }
            other => panic!("expected chart, got {:?}", other),
        }
        assert_eq!(r.offset(), 1);
    }

    #[tokio::test]
    async fn test_rows_skip_highlighted_and_need_two() {
        let mut r = rotation("A,a\nH,h,stock,H,1\nB,b\n");
        let mut market = FakeMarket::new();
        market.missing = vec!["B"];

        let view = r.next_view(&market, 1, &settings(true), &wednesday(10, 0), Instant::now()).await;
        assert_eq!(market.calls.borrow()[0], vec!["A", "B"]);
        assert!(view.is_none());
        assert_eq!(r.offset(), 0);
    }

    #[tokio::test]
    async fn test_cadence_and_market_gate() {
        let mut r = rotation("A,a\nB,b\nC,c\n");
        let market = FakeMarket::new();
        let mut s = settings(true);
        s.stocks_display_frequency = 3;

        assert!(r.next_view(&market, 4, &s, &wednesday(10, 0), Instant::now()).await.is_none());
        assert!(r.next_view(&market, 3, &s, &wednesday(20, 0), Instant::now()).await.is_none());
        assert!(market.calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_outside_hours_serves_cache_forever() {
        let mut r = rotation("A,a\nB,b\nC,c\n");
        let market = FakeMarket::new();
        let t0 = Instant::now();

        r.next_view(&market, 1, &settings(false), &wednesday(20, 0), t0).await;
        assert_eq!(market.calls.borrow().len(), 1);

        let view = r.next_view(&market, 2, &settings(false), &wednesday(21, 0), t0 + FETCH_INTERVAL).await;
        assert!(view.is_some());
        assert_eq!(market.calls.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_grace_fetches_each_symbol_once() {
        let mut r = rotation("A,a\nB,b\nC,c\n");
        let market = FakeMarket::new();
        let t0 = Instant::now();

        // bootstrap in market hours
        r.next_view(&market, 1, &settings(true), &wednesday(15, 0), t0).await;
        // first grace visit refreshes everything once
        r.next_view(&market, 2, &settings(true), &wednesday(16, 5), t0).await;
        assert_eq!(market.calls.borrow().len(), 2);
        for s in ["A", "B", "C"] {
            assert!(r.tracker().has_fetched(s));
        }

        let phase = r.phase(&wednesday(16, 10), true);
        assert!(phase.grace);
        for s in ["A", "B", "C"] {
            assert!(!r.should_fetch(s, phase, t0));
        }
        r.next_view(&market, 3, &settings(true), &wednesday(16, 15), t0).await;
        assert_eq!(market.calls.borrow().len(), 2);
    }

    #[tokio::test]
    async fn test_all_day_mode_extends_grace_until_every_symbol_refreshed() {
        let mut r = rotation("A,a\nB,b\nC,c\nD,d\nE,e\nF,f\n");
        let market = FakeMarket::new();
        let all_day = settings(false);
        let t0 = Instant::now();

        // market hours, then the regular grace tail ending 16:30
        r.next_view(&market, 1, &all_day, &wednesday(15, 0), t0).await;
        r.next_view(&market, 2, &all_day, &wednesday(16, 10), t0).await;
        assert_eq!(r.offset(), 0);

        // past grace_end, B and C have not been refreshed yet
        let view = r.next_view(&market, 3, &all_day, &wednesday(16, 40), t0).await;
        assert!(view.is_some());
        assert!(r.tracker().in_grace());
        for s in ["A", "B", "C", "D", "E", "F"] {
            assert!(r.tracker().has_fetched(s));
        }

        // extension over, everything cached is served without fetching
        let view = r.next_view(&market, 4, &all_day, &wednesday(16, 45), t0).await;
        assert!(view.is_some());
        assert!(!r.tracker().in_grace());

        let calls = market.calls.borrow();
        assert_eq!(*calls, vec![
            vec!["A", "B", "C", "D"],
            vec!["D", "E", "F", "A"],
            vec!["B", "C"],
        ]);
    }

    #[tokio::test]
    async fn test_rate_limiter_blocks_bootstrap() {
        let mut r = StockRotation::new(entries("A,a\nB,b\nC,c\nD,d\nE,e\nF,f\n"),
            compute_market_window(Some(-5), 30), FETCH_INTERVAL);
        let market = FakeMarket::new();
        let t0 = Instant::now();

        r.next_view(&market, 1, &settings(true), &wednesday(10, 0), t0).await;
        // D and A are cached, E and F wait for the limiter
        let view = r.next_view(&market, 2, &settings(true), &wednesday(10, 1), t0 + Duration::from_secs(10)).await;
        match view {
            Some(StockView::Rows(rows)) => {
                let names: Vec<&str> = rows.iter().map(|(e, _)| e.symbol.as_str()).collect();
                assert_eq!(names, vec!["D", "A"]);
            }
            other => panic!("expected rows, got {:?}", other),
        }
        assert_eq!(market.calls.borrow().len(), 1);
        assert!(r.rate_limit_open(t0 + FETCH_INTERVAL));
    }
}
