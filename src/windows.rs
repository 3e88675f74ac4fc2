/*
 *  windows.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Market open/close/grace windows and commute hour ranges
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

use log::{info, warn};
use std::collections::HashSet;

/// NYSE session in minutes since midnight, US Eastern standard time.
pub const REFERENCE_OPEN_MINUTE: i32 = 9 * 60 + 30;
pub const REFERENCE_CLOSE_MINUTE: i32 = 16 * 60;
pub const REFERENCE_UTC_OFFSET: i32 = -5;

/// Local minute-of-day bounds of the trading session. Computed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketWindow {
    pub open_minute: i32,
    pub close_minute: i32,
    pub grace_end_minute: i32,
}

/// Translate the reference session into local time.
///
/// With no offset the local clock is taken to be the reference timezone.
pub fn compute_market_window(tz_offset_hours: Option<i32>, grace_minutes: u32) -> MarketWindow {
    let shift = match tz_offset_hours {
        Some(offset) => offset.saturating_sub(REFERENCE_UTC_OFFSET).saturating_mul(60),
        None => {
            warn!("No timezone offset available - treating local time as US Eastern for market hours");
            0
        }
    };

    let open_minute = REFERENCE_OPEN_MINUTE.saturating_add(shift);
    let close_minute = REFERENCE_CLOSE_MINUTE.saturating_add(shift);
    let grace = i32::try_from(grace_minutes).unwrap_or(i32::MAX);
    let window = MarketWindow {
        open_minute,
        close_minute,
        grace_end_minute: close_minute.saturating_add(grace),
    };
    info!("Market hours (local): {} - {}, grace until {}",
        hhmm(window.open_minute), hhmm(window.close_minute), hhmm(window.grace_end_minute));
    window
}

fn hhmm(minute: i32) -> String {
    format!("{:02}:{:02}", minute.div_euclid(60), minute.rem_euclid(60))
}

/// Monday = 0 .. Friday = 4
pub fn is_weekday(weekday: u32) -> bool {
    weekday <= 4
}

impl MarketWindow {
    pub fn is_market_hours(&self, now_minute: i32, weekday: u32) -> bool {
        is_weekday(weekday) && self.open_minute <= now_minute && now_minute < self.close_minute
    }

    pub fn is_grace_period(&self, now_minute: i32, weekday: u32) -> bool {
        is_weekday(weekday) && self.close_minute < now_minute && now_minute <= self.grace_end_minute
    }

    pub fn is_past_grace(&self, now_minute: i32, weekday: u32) -> bool {
        is_weekday(weekday) && now_minute > self.grace_end_minute
    }
}

/// Which symbols already got their post-close refresh this grace cycle.
#[derive(Debug, Default)]
pub struct GracePeriodTracker {
    fetched_symbols: HashSet<String>,
    previous_in_grace: bool,
}

impl GracePeriodTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed this cycle's grace state; clears the set on entry into grace.
    ///
    /// Returns true on the transition into grace.
    pub fn observe(&mut self, in_grace: bool) -> bool {
        let entered = in_grace && !self.previous_in_grace;
        if entered {
            info!("Entering grace period - clearing {} fetched symbols", self.fetched_symbols.len());
            self.fetched_symbols.clear();
        } else if !in_grace && self.previous_in_grace {
            info!("Grace period complete - {} symbols fetched", self.fetched_symbols.len());
        }
        self.previous_in_grace = in_grace;
        entered
    }

    pub fn in_grace(&self) -> bool {
        self.previous_in_grace
    }

    pub fn mark_fetched(&mut self, symbol: &str) {
        self.fetched_symbols.insert(symbol.to_string());
    }

    pub fn has_fetched(&self, symbol: &str) -> bool {
        self.fetched_symbols.contains(symbol)
    }

    pub fn pending<'a>(&self, symbols: &'a [String]) -> Vec<&'a str> {
        symbols
            .iter()
            .filter(|s| !self.fetched_symbols.contains(s.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Grace state for 24/7 display mode.
    ///
    /// Past `grace_end` on a weekday, grace continues while any symbol is
    /// still waiting for its refresh. A symbol whose fetch keeps failing
    /// holds the extension open until the next calendar day.
    pub fn in_extended_grace(&self, window: &MarketWindow, now_minute: i32, weekday: u32, symbols: &[String]) -> bool {
        if window.is_grace_period(now_minute, weekday) {
            return true;
        }
        if !window.is_past_grace(now_minute, weekday) || !self.previous_in_grace {
            return false;
        }
        let pending = self.pending(symbols);
        if pending.is_empty() {
            return false;
        }
        warn!("Grace period extended past {} - {} symbols pending: {}",
            hhmm(window.grace_end_minute), pending.len(), pending.join(", "));
        true
    }
}

/// `(start_hour, end_hour)` pairs, end exclusive. No ranges means always.
pub fn is_within_commute_hours(ranges: &[(u32, u32)], current_hour: u32) -> bool {
    ranges.is_empty() || ranges.iter().any(|&(start, end)| start <= current_hour && current_hour < end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_window_shifts_with_offset() {
        let central = compute_market_window(Some(-6), 30);
        assert_eq!(central.open_minute, 8 * 60 + 30);
        assert_eq!(central.close_minute, 15 * 60);
        assert_eq!(central.grace_end_minute, 15 * 60 + 30);

        let eastern = compute_market_window(None, 0);
        assert_eq!(eastern.open_minute, REFERENCE_OPEN_MINUTE);
        assert_eq!(eastern.grace_end_minute, eastern.close_minute);
    }

    #[test]
    fn test_huge_grace_saturates() {
        let w = compute_market_window(Some(-5), 2_147_483_647);
        assert_eq!(w.grace_end_minute, i32::MAX);
        let w = compute_market_window(Some(-5), u32::MAX);
        assert_eq!(w.grace_end_minute, i32::MAX);
        assert!(w.is_grace_period(23 * 60, 1));

        let w = compute_market_window(Some(i32::MAX), 0);
        assert_eq!(w.close_minute, i32::MAX);
    }

    #[test]
    fn test_market_and_grace_boundaries() {
        let w = compute_market_window(Some(-5), 30);
        assert!(w.is_market_hours(570, 0));
        assert!(!w.is_market_hours(960, 0));
        assert!(!w.is_market_hours(600, 5));

        assert!(!w.is_grace_period(960, 2));
        assert!(w.is_grace_period(961, 2));
        assert!(w.is_grace_period(990, 2));
        assert!(!w.is_grace_period(991, 2));
        assert!(!w.is_grace_period(970, 6));
    }

    #[test]
    fn test_tracker_clears_only_on_entry() {
        let mut t = GracePeriodTracker::new();
        t.mark_fetched("AAPL");
        assert!(t.observe(true));
        assert!(!t.has_fetched("AAPL"));

        t.mark_fetched("AAPL");
        assert!(!t.observe(true));
        assert!(t.has_fetched("AAPL"));

        t.observe(false);
        assert!(t.has_fetched("AAPL"));
        assert!(t.observe(true));
        assert!(!t.has_fetched("AAPL"));
    }

    #[test]
    fn test_extension_until_all_fetched() {
        let w = compute_market_window(Some(-5), 30);
        let list = symbols(&["AAPL", "MSFT"]);
        let mut t = GracePeriodTracker::new();

        t.observe(w.is_grace_period(970, 1));
        t.mark_fetched("AAPL");
        assert!(t.in_extended_grace(&w, 1000, 1, &list));

        t.mark_fetched("MSFT");
        assert!(!t.in_extended_grace(&w, 1000, 1, &list));
        assert!(!t.in_extended_grace(&w, 1000, 5, &list));
    }

    #[test]
    fn test_commute_hours() {
        assert!(is_within_commute_hours(&[], 3));
        let ranges = [(6, 9), (16, 19)];
        assert!(is_within_commute_hours(&ranges, 6));
        assert!(!is_within_commute_hours(&ranges, 9));
        assert!(is_within_commute_hours(&ranges, 18));
        assert!(!is_within_commute_hours(&ranges, 12));
    }
}
