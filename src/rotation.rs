/*
 *  rotation.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  The board's main loop: one cycle picks and holds the panels to show
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
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};

use crate::config::{Config, Paths, RemoteConfig, Timing};
use crate::display::{DisplaySurface, NamedColor, Panel};
use crate::error::{BoardError, BoardResult};
use crate::events::{self, EventCalendar};
use crate::freshness::{FetchStats, FreshnessCache};
use crate::hardware::{Clock, NetworkLink, StopButton, hold};
use crate::http::TextSource;
use crate::metrics::MachineMetrics;
use crate::schedule::{self, ScheduleBook, ScheduleOrigin};
use crate::settings::{self, DisplaySettings};
use crate::stocks::{self, StockProvider, StockRotation, StockView};
use crate::transit::{self, TRANSIT_TTL, TransitBoard, TransitProvider};
use crate::weather::{self, CurrentWeather, FORECAST_TTL, ForecastHour, WEATHER_TTL, WeatherProvider};
use crate::windows::compute_market_window;

/// Remote data the board pulls.
pub struct Feeds<S, W, K, R> {
    pub text: S,
    pub weather: W,
    pub stocks: K,
    pub transit: R,
}

/// Local hardware the board drives or samples.
pub struct Devices<D, C, N, B> {
    pub display: D,
    pub clock: C,
    pub link: N,
    pub stop: B,
}

/// What one cycle put on the matrix, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub panels: Vec<&'static str>,
    /// Name of the schedule that took the whole cycle
    pub schedule: Option<String>,
}

/// Whole-board state owned by the loop.
pub struct App<S, W, K, R, D, C, N, B> {
    feeds: Feeds<S, W, K, R>,
    devices: Devices<D, C, N, B>,
    timing: Timing,
    paths: Paths,
    remote: RemoteConfig,
    tz_offset: Option<i32>,
    max_cycles: Option<u64>,

    cycle: u64,
    started: Instant,
    settings: DisplaySettings,
    schedules: ScheduleBook,
    events: EventCalendar,
    weather: FreshnessCache<CurrentWeather>,
    forecast: FreshnessCache<Vec<ForecastHour>>,
    stocks: Option<StockRotation>,
    transit: Option<TransitBoard>,
}

impl<S, W, K, R, D, C, N, B> App<S, W, K, R, D, C, N, B>
where
    S: TextSource,
    W: WeatherProvider,
    K: StockProvider,
    R: TransitProvider,
    D: DisplaySurface,
    C: Clock,
    N: NetworkLink,
    B: StopButton,
{
    pub fn new(config: &Config, feeds: Feeds<S, W, K, R>, devices: Devices<D, C, N, B>) -> Self {
        let started = devices.clock.monotonic();
        Self {
            feeds,
            devices,
            timing: config.timing(),
            paths: config.paths(),
            remote: config.remote(),
            tz_offset: config.timezone_offset,
            max_cycles: config.max_cycles.filter(|n| *n > 0),
            cycle: 0,
            started,
            settings: DisplaySettings::default(),
            schedules: ScheduleBook::new(),
            events: EventCalendar::default(),
            weather: FreshnessCache::new("weather"),
            forecast: FreshnessCache::new("forecast"),
            stocks: None,
            transit: None,
        }
    }

    /// Offset used for the market window when the config has none.
    pub fn with_tz_offset(mut self, tz_offset: Option<i32>) -> Self {
        if self.tz_offset.is_none() {
            self.tz_offset = tz_offset;
        }
        self
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn settings(&self) -> &DisplaySettings {
        &self.settings
    }

    pub fn schedules(&self) -> &ScheduleBook {
        &self.schedules
    }

    pub fn devices(&self) -> &Devices<D, C, N, B> {
        &self.devices
    }

    pub fn stocks(&self) -> Option<&StockRotation> {
        self.stocks.as_ref()
    }

    pub fn fetch_stats(&self) -> FetchStats {
        let mut stats = self.weather.stats().merge(self.forecast.stats());
        if let Some(s) = &self.stocks {
            stats = stats.merge(s.stats());
        }
        if let Some(t) = &self.transit {
            stats = stats.merge(t.stats());
        }
        stats
    }

    /// Render then hold. A render failure is logged and skipped, only the stop input is fatal.
    async fn show(&mut self, panel: Panel, duration: Duration, report: &mut CycleReport) -> BoardResult<()> {
        match self.devices.display.show(&panel) {
            Ok(()) => report.panels.push(panel.kind()),
            Err(e) => {
                warn!("Rendering {} failed: {}", panel.kind(), e);
                return Ok(());
            }
        }
        hold(duration, &self.devices.stop, self.timing.poll).await
    }

    async fn show_clock(&mut self, report: &mut CycleReport) -> BoardResult<()> {
        let now = self.devices.clock.local_now();
        self.show(Panel::Clock { now }, self.timing.clock, report).await
    }

    async fn show_message(&mut self, text: &str, color: NamedColor, report: &mut CycleReport) -> BoardResult<()> {
        let panel = Panel::Message { text: text.to_string(), color };
        self.show(panel, self.timing.message, report).await
    }

    fn reload_due(&self) -> bool {
        self.cycle == 1 || self.cycle % self.timing.reload_every_cycles.max(1) == 0
    }

    /// Settings, schedules and events, each keeping what it had on failure.
    pub async fn reload(&mut self) {
        let mono = self.devices.clock.monotonic();
        let today = self.devices.clock.local_now().date();

        self.settings = settings::load_config(
            &self.settings,
            &self.paths.settings,
            self.remote.settings_url.as_deref(),
            &self.feeds.text,
            mono,
        )
        .await;

        let (book, origin) = schedule::load_schedules(
            &self.schedules,
            self.remote.schedules_url.as_deref(),
            &self.paths.schedules,
            &self.feeds.text,
            today,
        )
        .await;
        if origin != ScheduleOrigin::Retained {
            debug!("Schedules from {:?}", origin);
        }
        self.schedules = book;

        self.events = events::load_events(
            &self.paths.events,
            &self.paths.dated_events,
            self.remote.events_url.as_deref(),
            &self.feeds.text,
            today,
        )
        .await;
    }

    async fn current_weather(&mut self) -> Option<CurrentWeather> {
        let now = self.devices.clock.monotonic();
        let unit = self.settings.temperature_unit;
        let provider = &self.feeds.weather;
        self.weather.get_or_fetch(now, WEATHER_TTL, || provider.current(unit)).await
    }

    async fn hourly_forecast(&mut self) -> Option<Vec<ForecastHour>> {
        let now = self.devices.clock.monotonic();
        let unit = self.settings.temperature_unit;
        let provider = &self.feeds.weather;
        self.forecast.get_or_fetch(now, FORECAST_TTL, || provider.forecast(unit)).await
    }

    /// Active schedule with time left, shown alone. True when it took the cycle.
    async fn schedule_step(&mut self, local: &NaiveDateTime, report: &mut CycleReport) -> BoardResult<bool> {
        if !self.settings.display_schedules {
            return Ok(false);
        }
        let Some(active) = self.schedules.active(local).cloned() else {
            return Ok(false);
        };
        let remaining = active.remaining_seconds(local);
        if remaining == 0 {
            debug!("Schedule {} has no time left", active.name);
            return Ok(false);
        }

        let weather = if self.settings.schedules_show_weather && active.night_mode.wants_weather() {
            self.current_weather().await
        } else {
            None
        };
        let segment = Duration::from_secs(remaining as u64).min(self.timing.schedule_segment);
        info!("Schedule {} active, {}s left, showing for {}s", active, remaining, segment.as_secs());

        report.schedule = Some(active.name.clone());
        let panel = Panel::Schedule {
            progress: active.show_progress.then(|| active.progress(local)),
            schedule: active,
            now: *local,
            weather,
        };
        self.show(panel, segment, report).await?;
        Ok(true)
    }

    /// False when the link stayed down and the cycle should end on the clock.
    async fn network_step(&mut self, report: &mut CycleReport) -> BoardResult<bool> {
        if self.devices.link.is_connected() {
            return Ok(true);
        }
        warn!("Network down");
        self.show_message("NO WIFI", NamedColor::Red, report).await?;
        if self.devices.link.reconnect(self.timing.reconnect_attempts).await {
            self.show_message("WIFI OK", NamedColor::Green, report).await?;
            return Ok(true);
        }
        error!("Reconnect failed - clock only this cycle");
        self.show_clock(report).await?;
        Ok(false)
    }

    async fn weather_step(&mut self, report: &mut CycleReport) -> BoardResult<()> {
        if !self.settings.display_weather {
            return Ok(());
        }
        match self.current_weather().await {
            Some(weather) => {
                let unit = self.settings.temperature_unit;
                self.show(Panel::Weather { weather, unit }, self.timing.weather, report).await
            }
            None => {
                warn!("No weather data - skipping weather panel");
                Ok(())
            }
        }
    }

    async fn forecast_step(&mut self, local: &NaiveDateTime, report: &mut CycleReport) -> BoardResult<()> {
        if !self.settings.display_forecast {
            return Ok(());
        }
        let current = self.current_weather().await;
        let hours = self.hourly_forecast().await;
        match (current, hours) {
            (Some(current), Some(hours)) if hours.len() >= 2 => {
                let now_label = local.format("%-I:%M").to_string();
                let columns = weather::forecast_columns(&current, &hours, local.hour(), now_label);
                self.show(Panel::Forecast { columns }, self.timing.forecast, report).await
            }
            _ => {
                warn!("Forecast needs current weather and two hourly entries - skipping");
                Ok(())
            }
        }
    }

    async fn events_step(&mut self, local: &NaiveDateTime, report: &mut CycleReport) -> BoardResult<()> {
        if !self.settings.display_events {
            return Ok(());
        }
        let active: Vec<events::Event> = self.events.active(local).into_iter().cloned().collect();
        if active.is_empty() {
            return Ok(());
        }
        let each = events::split_hold(self.timing.events, active.len(), self.timing.event_min);
        info!("Showing {} event(s), {}s each", active.len(), each.as_secs());
        for event in active {
            self.show(Panel::Event { event }, each, report).await?;
        }
        Ok(())
    }

    /// First use builds the rotation: static list plus the market window.
    async fn ensure_stock_rotation(&mut self) {
        if self.stocks.is_some() {
            return;
        }
        if self.tz_offset.is_none() {
            warn!("No timezone offset - market hours taken as US Eastern local time");
        }
        let window = compute_market_window(self.tz_offset, self.settings.stocks_grace_period_minutes);
        let entries = stocks::load_stock_list(
            self.remote.stocks_url.as_deref(),
            &self.paths.stocks,
            &self.feeds.text,
        )
        .await;
        info!("Stock rotation over {} symbols", entries.len());
        self.stocks = Some(StockRotation::new(entries, window, self.timing.stock_fetch_interval));
    }

    async fn stocks_step(&mut self, local: &NaiveDateTime, report: &mut CycleReport) -> BoardResult<()> {
        if !self.settings.display_stocks {
            return Ok(());
        }
        let cycle = self.cycle;
        let mono = self.devices.clock.monotonic();

        self.ensure_stock_rotation().await;
        let Some(rotation) = self.stocks.as_mut() else {
            return Ok(());
        };
        let view = rotation.next_view(&self.feeds.stocks, cycle, &self.settings, local, mono).await;

        let panel = match view {
            Some(StockView::Chart { entry, quote, series }) => Panel::StockChart { entry, quote, series },
            Some(StockView::Rows(rows)) => Panel::StockRows { rows },
            None => return Ok(()),
        };
        self.show(panel, self.timing.stocks, report).await
    }

    async fn transit_step(&mut self, local: &NaiveDateTime, report: &mut CycleReport) -> BoardResult<()> {
        if !self.settings.display_transit {
            return Ok(());
        }
        if self.transit.is_none() {
            let routes = transit::load_routes(
                &self.paths.transits,
                self.remote.transits_url.as_deref(),
                &self.feeds.text,
            )
            .await;
            self.transit = Some(TransitBoard::new(routes, TRANSIT_TTL));
        }
        let Some(board) = self.transit.as_mut() else {
            return Ok(());
        };
        let rows = board
            .board(&self.feeds.transit, local.hour(), self.settings.transit_respect_commute_hours)
            .await;
        if rows.is_empty() {
            debug!("No transit arrivals to show");
            return Ok(());
        }
        self.show(Panel::Transit { rows }, self.timing.transit, report).await
    }

    fn diagnostics(&self) {
        let stats = self.fetch_stats();
        let uptime = self.devices.clock.monotonic().saturating_duration_since(self.started);
        info!(
            "Cycle {} diagnostics: {} | fetches {} errors {} | settings {} (loads {}) | {} schedules | {} events | up {}m",
            self.cycle,
            MachineMetrics::check(),
            stats.attempts,
            stats.errors,
            self.settings.source,
            self.settings.load_count,
            self.schedules.len(),
            self.events.len(),
            uptime.as_secs() / 60
        );
    }

    /// One pass of the rotation. Only [`BoardError::Cancelled`] comes back as an error.
    pub async fn run_cycle(&mut self) -> BoardResult<CycleReport> {
        self.cycle += 1;
        let mut report = CycleReport { cycle: self.cycle, ..Default::default() };
        debug!("=== Cycle {} ===", self.cycle);

        if self.reload_due() {
            self.reload().await;
        }

        let local = self.devices.clock.local_now();
        let weekday = local.weekday().num_days_from_monday();
        self.devices
            .display
            .set_weekday_indicator(self.settings.display_weekday_indicator.then_some(weekday));

        if self.schedule_step(&local, &mut report).await? {
            return Ok(report);
        }
        if !self.network_step(&mut report).await? {
            return Ok(report);
        }

        self.weather_step(&mut report).await?;
        self.forecast_step(&local, &mut report).await?;
        self.events_step(&local, &mut report).await?;
        self.stocks_step(&local, &mut report).await?;
        self.transit_step(&local, &mut report).await?;

        if self.settings.display_clock {
            self.show_clock(&mut report).await?;
        }
        if report.panels.is_empty() {
            debug!("Nothing rendered - clock fallback");
            self.show_clock(&mut report).await?;
        }

        if self.cycle % self.timing.memory_check_interval.max(1) == 0 {
            self.diagnostics();
        }
        Ok(report)
    }

    /// Cycle until the stop input fires or `max_cycles` is reached.
    pub async fn run(&mut self) -> BoardResult<()> {
        info!("Starting rotation");
        loop {
            match self.run_cycle().await {
                Ok(report) => debug!("Cycle {} showed {:?}", report.cycle, report.panels),
                Err(BoardError::Cancelled) => {
                    info!("Stop requested");
                    break;
                }
                Err(e) => error!("Cycle {} failed: {}", self.cycle, e),
            }
            if self.max_cycles.is_some_and(|max| self.cycle >= max) {
                info!("Reached {} cycles", self.cycle);
                break;
            }
        }
        self.shutdown();
        Ok(())
    }

    /// Final stats and a parting message; never holds.
    pub fn shutdown(&mut self) {
        let stats = self.fetch_stats();
        let uptime = self.devices.clock.monotonic().saturating_duration_since(self.started);
        info!("Total cycles: {}", self.cycle);
        info!("Uptime: {:.1} minutes", uptime.as_secs_f64() / 60.0);
        info!("Fetches: {} attempts, {} errors", stats.attempts, stats.errors);
        let panel = Panel::Message { text: "STOPPED".into(), color: NamedColor::Orange };
        if let Err(e) = self.devices.display.show(&panel) {
            warn!("Could not show stop message: {}", e);
        }
    }
}
