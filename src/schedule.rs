/*
 *  schedule.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Named daily schedules that preempt the normal rotation
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

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use log::{debug, info, warn};
use std::fmt;
use std::path::Path;

use crate::error::BoardError;
use crate::http::{TextSource, csv_lines};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// How much of the schedule panel stays lit overnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NightMode {
    /// Image, temperature, UV bar
    #[default]
    Full,
    TemperatureOnly,
    /// No weather fetch at all
    ClockOnly,
}

impl NightMode {
    /// Anything outside 0..=2 is treated as full brightness.
    pub fn from_level(level: &str) -> NightMode {
        match level.trim().parse::<i32>() {
            Ok(1) => NightMode::TemperatureOnly,
            Ok(2) => NightMode::ClockOnly,
            _ => NightMode::Full,
        }
    }

    pub fn wants_weather(&self) -> bool {
        !matches!(self, NightMode::ClockOnly)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub name: String,
    pub enabled: bool,
    /// Indexed Monday = 0 .. Sunday = 6
    pub days: [bool; 7],
    pub start_minute: u32,
    pub end_minute: u32,
    pub image: String,
    pub show_progress: bool,
    pub night_mode: NightMode,
}

fn parse_field<T: std::str::FromStr>(field: &str, what: &str) -> Result<T, BoardError> {
    field
        .trim()
        .parse::<T>()
        .map_err(|_| BoardError::Parse(format!("invalid {}: {:?}", what, field)))
}

/// Minute of day for `hour,minute`; 24:00 is the only time past 23:59.
fn day_minute(hour: &str, minute: &str, which: &str, line: &str) -> Result<u32, BoardError> {
    let h: u32 = parse_field(hour, &format!("{} hour", which))?;
    let m: u32 = parse_field(minute, &format!("{} minute", which))?;
    if h > 24 || m > 59 || (h == 24 && m > 0) {
        return Err(BoardError::Parse(format!("{} time {}:{} out of range in {:?}", which, h, m, line)));
    }
    Ok(h * 60 + m)
}

impl Schedule {
    /// `name,enabled,days,start_hour,start_min,end_hour,end_min,image[,progress[,night_mode]]`
    pub fn parse_row(line: &str) -> Result<Schedule, BoardError> {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() < 8 {
            return Err(BoardError::Parse(format!("expected 8+ fields, got {}", parts.len())));
        }

        let mut days = [false; 7];
        for d in parts[2].chars().filter_map(|c| c.to_digit(10)) {
            if let Some(slot) = days.get_mut(d as usize) {
                *slot = true;
            }
        }

        let start_minute = day_minute(parts[3], parts[4], "start", line)?;
        let end_minute = day_minute(parts[5], parts[6], "end", line)?;

        Ok(Schedule {
            name: parts[0].to_string(),
            enabled: parts[1] == "1",
            days,
            start_minute,
            end_minute,
            image: parts[7].to_string(),
            show_progress: parts.get(8).map_or(true, |p| *p == "1"),
            night_mode: parts.get(9).map_or(NightMode::Full, |p| NightMode::from_level(p)),
        })
    }

    pub fn crosses_midnight(&self) -> bool {
        self.end_minute <= self.start_minute
    }

    pub fn is_active(&self, now: &NaiveDateTime) -> bool {
        if !self.enabled {
            return false;
        }
        let weekday = now.weekday().num_days_from_monday() as usize;
        if !self.days[weekday] {
            return false;
        }

        let now_minute = now.hour() * 60 + now.minute();
        if self.crosses_midnight() {
            now_minute >= self.start_minute || now_minute < self.end_minute
        } else {
            self.start_minute <= now_minute && now_minute < self.end_minute
        }
    }

    /// Seconds until the window closes, 0 when already over.
    pub fn remaining_seconds(&self, now: &NaiveDateTime) -> u32 {
        let now_minute = (now.hour() * 60 + now.minute()) as i64;
        let start = self.start_minute as i64;
        let end = self.end_minute as i64;

        let remaining_minutes = if self.crosses_midnight() && now_minute >= start {
            (MINUTES_PER_DAY as i64 - now_minute) + end
        } else {
            end - now_minute
        };
        if remaining_minutes <= 0 {
            return 0;
        }
        (remaining_minutes * 60 - now.second() as i64).max(0) as u32
    }

    pub fn window_seconds(&self) -> u32 {
        let minutes = if self.crosses_midnight() {
            MINUTES_PER_DAY - self.start_minute + self.end_minute
        } else {
            self.end_minute - self.start_minute
        };
        minutes * 60
    }

    /// Elapsed share of the window, 0.0 at the start and 1.0 at the end.
    pub fn progress(&self, now: &NaiveDateTime) -> f32 {
        let window = self.window_seconds();
        if window == 0 {
            return 1.0;
        }
        let remaining = self.remaining_seconds(now).min(window);
        1.0 - remaining as f32 / window as f32
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:02}:{:02}-{:02}:{:02}", self.name,
            self.start_minute / 60, self.start_minute % 60,
            self.end_minute / 60, self.end_minute % 60)
    }
}

/// Schedules in source order, unique by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleBook {
    entries: Vec<Schedule>,
}

impl ScheduleBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a CSV body, skipping rows that do not parse.
    pub fn parse(content: &str) -> ScheduleBook {
        let mut book = ScheduleBook::new();
        for line in csv_lines(content) {
            match Schedule::parse_row(line) {
                Ok(s) => book.insert(s),
                Err(e) => warn!("Skipping schedule row {:?}: {}", line, e),
            }
        }
        debug!("Parsed {} schedules from CSV", book.len());
        book
    }

    /// A repeated name replaces the earlier entry but keeps its position.
    pub fn insert(&mut self, schedule: Schedule) {
        match self.entries.iter_mut().find(|s| s.name == schedule.name) {
            Some(existing) => *existing = schedule,
            None => self.entries.push(schedule),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Schedule> {
        self.entries.iter()
    }

    /// First schedule in source order whose window contains `now`.
    pub fn active(&self, now: &NaiveDateTime) -> Option<&Schedule> {
        self.entries.iter().find(|s| s.is_active(now))
    }
}

/// Where the book in use was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOrigin {
    Remote(String),
    Local,
    Retained,
}

/// Directory part of the configured schedule URL.
pub fn schedule_base(url: &str) -> &str {
    let url = url.trim_end_matches('/');
    if url.ends_with(".csv") {
        url.rsplit_once('/').map_or(url, |(base, _)| base)
    } else {
        url
    }
}

async fn fetch_remote<S: TextSource>(base_url: &str, today: NaiveDate, source: &S) -> Option<(ScheduleBook, String)> {
    let base = schedule_base(base_url);
    let date_file = format!("{}.csv", today.format("%Y-%m-%d"));

    for file in [date_file.as_str(), "default.csv"] {
        let url = format!("{}/{}", base, file);
        match source.get_text(&url).await {
            Ok(Some(body)) => {
                let book = ScheduleBook::parse(&body);
                info!("Loaded {} schedules from {}", book.len(), file);
                return Some((book, file.to_string()));
            }
            Ok(None) => debug!("No schedule file {}, trying next", file),
            Err(e) => {
                warn!("Remote schedule fetch failed: {}", e);
                return None;
            }
        }
    }
    None
}

fn load_local(path: &Path) -> ScheduleBook {
    match std::fs::read_to_string(path) {
        Ok(content) => ScheduleBook::parse(&content),
        Err(e) => {
            debug!("Local {} not loaded: {}", path.display(), e);
            ScheduleBook::new()
        }
    }
}

/// Remote dated file, remote default, local file, else keep `current`.
pub async fn load_schedules<S: TextSource>(
    current: &ScheduleBook,
    base_url: Option<&str>,
    local_path: &Path,
    source: &S,
    today: NaiveDate,
) -> (ScheduleBook, ScheduleOrigin) {
    if let Some(url) = base_url.filter(|u| !u.is_empty()) {
        if let Some((book, file)) = fetch_remote(url, today, source).await {
            if !book.is_empty() {
                return (book, ScheduleOrigin::Remote(file));
            }
        }
    }

    let local = load_local(local_path);
    if !local.is_empty() {
        info!("Loaded {} schedules from local {}", local.len(), local_path.display());
        return (local, ScheduleOrigin::Local);
    }

    debug!("No schedules loaded - keeping {} in memory", current.len());
    (current.clone(), ScheduleOrigin::Retained)
}
