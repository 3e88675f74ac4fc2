/*
 *  events.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Calendar events, recurring MM-DD rows and one-off dated rows
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
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::display::color::NamedColor;
use crate::error::BoardError;
use crate::http::{TextSource, csv_lines};

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub top: String,
    pub bottom: String,
    pub image: String,
    /// Bottom line colour
    pub color: NamedColor,
    pub start_hour: u32,
    /// Exclusive, 24 runs to midnight
    pub end_hour: u32,
}

impl Event {
    pub fn is_active(&self, hour: u32) -> bool {
        self.start_hour <= hour && hour < self.end_hour
    }
}

/// How the date column of a row is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStyle {
    /// `MM-DD`, every year
    Recurring,
    /// `YYYY-MM-DD`, rows before `today` are dropped
    Dated { today: NaiveDate },
}

fn day_key(month: u32, day: u32) -> String {
    format!("{:02}{:02}", month, day)
}

fn hour_or(field: Option<&&str>, default: u32, valid: std::ops::RangeInclusive<u32>) -> u32 {
    match field.filter(|f| !f.is_empty()).map(|f| f.parse::<u32>()) {
        None => default,
        Some(Ok(h)) if valid.contains(&h) => h,
        Some(_) => {
            warn!("Event hour {:?} out of range - using {}", field, default);
            default
        }
    }
}

/// Day key and event from one row.
fn parse_row(line: &str, style: DateStyle) -> Result<Option<(String, Event)>, BoardError> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 5 {
        return Err(BoardError::Parse(format!("expected date,top,bottom,image,color in {:?}", line)));
    }

    let start_hour = hour_or(parts.get(5), 0, 0..=23);
    let end_hour = hour_or(parts.get(6), 24, 1..=24);
    if start_hour >= end_hour {
        return Err(BoardError::Parse(format!("invalid time window {}-{} for {}", start_hour, end_hour, parts[0])));
    }

    let bad_date = || BoardError::Parse(format!("invalid date {:?}", parts[0]));
    let fields: Vec<u32> = parts[0]
        .split('-')
        .map(|p| p.parse::<u32>().map_err(|_| bad_date()))
        .collect::<Result<_, _>>()?;

    let (month, day) = match (style, fields.as_slice()) {
        (DateStyle::Recurring, [m, d]) => (*m, *d),
        (DateStyle::Dated { today }, [y, m, d]) => {
            let date = NaiveDate::from_ymd_opt(*y as i32, *m, *d).ok_or_else(bad_date)?;
            if date < today {
                debug!("Skipping past event: {}", parts[0]);
                return Ok(None);
            }
            (*m, *d)
        }
        _ => return Err(bad_date()),
    };
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(bad_date());
    }

    let event = Event {
        top: parts[1].to_string(),
        bottom: parts[2].to_string(),
        image: parts[3].to_string(),
        color: NamedColor::parse_or_white(parts[4], parts[0]),
        start_hour,
        end_hour,
    };
    Ok(Some((day_key(month, day), event)))
}

/// Events grouped by `MMDD`, source order kept within a day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventCalendar {
    by_day: BTreeMap<String, Vec<Event>>,
}

impl EventCalendar {
    pub fn parse(content: &str, style: DateStyle) -> EventCalendar {
        let mut calendar = EventCalendar::default();
        for line in csv_lines(content) {
            match parse_row(line, style) {
                Ok(Some((key, event))) => calendar.by_day.entry(key).or_default().push(event),
                Ok(None) => {}
                Err(e) => warn!("Skipping event row: {}", e),
            }
        }
        debug!("Parsed {} events ({} dates)", calendar.len(), calendar.by_day.len());
        calendar
    }

    /// Both sides survive, `other` appended after `self` on shared days.
    pub fn merge(mut self, other: EventCalendar) -> EventCalendar {
        for (key, events) in other.by_day {
            self.by_day.entry(key).or_default().extend(events);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.by_day.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_day.is_empty()
    }

    pub fn on(&self, month: u32, day: u32) -> &[Event] {
        self.by_day.get(&day_key(month, day)).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn active(&self, now: &NaiveDateTime) -> Vec<&Event> {
        let today = self.on(now.month(), now.day());
        let active: Vec<&Event> = today.iter().filter(|e| e.is_active(now.hour())).collect();
        if active.len() < today.len() {
            match today.iter().map(|e| e.start_hour).filter(|h| *h > now.hour()).min() {
                Some(next) => debug!("{} event(s) inactive today, next at {}:00", today.len() - active.len(), next),
                None => debug!("{} event(s) inactive today, window passed", today.len() - active.len()),
            }
        }
        active
    }
}

/// Per-event hold when several share one slot.
pub fn split_hold(total: Duration, count: usize, minimum: Duration) -> Duration {
    match count {
        0 | 1 => total,
        n => (total / n as u32).max(minimum),
    }
}

fn read_local(path: &Path, style: DateStyle) -> Option<EventCalendar> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(EventCalendar::parse(&content, style)),
        Err(e) => {
            debug!("Local {} not loaded: {}", path.display(), e);
            None
        }
    }
}

/// Recurring local events plus dated events (remote first, local dated file second).
pub async fn load_events<S: TextSource>(
    recurring_path: &Path,
    dated_path: &Path,
    remote_url: Option<&str>,
    source: &S,
    today: NaiveDate,
) -> EventCalendar {
    let dated_style = DateStyle::Dated { today };
    let recurring = read_local(recurring_path, DateStyle::Recurring).unwrap_or_default();

    let mut dated = None;
    if let Some(url) = remote_url.filter(|u| !u.is_empty()) {
        match source.get_text(url).await {
            Ok(Some(body)) => {
                let calendar = EventCalendar::parse(&body, dated_style);
                if !calendar.is_empty() {
                    info!("Loaded {} dated events from remote", calendar.len());
                    dated = Some(calendar);
                }
            }
            Ok(None) => warn!("Remote events fetch failed: HTTP 404"),
            Err(e) => warn!("Remote events fetch error: {}", e),
        }
    }
    let dated = dated
        .or_else(|| read_local(dated_path, dated_style).filter(|c| !c.is_empty()))
        .unwrap_or_default();

    let merged = recurring.merge(dated);
    info!("Events: {} total across {} dates", merged.len(), merged.by_day.len());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
    }

    fn at(month: u32, day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, month, day).unwrap().and_hms_opt(hour, 0, 0).unwrap()
    }

    #[test]
    fn test_recurring_rows_and_windows() {
        let cal = EventCalendar::parse(
            "# date,top,bottom,image,color\n\
             12-25,Merry,Christmas,tree.svg,GREEN,8,20\n\
             12-25,Happy,Holidays,blank.svg,bugambilia\n\
             12-25,Bad,Window,blank.svg,RED,20,8\n\
             13-01,Bad,Month,blank.svg,RED\n\
             10-15,Hi,There\n",
            DateStyle::Recurring,
        );
        assert_eq!(cal.len(), 2);
        let day = cal.on(12, 25);
        assert_eq!(day[0].color, NamedColor::Green);
        assert_eq!(day[1].color, NamedColor::White);
        assert_eq!((day[1].start_hour, day[1].end_hour), (0, 24));

        assert_eq!(cal.active(&at(12, 25, 7)).len(), 1);
        assert_eq!(cal.active(&at(12, 25, 8)).len(), 2);
        assert_eq!(cal.active(&at(12, 25, 20)).len(), 1);
        assert!(cal.active(&at(12, 24, 12)).is_empty());
    }

    #[test]
    fn test_out_of_range_hours_default() {
        let cal = EventCalendar::parse("01-01,New,Year,x.svg,RED,30,0", DateStyle::Recurring);
        let e = &cal.on(1, 1)[0];
        assert_eq!((e.start_hour, e.end_hour), (0, 24));
    }

    #[test]
    fn test_dated_rows_skip_the_past() {
        let cal = EventCalendar::parse(
            "2026-10-14,Old,News,x.svg,RED\n\
             2026-10-15,Today,Only,x.svg,MINT,9,17\n\
             2027-01-02,Next,Year,x.svg,AQUA\n\
             10-20,Wrong,Style,x.svg,RED\n",
            DateStyle::Dated { today: today() },
        );
        assert_eq!(cal.len(), 2);
        assert_eq!(cal.on(10, 15)[0].top, "Today");
        assert_eq!(cal.on(1, 2)[0].color, NamedColor::Aqua);
    }

    #[test]
    fn test_merge_keeps_both() {
        let a = EventCalendar::parse("10-15,A,a,x.svg,RED", DateStyle::Recurring);
        let b = EventCalendar::parse("2026-10-15,B,b,x.svg,RED", DateStyle::Dated { today: today() });
        let merged = a.merge(b);
        let tops: Vec<_> = merged.on(10, 15).iter().map(|e| e.top.as_str()).collect();
        assert_eq!(tops, vec!["A", "B"]);
    }

    #[test]
    fn test_split_hold() {
        let total = Duration::from_secs(60);
        let min = Duration::from_secs(10);
        assert_eq!(split_hold(total, 1, min), total);
        assert_eq!(split_hold(total, 3, min), Duration::from_secs(20));
        assert_eq!(split_hold(total, 8, min), min);
    }

    struct Remote(Option<&'static str>);

    impl TextSource for Remote {
        async fn get_text(&self, _url: &str) -> Result<Option<String>, BoardError> {
            Ok(self.0.map(String::from))
        }
    }

    #[tokio::test]
    async fn test_load_prefers_remote_dated_and_keeps_recurring() {
        let dir = tempfile::tempdir().unwrap();
        let recurring = dir.path().join("events.csv");
        let dated = dir.path().join("ephemeral_events.csv");
        std::fs::File::create(&recurring).unwrap().write_all(b"10-15,Local,Birthday,cake.svg,PINK\n").unwrap();
        std::fs::File::create(&dated).unwrap().write_all(b"2026-10-15,Local,Dated,x.svg,RED\n").unwrap();

        let cal = load_events(&recurring, &dated, Some("http://x/events.csv"),
            &Remote(Some("2026-10-15,Remote,Dated,x.svg,RED\n")), today()).await;
        let tops: Vec<_> = cal.on(10, 15).iter().map(|e| e.bottom.as_str()).collect();
        assert_eq!(tops, vec!["Birthday", "Dated"]);
        assert_eq!(cal.on(10, 15)[1].top, "Remote");

        let cal = load_events(&recurring, &dated, Some("http://x/events.csv"), &Remote(None), today()).await;
        assert_eq!(cal.on(10, 15)[1].top, "Local");
    }
}
