/*
 *  settings.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display settings layered from defaults, local config.csv and a remote URL
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

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use crate::http::TextSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[serde(rename = "F")]
    Fahrenheit,
    #[serde(rename = "C")]
    Celsius,
}

impl TemperatureUnit {
    pub fn is_metric(&self) -> bool {
        matches!(self, TemperatureUnit::Celsius)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureUnit::Fahrenheit => "F",
            TemperatureUnit::Celsius => "C",
        }
    }
}

impl FromStr for TemperatureUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "F" => Ok(TemperatureUnit::Fahrenheit),
            "C" => Ok(TemperatureUnit::Celsius),
            _ => Err(format!("Invalid temperature unit: {} (must be F or C)", s)),
        }
    }
}

/// A grace tail longer than a day is never meaningful
pub const MAX_GRACE_MINUTES: u32 = 24 * 60;

/// Where the effective settings last came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsSource {
    Default,
    Local,
    Remote,
}

impl fmt::Display for SettingsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SettingsSource::Default => "default",
            SettingsSource::Local => "local",
            SettingsSource::Remote => "remote",
        };
        f.write_str(s)
    }
}

/// Effective display toggles for the rotation loop.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySettings {
    pub display_weather: bool,
    pub display_forecast: bool,
    pub display_clock: bool,
    pub display_stocks: bool,
    pub display_schedules: bool,
    pub display_transit: bool,
    pub display_events: bool,
    pub display_weekday_indicator: bool,
    pub schedules_show_weather: bool,
    pub stocks_respect_market_hours: bool,
    pub transit_respect_commute_hours: bool,
    pub temperature_unit: TemperatureUnit,
    pub stocks_display_frequency: u32,
    pub stocks_grace_period_minutes: u32,

    pub source: SettingsSource,
    pub load_count: u32,
    pub last_load: Option<Instant>,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            display_weather: true,
            display_forecast: true,
            display_clock: false,
            display_stocks: false,
            display_schedules: true,
            display_transit: false,
            display_events: true,
            display_weekday_indicator: true,
            schedules_show_weather: true,
            stocks_respect_market_hours: true,
            transit_respect_commute_hours: true,
            temperature_unit: TemperatureUnit::Fahrenheit,
            stocks_display_frequency: 3,
            stocks_grace_period_minutes: 30,
            source: SettingsSource::Default,
            load_count: 0,
            last_load: None,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Split a `setting,value` line on its first comma.
///
/// Blank lines, `#` comments and the `setting,value` header yield `None`.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with("setting,") {
        return None;
    }
    let (key, value) = line.split_once(',')?;
    Some((key.trim(), value.trim()))
}

impl DisplaySettings {
    fn bool_slot(&mut self, key: &str) -> Option<&mut bool> {
        let slot = match key {
            "display_weather" => &mut self.display_weather,
            "display_forecast" => &mut self.display_forecast,
            "display_clock" => &mut self.display_clock,
            "display_stocks" => &mut self.display_stocks,
            "display_schedules" => &mut self.display_schedules,
            "display_transit" => &mut self.display_transit,
            "display_events" => &mut self.display_events,
            "display_weekday_indicator" => &mut self.display_weekday_indicator,
            "schedules_show_weather" => &mut self.schedules_show_weather,
            "stocks_respect_market_hours" => &mut self.stocks_respect_market_hours,
            "transit_respect_commute_hours" => &mut self.transit_respect_commute_hours,
            _ => return None,
        };
        Some(slot)
    }

    /// Apply one key/value pair, returns whether it took effect.
    pub fn apply(&mut self, key: &str, value: &str) -> bool {
        if let Some(slot) = self.bool_slot(key) {
            return match parse_bool(value) {
                Some(b) => {
                    *slot = b;
                    true
                }
                None => {
                    warn!("Invalid boolean value for {}: {}", key, value);
                    false
                }
            };
        }

        match key {
            "temperature_unit" => match value.parse::<TemperatureUnit>() {
                Ok(unit) => {
                    self.temperature_unit = unit;
                    true
                }
                Err(e) => {
                    warn!("{}", e);
                    false
                }
            },
            "stocks_display_frequency" => match value.parse::<i64>() {
                Ok(n) if n >= 1 && n <= u32::MAX as i64 => {
                    self.stocks_display_frequency = n as u32;
                    true
                }
                Ok(_) => {
                    warn!("Invalid stocks_display_frequency: {} (must be >= 1)", value);
                    false
                }
                Err(_) => {
                    warn!("Invalid integer for stocks_display_frequency: {}", value);
                    false
                }
            },
            "stocks_grace_period_minutes" => match value.parse::<i64>() {
                Ok(n) if (0..=MAX_GRACE_MINUTES as i64).contains(&n) => {
                    self.stocks_grace_period_minutes = n as u32;
                    true
                }
                Ok(_) => {
                    warn!("Invalid stocks_grace_period_minutes: {} (must be 0-{})", value, MAX_GRACE_MINUTES);
                    false
                }
                Err(_) => {
                    warn!("Invalid integer for stocks_grace_period_minutes: {}", value);
                    false
                }
            },
            _ => {
                warn!("Unknown setting: {}", key);
                false
            }
        }
    }

    /// Apply every line of a CSV body, returns the count that took effect.
    pub fn apply_text(&mut self, content: &str) -> usize {
        content
            .lines()
            .filter_map(parse_line)
            .filter(|(k, v)| self.apply(k, v))
            .count()
    }

    fn log_summary(&self) {
        info!("Config loaded (source: {})", self.source);
        info!("  Weather: {}, Forecast: {}, Stocks: {}, Clock: {}, Schedules: {}, Transit: {}, Events: {}",
            self.display_weather, self.display_forecast, self.display_stocks,
            self.display_clock, self.display_schedules, self.display_transit, self.display_events);
        info!("  Temperature unit: {}", self.temperature_unit.as_str());
        info!("  Stocks frequency: {}, Respect market hours: {}, Grace period: {}min",
            self.stocks_display_frequency, self.stocks_respect_market_hours,
            self.stocks_grace_period_minutes);
    }
}

fn load_local(settings: &mut DisplaySettings, path: &Path) -> bool {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("Local {} not found - using defaults", path.display());
            return false;
        }
        Err(e) => {
            warn!("Error loading local config {}: {}", path.display(), e);
            return false;
        }
    };

    let applied = settings.apply_text(&content);
    if applied > 0 {
        info!("Loaded {} settings from local {}", applied, path.display());
        settings.source = SettingsSource::Local;
        true
    } else {
        warn!("No valid settings found in local {}", path.display());
        false
    }
}

async fn load_remote<S: TextSource>(settings: &mut DisplaySettings, url: Option<&str>, source: &S) -> bool {
    let Some(url) = url.filter(|u| !u.is_empty()) else {
        debug!("No remote config URL configured - skipping remote config");
        return false;
    };

    let content = match source.get_text(url).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            warn!("Remote config fetch failed: HTTP 404");
            return false;
        }
        Err(e) => {
            warn!("Remote config fetch failed: {}", e);
            return false;
        }
    };

    let applied = settings.apply_text(&content);
    if applied > 0 {
        info!("Loaded {} settings from remote config", applied);
        settings.source = SettingsSource::Remote;
        true
    } else {
        warn!("No valid settings found in remote config");
        false
    }
}

/// Produce the next settings snapshot: `current`, then local file, then remote.
///
/// Never fails. Fields no source mentions keep their value from `current`.
pub async fn load_config<S: TextSource>(
    current: &DisplaySettings,
    local_path: &Path,
    remote_url: Option<&str>,
    source: &S,
    now: Instant,
) -> DisplaySettings {
    debug!("Loading configuration...");
    let mut next = current.clone();
    next.source = SettingsSource::Default;

    load_local(&mut next, local_path);
    load_remote(&mut next, remote_url, source).await;

    next.load_count = current.load_count + 1;
    next.last_load = Some(now);
    next.log_summary();
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoardError;
    use std::io::Write;

    struct FixedText(Result<Option<String>, ()>);

    impl TextSource for FixedText {
        async fn get_text(&self, _url: &str) -> Result<Option<String>, BoardError> {
            match &self.0 {
                Ok(body) => Ok(body.clone()),
                Err(()) => Err(BoardError::NetworkUnavailable("offline".into())),
            }
        }
    }

    fn local_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("  display_clock , true "), Some(("display_clock", "true")));
        assert_eq!(parse_line("setting,value"), None);
        assert_eq!(parse_line("# note"), None);
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("no_comma"), None);
        assert_eq!(parse_line("a,b,c"), Some(("a", "b,c")));
    }

    #[test]
    fn test_invalid_values_skip_individually() {
        let mut s = DisplaySettings::default();
        let applied = s.apply_text(
            "display_clock,maybe\nstocks_display_frequency,0\ntemperature_unit,K\nbogus_key,1\ndisplay_stocks,YES\n");
        assert_eq!(applied, 1);
        assert!(s.display_stocks);
        assert!(!s.display_clock);
        assert_eq!(s.stocks_display_frequency, 3);
        assert_eq!(s.temperature_unit, TemperatureUnit::Fahrenheit);
    }

    #[test]
    fn test_grace_minutes_bounded_to_a_day() {
        let mut s = DisplaySettings::default();
        assert!(!s.apply("stocks_grace_period_minutes", "2147483647"));
        assert!(!s.apply("stocks_grace_period_minutes", "1441"));
        assert!(!s.apply("stocks_grace_period_minutes", "-1"));
        assert_eq!(s.stocks_grace_period_minutes, 30);

        assert!(s.apply("stocks_grace_period_minutes", "1440"));
        assert_eq!(s.stocks_grace_period_minutes, MAX_GRACE_MINUTES);
    }

    #[tokio::test]
    async fn test_remote_overrides_local() {
        let local = local_file("setting,value\ndisplay_stocks,true\ntemperature_unit,c\n");
        let remote = FixedText(Ok(Some("temperature_unit,F\nstocks_display_frequency,5\n".into())));

        let s = load_config(&DisplaySettings::default(), local.path(), Some("http://cfg"), &remote, Instant::now()).await;
        assert!(s.display_stocks);
        assert_eq!(s.temperature_unit, TemperatureUnit::Fahrenheit);
        assert_eq!(s.stocks_display_frequency, 5);
        assert_eq!(s.source, SettingsSource::Remote);
        assert_eq!(s.load_count, 1);
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_local() {
        let local = local_file("display_clock,on\n");
        let s = load_config(&DisplaySettings::default(), local.path(), Some("http://cfg"),
            &FixedText(Err(())), Instant::now()).await;
        assert!(s.display_clock);
        assert_eq!(s.source, SettingsSource::Local);
    }

    #[tokio::test]
    async fn test_nothing_applied_is_default_source() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.csv");
        let mut current = DisplaySettings::default();
        current.display_clock = true;

        let s = load_config(&current, &missing, None, &FixedText(Ok(None)), Instant::now()).await;
        assert_eq!(s.source, SettingsSource::Default);
        assert!(s.display_clock);
    }
}
