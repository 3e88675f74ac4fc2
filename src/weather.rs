/*
 *  weather.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  AccuWeather current conditions, 12 hour forecast and forecast column picks
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

use log::{debug, info};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::BoardError;
use crate::settings::TemperatureUnit;

pub const WEATHER_TTL: Duration = Duration::from_secs(300);
pub const FORECAST_TTL: Duration = Duration::from_secs(900);

const ACCUWEATHER_BASE: &str = "http://dataservice.accuweather.com";
/// Hours scanned for precipitation transitions
const PRECIP_LOOKAHEAD: usize = 6;
/// Last hour of the 12 hour forecast
const LAST_FORECAST_HOUR: usize = 11;

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentWeather {
    pub temp: i32,
    pub feels_like: i32,
    pub feels_shade: i32,
    pub uv: u32,
    pub humidity: u32,
    pub icon: u32,
    pub condition: String,
    pub has_precipitation: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastHour {
    pub datetime: String,
    pub temp: i32,
    pub feels_like: i32,
    pub icon: u32,
    pub has_precipitation: bool,
    pub precipitation_probability: u32,
}

impl ForecastHour {
    /// Hour of day from an ISO timestamp, `2026-10-14T15:00:00-05:00` is 15.
    pub fn hour(&self) -> u32 {
        self.datetime
            .get(11..13)
            .and_then(|h| h.parse::<u32>().ok())
            .map_or(0, |h| h % 24)
    }
}

#[allow(async_fn_in_trait)]
pub trait WeatherProvider {
    async fn current(&self, unit: TemperatureUnit) -> Result<CurrentWeather, BoardError>;
    async fn forecast(&self, unit: TemperatureUnit) -> Result<Vec<ForecastHour>, BoardError>;
}

fn unit_key(unit: TemperatureUnit) -> &'static str {
    if unit.is_metric() { "Metric" } else { "Imperial" }
}

fn int_field(v: &Value, field: &str) -> Option<i64> {
    v.get(field).and_then(|x| x.as_i64().or_else(|| x.as_f64().map(|f| f as i64)))
}

/// AccuWeather wraps the single observation in a list.
pub fn parse_current(data: &Value, unit: TemperatureUnit) -> Result<CurrentWeather, BoardError> {
    let w = data
        .as_array()
        .and_then(|a| a.first())
        .ok_or_else(|| BoardError::RemoteApi("API returned empty data".into()))?;

    let reading = |field: &str| {
        w.get(field)
            .and_then(|t| t.get(unit_key(unit)))
            .and_then(|t| t.get("Value"))
            .and_then(Value::as_f64)
    };
    let temp = reading("Temperature")
        .ok_or_else(|| BoardError::Parse("missing temperature data".into()))?;
    let feels_like = reading("RealFeelTemperature").unwrap_or(temp);
    let feels_shade = reading("RealFeelTemperatureShade").unwrap_or(feels_like);

    Ok(CurrentWeather {
        temp: temp as i32,
        feels_like: feels_like as i32,
        feels_shade: feels_shade as i32,
        uv: int_field(w, "UVIndex").unwrap_or(0).max(0) as u32,
        humidity: int_field(w, "RelativeHumidity").unwrap_or(0).clamp(0, 100) as u32,
        icon: int_field(w, "WeatherIcon").unwrap_or(1).max(1) as u32,
        condition: w.get("WeatherText").and_then(Value::as_str).unwrap_or("Unknown").to_string(),
        has_precipitation: w.get("HasPrecipitation").and_then(Value::as_bool).unwrap_or(false),
    })
}

/// Hourly entries come in the requested unit already.
pub fn parse_forecast(data: &Value) -> Result<Vec<ForecastHour>, BoardError> {
    let hours = data
        .as_array()
        .ok_or_else(|| BoardError::RemoteApi("forecast is not a list".into()))?;

    let value = |h: &Value, field: &str| h.get(field).and_then(|t| t.get("Value")).and_then(Value::as_f64);
    let parsed: Vec<ForecastHour> = hours
        .iter()
        .filter_map(|h| {
            let temp = value(h, "Temperature")?;
            Some(ForecastHour {
                datetime: h.get("DateTime").and_then(Value::as_str)?.to_string(),
                temp: temp as i32,
                feels_like: value(h, "RealFeelTemperature").unwrap_or(temp) as i32,
                icon: int_field(h, "WeatherIcon").unwrap_or(1).max(1) as u32,
                has_precipitation: h.get("HasPrecipitation").and_then(Value::as_bool).unwrap_or(false),
                precipitation_probability: int_field(h, "PrecipitationProbability").unwrap_or(0).clamp(0, 100) as u32,
            })
        })
        .collect();
    if parsed.is_empty() {
        return Err(BoardError::RemoteApi("forecast has no usable hours".into()));
    }
    Ok(parsed)
}

pub struct AccuWeather {
    client: Client,
    api_key: Option<String>,
    location: Option<String>,
}

impl AccuWeather {
    pub fn new(client: Client, api_key: Option<String>, location: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
            location: location.filter(|l| !l.is_empty()),
        }
    }

    fn credentials(&self) -> Result<(&str, &str), BoardError> {
        let key = self.api_key.as_deref()
            .ok_or_else(|| BoardError::ConfigurationMissing("AccuWeather API key".into()))?;
        let location = self.location.as_deref()
            .ok_or_else(|| BoardError::ConfigurationMissing("AccuWeather location key".into()))?;
        Ok((key, location))
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, BoardError> {
        let response = self.client
            .get(format!("{}{}", ACCUWEATHER_BASE, path))
            .query(params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BoardError::RemoteApi(format!("AccuWeather HTTP {}", status.as_u16())));
        }
        Ok(response.json::<Value>().await?)
    }
}

impl WeatherProvider for AccuWeather {
    async fn current(&self, unit: TemperatureUnit) -> Result<CurrentWeather, BoardError> {
        let (key, location) = self.credentials()?;
        info!("Fetching weather from AccuWeather...");
        let data = self.get(&format!("/currentconditions/v1/{}", location),
            &[("apikey", key), ("details", "true")]).await?;
        let weather = parse_current(&data, unit)?;
        info!("Weather: {}°{}, {}, UV:{}", weather.temp, unit.as_str(), weather.condition, weather.uv);
        Ok(weather)
    }

    async fn forecast(&self, unit: TemperatureUnit) -> Result<Vec<ForecastHour>, BoardError> {
        let (key, location) = self.credentials()?;
        let metric = if unit.is_metric() { "true" } else { "false" };
        debug!("Fetching 12 hour forecast...");
        let data = self.get(&format!("/forecasts/v1/hourly/12hour/{}", location),
            &[("apikey", key), ("details", "true"), ("metric", metric)]).await?;
        let hours = parse_forecast(&data)?;
        info!("Forecast: {} hours", hours.len());
        Ok(hours)
    }
}

/// Indices of the two forecast columns shown next to "now".
///
/// Rain now: the first dry hour and the one after, or hours 1 and 11 when it
/// never stops. Dry now: when rain starts and stops, or start and hour 11.
/// Otherwise the next two hours, skipping an entry for the current hour.
pub fn select_forecast_columns(current: &CurrentWeather, hours: &[ForecastHour], current_hour: u32) -> (usize, usize) {
    let last = hours.len().saturating_sub(1);
    let flags: Vec<bool> = hours.iter().take(PRECIP_LOOKAHEAD).map(|h| h.has_precipitation).collect();

    let (mut first, mut second) = (0, 1);
    if current.has_precipitation {
        match flags.iter().position(|wet| !wet) {
            Some(stop) => {
                first = stop;
                second = (stop + 1).min(last);
                debug!("Smart: rain stops at hour {}", stop + 1);
            }
            None => {
                first = 1;
                second = LAST_FORECAST_HOUR;
                debug!("Smart: rain continues, showing hour 1 and 11");
            }
        }
    } else if let Some(start) = flags.iter().position(|wet| *wet) {
        first = start;
        second = match flags[start..].iter().position(|wet| !wet) {
            Some(dry) => start + dry,
            None => LAST_FORECAST_HOUR,
        };
        debug!("Smart: rain from hour {} to {}", first + 1, second + 1);
    }

    let (first, second) = (first.min(last), second.min(last));
    if first == 0 && hours.len() >= 3 && hours[0].hour() == current_hour {
        debug!("Smart: skipped duplicate hour {}", current_hour);
        return (1, 2);
    }
    (first, second)
}

/// `3P`, `12A`
pub fn hour_label(hour: u32) -> String {
    let h12 = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{}{}", h12, if hour < 12 { "A" } else { "P" })
}

/// One forecast column; `jumped` marks a gap of more than an hour before it.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastColumn {
    pub label: String,
    pub feels_like: i32,
    pub icon: u32,
    pub jumped: bool,
}

/// The live "now" column followed by the two selected hours.
pub fn forecast_columns(current: &CurrentWeather, hours: &[ForecastHour], current_hour: u32, now_label: String) -> Vec<ForecastColumn> {
    let (a, b) = select_forecast_columns(current, hours, current_hour);
    let (ha, hb) = (&hours[a], &hours[b]);

    let a_jumped = (ha.hour() + 24 - current_hour) % 24 > 1;
    let b_jumped = a_jumped || (hb.hour() + 24 - ha.hour()) % 24 > 1;
    vec![
        ForecastColumn { label: now_label, feels_like: current.feels_like, icon: current.icon, jumped: false },
        ForecastColumn { label: hour_label(ha.hour()), feels_like: ha.feels_like, icon: ha.icon, jumped: a_jumped },
        ForecastColumn { label: hour_label(hb.hour()), feels_like: hb.feels_like, icon: hb.icon, jumped: b_jumped },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now(wet: bool) -> CurrentWeather {
        CurrentWeather {
            temp: 70, feels_like: 68, feels_shade: 66, uv: 3, humidity: 40, icon: 1,
            condition: "Sunny".into(), has_precipitation: wet,
        }
    }

    fn hours(start_hour: u32, wet: &[bool]) -> Vec<ForecastHour> {
        (0..12)
            .map(|i| ForecastHour {
                datetime: format!("2026-10-14T{:02}:00:00-05:00", (start_hour + i as u32) % 24),
                temp: 60 + i as i32,
                feels_like: 58 + i as i32,
                icon: 1,
                has_precipitation: wet.get(i).copied().unwrap_or(false),
                precipitation_probability: 0,
            })
            .collect()
    }

    #[test]
    fn test_parse_current_fallbacks() {
        let data = json!([{
            "WeatherText": "Cloudy", "WeatherIcon": 7, "HasPrecipitation": false,
            "Temperature": {"Metric": {"Value": 21.6}, "Imperial": {"Value": 71.0}},
            "UVIndex": 4, "RelativeHumidity": 55
        }]);
        let w = parse_current(&data, TemperatureUnit::Celsius).unwrap();
        assert_eq!((w.temp, w.feels_like, w.feels_shade), (21, 21, 21));
        assert_eq!((w.icon, w.uv, w.humidity), (7, 4, 55));

        assert!(parse_current(&json!([]), TemperatureUnit::Fahrenheit).is_err());
        assert!(matches!(parse_current(&json!([{"WeatherText": "x"}]), TemperatureUnit::Fahrenheit),
            Err(BoardError::Parse(_))));
    }

    #[test]
    fn test_parse_forecast() {
        let data = json!([
            {"DateTime": "2026-10-14T15:00:00-05:00", "WeatherIcon": 12, "HasPrecipitation": true,
             "PrecipitationProbability": 80, "Temperature": {"Value": 61.0}, "RealFeelTemperature": {"Value": 57.0}},
            {"DateTime": "bad"}
        ]);
        let f = parse_forecast(&data).unwrap();
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].hour(), 15);
        assert_eq!(f[0].feels_like, 57);
    }

    #[test]
    fn test_columns_default_and_duplicate_hour() {
        assert_eq!(select_forecast_columns(&now(false), &hours(15, &[]), 14), (0, 1));
        assert_eq!(select_forecast_columns(&now(false), &hours(14, &[]), 14), (1, 2));
    }

    #[test]
    fn test_columns_rain_transitions() {
        let stops = hours(15, &[true, true, false]);
        assert_eq!(select_forecast_columns(&now(true), &stops, 14), (2, 3));

        let never = hours(15, &[true; 6]);
        assert_eq!(select_forecast_columns(&now(true), &never, 14), (1, 11));

        let shower = hours(15, &[false, true, true, false]);
        assert_eq!(select_forecast_columns(&now(false), &shower, 14), (1, 3));

        let starts = hours(15, &[false, false, true, true, true, true]);
        assert_eq!(select_forecast_columns(&now(false), &starts, 14), (2, 11));
    }

    #[test]
    fn test_columns_clamped_to_short_forecast() {
        let short: Vec<ForecastHour> = hours(15, &[true; 6]).into_iter().take(4).collect();
        assert_eq!(select_forecast_columns(&now(true), &short, 14), (1, 3));
    }

    #[test]
    fn test_column_labels_and_jumps() {
        let cols = forecast_columns(&now(false), &hours(15, &[false, false, true, false]), 14, "2:05".into());
        assert_eq!(cols[1].label, "5P");
        assert!(cols[1].jumped);
        assert!(cols[2].jumped);
        assert_eq!(hour_label(0), "12A");
        assert_eq!(hour_label(12), "12P");
    }
}
