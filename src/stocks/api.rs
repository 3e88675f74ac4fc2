/*
 *  stocks/api.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Twelve Data batch quotes and intraday series
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
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::BoardError;

const TWELVE_DATA_BASE: &str = "https://api.twelvedata.com";
const INTRADAY_INTERVAL: &str = "15min";
/// 26 x 15min covers a full 6.5h session
const INTRADAY_POINTS: u32 = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price: f64,
    pub open_price: f64,
    pub change_percent: f64,
    pub direction: Direction,
}

impl Quote {
    pub fn new(price: f64, open_price: f64, change_percent: f64) -> Self {
        let direction = if change_percent >= 0.0 { Direction::Up } else { Direction::Down };
        Self { price, open_price, change_percent, direction }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub datetime: String,
    pub open: f64,
    pub close: f64,
}

/// Quote and series source for the stock rotation.
#[allow(async_fn_in_trait)]
pub trait StockProvider {
    /// Symbols missing from the map had no usable quote.
    async fn quotes(&self, symbols: &[String]) -> Result<HashMap<String, Quote>, BoardError>;

    /// Oldest point first.
    async fn intraday(&self, symbol: &str) -> Result<Vec<PricePoint>, BoardError>;
}

/// Twelve Data sends numbers as strings.
fn number(v: &Value, field: &str) -> Option<f64> {
    match v.get(field)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn is_error(v: &Value) -> bool {
    v.get("status").and_then(Value::as_str) == Some("error")
}

/// Accepts both the single-symbol object and the batch map keyed by symbol.
pub fn parse_quotes(data: &Value) -> Result<HashMap<String, Quote>, BoardError> {
    let entries: Vec<&Value> = match data {
        Value::Object(map) if map.contains_key("symbol") => vec![data],
        Value::Object(map) if is_error(data) => {
            let msg = map.get("message").and_then(Value::as_str).unwrap_or("unknown");
            return Err(BoardError::RemoteApi(msg.to_string()));
        }
        Value::Object(map) => map.values().collect(),
        _ => return Err(BoardError::RemoteApi("unexpected quote response format".into())),
    };

    let mut quotes = HashMap::new();
    for entry in entries {
        let symbol = entry.get("symbol").and_then(Value::as_str);
        if is_error(entry) {
            warn!("Quote error for {}: {}", symbol.unwrap_or("unknown"),
                entry.get("message").and_then(Value::as_str).unwrap_or("unknown"));
            continue;
        }
        let Some(symbol) = symbol else { continue };

        match (number(entry, "close"), number(entry, "open"), number(entry, "percent_change")) {
            (Some(price), Some(open), Some(pct)) => {
                quotes.insert(symbol.to_string(), Quote::new(price, open, pct));
            }
            _ => warn!("Error parsing quote for {}", symbol),
        }
    }
    Ok(quotes)
}

pub fn parse_time_series(data: &Value) -> Result<Vec<PricePoint>, BoardError> {
    if is_error(data) {
        let msg = data.get("message").and_then(Value::as_str).unwrap_or("unknown");
        return Err(BoardError::RemoteApi(msg.to_string()));
    }
    let values = data
        .get("values")
        .and_then(Value::as_array)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BoardError::RemoteApi("no time series data".into()))?;

    let mut series: Vec<PricePoint> = values
        .iter()
        .filter_map(|p| {
            Some(PricePoint {
                datetime: p.get("datetime").and_then(Value::as_str).unwrap_or_default().to_string(),
                open: number(p, "open")?,
                close: number(p, "close")?,
            })
        })
        .collect();
    // newest first on the wire
    series.reverse();
    Ok(series)
}

pub struct TwelveData {
    client: Client,
    api_key: Option<String>,
}

impl TwelveData {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self { client, api_key: api_key.filter(|k| !k.is_empty()) }
    }

    fn key(&self) -> Result<&str, BoardError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| BoardError::ConfigurationMissing("TWELVE_DATA_API_KEY".into()))
    }

    async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, BoardError> {
        let response = self.client
            .get(format!("{}/{}", TWELVE_DATA_BASE, endpoint))
            .query(params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BoardError::RemoteApi(format!("{} HTTP {}", endpoint, status.as_u16())));
        }
        Ok(response.json::<Value>().await?)
    }
}

impl StockProvider for TwelveData {
    async fn quotes(&self, symbols: &[String]) -> Result<HashMap<String, Quote>, BoardError> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }
        let key = self.key()?;
        let joined = symbols.join(",");
        debug!("Fetching quotes: {}", joined);

        let data = self.get("quote", &[("symbol", joined.as_str()), ("apikey", key)]).await?;
        let quotes = parse_quotes(&data)?;
        info!("Fetched {}/{} quotes", quotes.len(), symbols.len());
        Ok(quotes)
    }

    async fn intraday(&self, symbol: &str) -> Result<Vec<PricePoint>, BoardError> {
        let key = self.key()?;
        let points = INTRADAY_POINTS.to_string();
        debug!("Fetching intraday for {}...", symbol);

        let data = self.get("time_series", &[
            ("symbol", symbol),
            ("interval", INTRADAY_INTERVAL),
            ("outputsize", points.as_str()),
            ("apikey", key),
        ]).await?;
        let series = parse_time_series(&data)?;
        info!("Fetched {} data points for {}", series.len(), symbol);
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_and_batch_quotes() {
        let single = json!({"symbol": "AAPL", "close": "190.5", "open": "188.0", "percent_change": "-0.42"});
        let q = parse_quotes(&single).unwrap();
        assert_eq!(q["AAPL"].direction, Direction::Down);
        assert_eq!(q["AAPL"].price, 190.5);

        let batch = json!({
            "AAPL": {"symbol": "AAPL", "close": "190.5", "open": "188.0", "percent_change": "1.1"},
            "NOPE": {"symbol": "NOPE", "status": "error", "message": "symbol not found"},
            "MSFT": {"symbol": "MSFT", "close": "n/a", "open": "1", "percent_change": "0"}
        });
        let q = parse_quotes(&batch).unwrap();
        assert_eq!(q.len(), 1);
        assert_eq!(q["AAPL"].direction, Direction::Up);
    }

    #[test]
    fn test_top_level_error() {
        let err = json!({"status": "error", "code": 429, "message": "run out of API credits"});
        assert!(matches!(parse_quotes(&err), Err(BoardError::RemoteApi(_))));
        assert!(parse_time_series(&err).is_err());
    }

    #[test]
    fn test_series_oldest_first() {
        let data = json!({"values": [
            {"datetime": "2026-10-14 10:00:00", "open": "2", "close": "3"},
            {"datetime": "2026-10-14 09:45:00", "open": "1", "close": "2"}
        ]});
        let s = parse_time_series(&data).unwrap();
        assert_eq!(s[0].datetime, "2026-10-14 09:45:00");
        assert_eq!(s[1].close, 3.0);
    }

    #[tokio::test]
    async fn test_missing_key_is_configuration_error() {
        let api = TwelveData::new(Client::new(), None);
        let err = api.quotes(&["AAPL".to_string()]).await.unwrap_err();
        assert!(matches!(err, BoardError::ConfigurationMissing(_)));
    }
}
