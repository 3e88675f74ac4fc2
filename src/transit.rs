/*
 *  transit.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  CTA train and bus arrivals, route list and commute gating
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

use chrono::{NaiveTime, Timelike};
use log::{debug, info, warn};
use mini_moka::sync::Cache;
use reqwest::Client;
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::display::color::NamedColor;
use crate::error::BoardError;
use crate::freshness::FetchStats;
use crate::http::{TextSource, csv_lines};
use crate::windows::is_within_commute_hours;

const CTA_TRAIN_URL: &str = "http://lapi.transitchicago.com/api/1.0/ttarrivals.aspx";
const CTA_BUS_URL: &str = "http://www.ctabustracker.com/bustime/api/v2/getpredictions";

pub const TRANSIT_TTL: Duration = Duration::from_secs(60);
/// Rows on the transit panel
pub const MAX_ROUTES: usize = 3;
pub const MAX_ARRIVALS: usize = 3;

/// Lines whose trains only count when heading to the Loop.
const LOOP_ONLY_LINES: [&str; 2] = ["Brn", "P"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitKind {
    Train,
    Bus,
}

impl FromStr for TransitKind {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(TransitKind::Train),
            "bus" => Ok(TransitKind::Bus),
            other => Err(BoardError::Parse(format!("transit type {:?} must be train or bus", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitRoute {
    pub kind: TransitKind,
    pub route: String,
    pub label: String,
    /// Map ids for trains, stop ids for buses
    pub stops: Vec<String>,
    /// Arrivals sooner than this are dropped, nobody can make them
    pub min_time: u32,
    pub color: NamedColor,
    pub icon: String,
    /// `[start, end)` hours, empty means all day
    pub commute_hours: Vec<(u32, u32)>,
}

fn parse_commute_hours(field: &str, label: &str) -> Vec<(u32, u32)> {
    let mut hours = Vec::new();
    for range in field.split('|').map(str::trim).filter(|r| !r.is_empty()) {
        let Some((start, end)) = range.split_once('-') else {
            warn!("Ignoring hour range {:?} for {}", range, label);
            continue;
        };
        match (start.trim().parse::<u32>(), end.trim().parse::<u32>()) {
            (Ok(s), Ok(e)) if s <= 23 && e <= 23 && s < e => hours.push((s, e)),
            (Ok(_), Ok(_)) => warn!("Invalid hour range {:?} for {} (0-23, start < end)", range, label),
            _ => warn!("Invalid hour range {:?} for {}", range, label),
        }
    }
    hours
}

impl TransitRoute {
    /// `type,route,label,stop|stop,min_time,color,icon,6-9|16-19`
    pub fn parse_row(line: &str) -> Result<TransitRoute, BoardError> {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() != 8 {
            return Err(BoardError::Parse(format!("expected 8 fields, got {} in {:?}", parts.len(), line)));
        }

        let kind = parts[0].parse::<TransitKind>()?;
        let label = parts[2].to_string();
        let stops: Vec<String> = parts[3]
            .split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if stops.is_empty() {
            return Err(BoardError::Parse(format!("no stops for {}", label)));
        }
        let min_time = parts[4]
            .parse::<u32>()
            .map_err(|_| BoardError::Parse(format!("min_time {:?} for {} must be >= 0", parts[4], label)))?;

        Ok(TransitRoute {
            kind,
            route: parts[1].to_string(),
            color: NamedColor::parse_or_white(parts[5], &label),
            icon: parts[6].to_string(),
            commute_hours: parse_commute_hours(parts[7], &label),
            label,
            stops,
            min_time,
        })
    }

    pub fn in_service(&self, hour: u32) -> bool {
        is_within_commute_hours(&self.commute_hours, hour)
    }
}

pub fn parse_routes(content: &str) -> Vec<TransitRoute> {
    csv_lines(content)
        .filter_map(|line| match TransitRoute::parse_row(line) {
            Ok(route) => {
                debug!("Loaded transit route: {} ({:?} {})", route.label, route.kind, route.route);
                Some(route)
            }
            Err(e) => {
                warn!("Skipping transit row: {}", e);
                None
            }
        })
        .collect()
}

/// The local file wins when present, the remote list is the fallback.
pub async fn load_routes<S: TextSource>(local_path: &Path, remote_url: Option<&str>, source: &S) -> Vec<TransitRoute> {
    let content = match std::fs::read_to_string(local_path) {
        Ok(content) => {
            debug!("Loaded {} from local disk", local_path.display());
            Some(content)
        }
        Err(_) => match remote_url.filter(|u| !u.is_empty()) {
            Some(url) => match source.get_text(url).await {
                Ok(Some(body)) => Some(body),
                Ok(None) => {
                    warn!("Remote transits.csv fetch failed: HTTP 404");
                    None
                }
                Err(e) => {
                    warn!("Remote transits.csv fetch error: {}", e);
                    None
                }
            },
            None => None,
        },
    };

    let Some(content) = content else {
        warn!("No transits.csv found (local or remote)");
        return Vec::new();
    };
    let routes = parse_routes(&content);
    info!("Loaded {} transit route(s)", routes.len());
    routes
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival {
    pub destination: String,
    pub minutes: u32,
}

/// Arrivals source for one configured route.
#[allow(async_fn_in_trait)]
pub trait TransitProvider {
    async fn arrivals(&self, route: &TransitRoute) -> Result<Vec<Arrival>, BoardError>;
}

fn text<'a>(v: &'a Value, field: &str) -> Option<&'a str> {
    v.get(field).and_then(Value::as_str)
}

fn time_of_day(stamp: &str) -> Option<u32> {
    let (_, time) = stamp.split_once('T')?;
    let t = NaiveTime::parse_from_str(time, "%H:%M:%S").ok()?;
    Some(t.hour() * 60 + t.minute())
}

/// Train Tracker `ctatt` payload, minutes counted against the server timestamp.
pub fn parse_train_arrivals(data: &Value, route: &TransitRoute) -> Result<Vec<Arrival>, BoardError> {
    let ctatt = data
        .get("ctatt")
        .ok_or_else(|| BoardError::RemoteApi("CTA train: unexpected response format".into()))?;

    let err_code = match ctatt.get("errCd") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "0".to_string(),
    };
    if err_code != "0" {
        return Err(BoardError::RemoteApi(format!(
            "CTA train [{}] {} (route {})",
            err_code,
            text(ctatt, "errNm").unwrap_or("unknown error"),
            route.route
        )));
    }

    let now = text(ctatt, "tmst").and_then(time_of_day);
    let loop_only = LOOP_ONLY_LINES.contains(&route.route.as_str());
    let mut arrivals = Vec::new();

    for eta in ctatt.get("eta").and_then(Value::as_array).into_iter().flatten() {
        let destination = text(eta, "destNm").unwrap_or("Unknown");
        if loop_only && text(eta, "rt") == Some(route.route.as_str()) && !destination.contains("Loop") {
            continue;
        }

        let minutes = if text(eta, "isApp") == Some("1") {
            0
        } else {
            match (text(eta, "arrT").and_then(time_of_day), now) {
                (Some(arr), Some(cur)) if arr >= cur => arr - cur,
                (Some(arr), Some(cur)) => arr + 24 * 60 - cur,
                _ => {
                    warn!("Bad arrival time {:?} for {}", text(eta, "arrT"), route.label);
                    continue;
                }
            }
        };

        if minutes < route.min_time {
            debug!("Filtered {} to {} ({} min < {} min)", route.route, destination, minutes, route.min_time);
            continue;
        }
        arrivals.push(Arrival { destination: destination.to_string(), minutes });
    }
    Ok(arrivals)
}

/// Bus Tracker `bustime-response` payload, `DUE` counts as zero.
pub fn parse_bus_arrivals(data: &Value, route: &TransitRoute) -> Result<Vec<Arrival>, BoardError> {
    let response = data
        .get("bustime-response")
        .ok_or_else(|| BoardError::RemoteApi("CTA bus: unexpected response format".into()))?;

    if let Some(errors) = response.get("error") {
        let msg = errors
            .as_array()
            .and_then(|e| e.first())
            .and_then(|e| text(e, "msg"))
            .unwrap_or("unknown");
        return Err(BoardError::RemoteApi(format!("CTA bus: {} (route {})", msg, route.route)));
    }

    let mut arrivals = Vec::new();
    for prd in response.get("prd").and_then(Value::as_array).into_iter().flatten() {
        let destination = text(prd, "des").unwrap_or("Unknown");
        let minutes = match text(prd, "prdctdn").unwrap_or("0") {
            "DUE" => 0,
            n => match n.parse::<u32>() {
                Ok(m) => m,
                Err(_) => {
                    warn!("Invalid prdctdn {:?} for {}", n, route.label);
                    continue;
                }
            },
        };
        if minutes < route.min_time {
            debug!("Filtered bus {} to {} ({} min < {} min)", route.route, destination, minutes, route.min_time);
            continue;
        }
        arrivals.push(Arrival { destination: destination.to_string(), minutes });
    }
    Ok(arrivals)
}

pub struct Cta {
    client: Client,
    train_key: Option<String>,
    bus_key: Option<String>,
}

impl Cta {
    pub fn new(client: Client, train_key: Option<String>, bus_key: Option<String>) -> Self {
        Self {
            client,
            train_key: train_key.filter(|k| !k.is_empty()),
            bus_key: bus_key.filter(|k| !k.is_empty()),
        }
    }

    async fn get(&self, url: &str, params: &[(&str, &str)]) -> Result<Value, BoardError> {
        let response = self.client.get(url).query(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BoardError::RemoteApi(format!("CTA HTTP {}", status.as_u16())));
        }
        Ok(response.json::<Value>().await?)
    }
}

impl TransitProvider for Cta {
    async fn arrivals(&self, route: &TransitRoute) -> Result<Vec<Arrival>, BoardError> {
        match route.kind {
            TransitKind::Train => {
                let key = self
                    .train_key
                    .as_deref()
                    .ok_or_else(|| BoardError::ConfigurationMissing("CTA_API_KEY".into()))?;
                let mapids = route.stops.join(",");
                debug!("Fetching train arrivals for {} line (stops: {})", route.route, mapids);
                let data = self
                    .get(CTA_TRAIN_URL, &[("key", key), ("mapid", mapids.as_str()), ("outputType", "JSON")])
                    .await?;
                parse_train_arrivals(&data, route)
            }
            TransitKind::Bus => {
                let key = self
                    .bus_key
                    .as_deref()
                    .ok_or_else(|| BoardError::ConfigurationMissing("CTA_BUS_API_KEY".into()))?;
                let mut params = vec![("key", key), ("rt", route.route.as_str()), ("format", "json")];
                params.extend(route.stops.iter().map(|s| ("stpid", s.as_str())));
                debug!("Fetching bus arrivals for route {} (stops: {:?})", route.route, route.stops);
                let data = self.get(CTA_BUS_URL, &params).await?;
                parse_bus_arrivals(&data, route)
            }
        }
    }
}

/// One row of the transit panel.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteArrivals {
    pub label: String,
    pub kind: TransitKind,
    pub color: NamedColor,
    pub icon: String,
    pub arrivals: Vec<Arrival>,
}

impl RouteArrivals {
    /// `5,12,18`
    pub fn minutes_text(&self) -> String {
        self.arrivals
            .iter()
            .map(|a| a.minutes.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Configured routes plus a short-lived arrivals cache keyed by label.
pub struct TransitBoard {
    routes: Vec<TransitRoute>,
    cache: Cache<String, Vec<Arrival>>,
    stats: FetchStats,
}

impl TransitBoard {
    pub fn new(routes: Vec<TransitRoute>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(32)
            .time_to_live(ttl)
            .build();
        Self { routes, cache, stats: FetchStats::default() }
    }

    pub fn routes(&self) -> &[TransitRoute] {
        &self.routes
    }

    pub fn stats(&self) -> FetchStats {
        self.stats
    }

    /// In-service routes with arrivals, at most [`MAX_ROUTES`] rows.
    pub async fn board<P: TransitProvider>(&mut self, provider: &P, hour: u32, respect_commute: bool) -> Vec<RouteArrivals> {
        let mut rows = Vec::new();

        for route in &self.routes {
            if rows.len() == MAX_ROUTES {
                break;
            }
            if respect_commute && !route.in_service(hour) {
                debug!("Route {} outside commute hours ({}h)", route.label, hour);
                continue;
            }

            let arrivals = match self.cache.get(&route.label) {
                Some(cached) => cached,
                None => {
                    self.stats.attempts += 1;
                    match provider.arrivals(route).await {
                        Ok(fresh) => {
                            self.cache.insert(route.label.clone(), fresh.clone());
                            fresh
                        }
                        Err(e) => {
                            self.stats.errors += 1;
                            warn!("Transit {} fetch failed: {}", route.label, e);
                            continue;
                        }
                    }
                }
            };

            if arrivals.is_empty() {
                debug!("No arrivals for {}", route.label);
                continue;
            }
            rows.push(RouteArrivals {
                label: route.label.clone(),
                kind: route.kind,
                color: route.color,
                icon: route.icon.clone(),
                arrivals: arrivals.into_iter().take(MAX_ARRIVALS).collect(),
            });
        }

        info!("Transit data for {} route(s)", rows.len());
        rows
    }
}
