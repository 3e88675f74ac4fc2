/*
 *  stocks/mod.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Watch list entries, item kinds and their on-panel formatting
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

pub mod api;
pub mod rotation;

use log::{debug, info, warn};
use std::path::Path;
use std::str::FromStr;

use crate::error::BoardError;
use crate::http::{TextSource, csv_lines};

pub use api::{Direction, PricePoint, Quote, StockProvider, TwelveData};
pub use rotation::{StockRotation, StockView};

/// What a watch-list row tracks, picks the row formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StockKind {
    #[default]
    Stock,
    Forex,
    Crypto,
    Commodity,
}

impl FromStr for StockKind {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "stock" => Ok(StockKind::Stock),
            "forex" => Ok(StockKind::Forex),
            "crypto" => Ok(StockKind::Crypto),
            "commodity" => Ok(StockKind::Commodity),
            other => Err(BoardError::Parse(format!("unknown item type {:?}", other))),
        }
    }
}

/// Leading glyph of a multi-stock row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowIndicator {
    Arrow(Direction),
    Dollar,
}

impl StockKind {
    pub fn indicator(&self, quote: &Quote) -> RowIndicator {
        match self {
            StockKind::Stock => RowIndicator::Arrow(quote.direction),
            _ => RowIndicator::Dollar,
        }
    }

    /// Right-hand value of a multi-stock row.
    pub fn row_value(&self, quote: &Quote) -> String {
        match self {
            StockKind::Stock => format!("{:+.1}%", quote.change_percent),
            _ => format_compact_price(quote.price),
        }
    }
}

/// `1.23M`, `45.6K`, `12.34`
pub fn format_compact_price(price: f64) -> String {
    if price >= 1_000_000.0 {
        format!("{:.2}M", price / 1_000_000.0)
    } else if price >= 1_000.0 {
        format!("{:.1}K", price / 1_000.0)
    } else {
        format!("{:.2}", price)
    }
}

/// Chart header price: `$1,234`, `$12.34`, `$0.1234`
pub fn format_chart_price(price: f64) -> String {
    if price >= 1000.0 {
        let digits = (price.trunc() as u64).to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        format!("${}", grouped)
    } else if price >= 1.0 {
        format!("${:.2}", price)
    } else {
        format!("${:.4}", price)
    }
}

/// Chart header change: `+1.25%` / `-0.40%`
pub fn format_chart_percent(change_percent: f64) -> String {
    format!("{:+.2}%", change_percent)
}

#[derive(Debug, Clone, PartialEq)]
pub struct StockEntry {
    pub symbol: String,
    pub name: String,
    pub display_name: String,
    pub kind: StockKind,
    /// Shown alone with an intraday chart
    pub highlight: bool,
}

impl StockEntry {
    /// `symbol,name[,type[,display_name[,highlight]]]`
    pub fn parse_row(line: &str) -> Result<StockEntry, BoardError> {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() < 2 || parts[0].is_empty() {
            return Err(BoardError::Parse(format!("expected symbol,name in {:?}", line)));
        }

        let symbol = parts[0].to_ascii_uppercase();
        let kind = match parts.get(2) {
            Some(t) => t.parse::<StockKind>().unwrap_or_else(|e| {
                warn!("{} for {} - treating as stock", e, symbol);
                StockKind::Stock
            }),
            None => StockKind::Stock,
        };
        let display_name = parts
            .get(3)
            .filter(|d| !d.is_empty())
            .map_or_else(|| symbol.clone(), |d| d.to_ascii_uppercase());
        let highlight = parts
            .get(4)
            .is_some_and(|h| *h == "1" || h.eq_ignore_ascii_case("true"));

        Ok(StockEntry {
            symbol,
            name: parts[1].to_string(),
            display_name,
            kind,
            highlight,
        })
    }
}

pub fn parse_stock_list(content: &str) -> Vec<StockEntry> {
    let list: Vec<StockEntry> = csv_lines(content)
        .filter_map(|line| match StockEntry::parse_row(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping stock row: {}", e);
                None
            }
        })
        .collect();
    debug!("Parsed {} stocks from CSV", list.len());
    list
}

/// Remote list first, then the local file, else nothing to rotate.
pub async fn load_stock_list<S: TextSource>(remote_url: Option<&str>, local_path: &Path, source: &S) -> Vec<StockEntry> {
    if let Some(url) = remote_url.filter(|u| !u.is_empty()) {
        match source.get_text(url).await {
            Ok(Some(body)) => {
                let list = parse_stock_list(&body);
                if !list.is_empty() {
                    info!("Loaded {} stocks from remote list", list.len());
                    return list;
                }
            }
            Ok(None) => warn!("Remote stocks fetch failed: HTTP 404"),
            Err(e) => warn!("Remote stocks fetch failed: {}", e),
        }
    }

    match std::fs::read_to_string(local_path) {
        Ok(content) => {
            let list = parse_stock_list(&content);
            if !list.is_empty() {
                info!("Loaded {} stocks from local {}", list.len(), local_path.display());
                return list;
            }
        }
        Err(e) => debug!("Local {} not loaded: {}", local_path.display(), e),
    }

    warn!("No stocks configured (no local or remote stocks.csv)");
    Vec::new()
}
