/*
 *  http.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Shared reqwest client and the plain-text source used for remote CSVs
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

use log::debug;
use reqwest::{Client, StatusCode, header};
use std::time::Duration;

use crate::error::BoardError;

/// Per-request timeout, a hung socket becomes an I/O error instead of a stall.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Line-oriented remote text (settings, schedules, stock lists, events).
#[allow(async_fn_in_trait)]
pub trait TextSource {
    /// `Ok(None)` means the server answered 404, any other non-2xx is an error.
    async fn get_text(&self, url: &str) -> Result<Option<String>, BoardError>;
}

/// Build the client every fetcher shares.
pub fn build_client() -> Result<Client, BoardError> {
    const VERSION: &'static str = concat!("Tablero v", env!("CARGO_PKG_VERSION"));

    let mut headers = header::HeaderMap::new();
    headers.insert("User-Agent", header::HeaderValue::from_static(VERSION));
    headers.insert("Accept", header::HeaderValue::from_static("application/json, text/plain, */*"));
    headers.insert("Connection", header::HeaderValue::from_static("close"));

    let client = Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .default_headers(headers)
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    Ok(client)
}

/// GET returning the body or a RemoteApi error for non-2xx.
pub async fn get_json(client: &Client, url: &str) -> Result<serde_json::Value, BoardError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(BoardError::RemoteApi(format!("HTTP {}", status.as_u16())));
    }
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

/// [`TextSource`] over reqwest.
#[derive(Debug, Clone)]
pub struct HttpTextSource {
    client: Client,
}

impl HttpTextSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl TextSource for HttpTextSource {
    async fn get_text(&self, url: &str) -> Result<Option<String>, BoardError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(response.text().await?)),
            s => Err(BoardError::RemoteApi(format!("HTTP {} from {}", s.as_u16(), url))),
        }
    }
}

/// Iterate the meaningful lines of a CSV payload: trimmed, no blanks, no `#` comments.
pub fn csv_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}
