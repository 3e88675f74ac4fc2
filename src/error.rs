/*
 *  error.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Error taxonomy shared by fetchers, loaders and the rotation loop
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

use thiserror::Error;

/// Everything that can go wrong while the board is running.
///
/// Only [`BoardError::Cancelled`] is allowed to end the rotation loop, the
/// rest degrade to cached data or a fallback panel at the nearest call site.
#[derive(Debug, Error)]
pub enum BoardError {
    /// Credentials, keys or URLs needed for a fetch are not configured
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Non-2xx response or a payload that did not carry what we expected
    #[error("remote API error: {0}")]
    RemoteApi(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("no cached value for {0}")]
    CacheMiss(String),

    #[error("display resource missing: {0}")]
    DisplayResourceMissing(String),

    #[error("unknown color name: {0}")]
    UnknownColor(String),

    /// Stop button pressed (or shutdown signal) while holding a panel
    #[error("cancelled by stop input")]
    Cancelled,

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BoardError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BoardError::Cancelled)
    }
}

pub type BoardResult<T> = Result<T, BoardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_cancel_is_cancelled() {
        assert!(BoardError::Cancelled.is_cancelled());
        assert!(!BoardError::RemoteApi("HTTP 500".into()).is_cancelled());
        assert!(!BoardError::CacheMiss("weather".into()).is_cancelled());
    }

    #[test]
    fn test_messages_carry_context() {
        let e = BoardError::ConfigurationMissing("TWELVE_DATA_API_KEY".into());
        assert_eq!(e.to_string(), "configuration missing: TWELVE_DATA_API_KEY");
    }
}
