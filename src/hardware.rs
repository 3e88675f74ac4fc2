/*
 *  hardware.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Clock, network link and stop button seams plus the cancellable hold
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

use chrono::{FixedOffset, Local, NaiveDateTime, Utc};
use local_ip_address::local_ip;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::error::{BoardError, BoardResult};

/// Stop input sampling period while a panel is held
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
const RECONNECT_SETTLE: Duration = Duration::from_secs(2);

pub trait Clock {
    /// Wall clock in board-local time
    fn local_now(&self) -> NaiveDateTime;
    fn monotonic(&self) -> Instant;
}

/// Local time from the host, or a fixed UTC offset when one is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    offset: Option<FixedOffset>,
}

impl SystemClock {
    pub fn new(tz_offset_hours: Option<i32>) -> Self {
        let offset = tz_offset_hours.and_then(|h| FixedOffset::east_opt(h * 3600));
        Self { offset }
    }

    /// Host offset in whole hours, used when nothing is configured.
    pub fn host_offset_hours() -> i32 {
        Local::now().offset().local_minus_utc() / 3600
    }
}

impl Clock for SystemClock {
    fn local_now(&self) -> NaiveDateTime {
        match self.offset {
            Some(offset) => Utc::now().with_timezone(&offset).naive_local(),
            None => Local::now().naive_local(),
        }
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}

#[allow(async_fn_in_trait)]
pub trait NetworkLink {
    fn is_connected(&mut self) -> bool;

    /// Bounded retry, true once the link is back.
    async fn reconnect(&mut self, attempts: u32) -> bool;
}

/// Link is up while the host holds a routable local address.
#[derive(Debug, Default)]
pub struct InterfaceLink {
    last_address: Option<String>,
}

impl InterfaceLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(&self) -> Option<&str> {
        self.last_address.as_deref()
    }
}

impl NetworkLink for InterfaceLink {
    fn is_connected(&mut self) -> bool {
        match local_ip() {
            Ok(ip) if !ip.is_loopback() && !ip.is_unspecified() => {
                let ip = ip.to_string();
                if self.last_address.as_deref() != Some(ip.as_str()) {
                    info!("Network up at {}", ip);
                    self.last_address = Some(ip);
                }
                true
            }
            Ok(ip) => {
                debug!("Only {} available", ip);
                false
            }
            Err(e) => {
                debug!("No local address: {}", e);
                false
            }
        }
    }

    async fn reconnect(&mut self, attempts: u32) -> bool {
        for attempt in 1..=attempts {
            info!("Reconnect attempt {}/{}", attempt, attempts);
            tokio::time::sleep(RECONNECT_SETTLE).await;
            if self.is_connected() {
                return true;
            }
        }
        warn!("Network still down after {} attempt(s)", attempts);
        false
    }
}

/// Polled, never blocks.
pub trait StopButton {
    fn is_pressed(&self) -> bool;
}

/// Pressed while the flag file exists, `touch /run/tablero.stop` stops the board.
#[derive(Debug, Clone)]
pub struct StopFile {
    path: PathBuf,
}

impl StopFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StopButton for StopFile {
    fn is_pressed(&self) -> bool {
        self.path.exists()
    }
}

/// Momentary switch to ground on a header pin, internal pull-up.
#[cfg(feature = "gpio-button")]
pub struct GpioButton {
    pin: rppal::gpio::InputPin,
}

#[cfg(feature = "gpio-button")]
impl GpioButton {
    pub fn new(bcm_pin: u8) -> BoardResult<Self> {
        let gpio = rppal::gpio::Gpio::new()
            .map_err(|e| BoardError::Io(std::io::Error::other(e.to_string())))?;
        let pin = gpio
            .get(bcm_pin)
            .map_err(|e| BoardError::Io(std::io::Error::other(e.to_string())))?
            .into_input_pullup();
        info!("Stop button on BCM {}", bcm_pin);
        Ok(Self { pin })
    }
}

#[cfg(feature = "gpio-button")]
impl StopButton for GpioButton {
    fn is_pressed(&self) -> bool {
        self.pin.is_low()
    }
}

/// Sleep for `duration`, sampling `stop` every `poll`.
pub async fn hold<B: StopButton + ?Sized>(duration: Duration, stop: &B, poll: Duration) -> BoardResult<()> {
    let deadline = tokio::time::Instant::now() + duration;
    loop {
        if stop.is_pressed() {
            info!("Stop button pressed");
            return Err(BoardError::Cancelled);
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Ok(());
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}
