/*
 *  main.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Wire config, feeds and hardware together and run the rotation
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

use anyhow::Context;
use env_logger::Env;
use log::{info, warn};

use tokio::signal::unix::{SignalKind, signal};

use tablero::config::{self, Config};
use tablero::display::FrameSurface;
use tablero::hardware::{InterfaceLink, StopButton, StopFile, SystemClock};
use tablero::http::{HttpTextSource, build_client};
use tablero::images::{IMAGE_CACHE_CAPACITY, ImageCache, SvgImageStore};
use tablero::stocks::TwelveData;
use tablero::transit::Cta;
use tablero::weather::AccuWeather;
use tablero::{App, Devices, Feeds};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Whichever stop input this build and config can offer.
enum StopInput {
    File(StopFile),
    #[cfg(feature = "gpio-button")]
    Gpio(tablero::hardware::GpioButton),
}

impl StopButton for StopInput {
    fn is_pressed(&self) -> bool {
        match self {
            StopInput::File(f) => f.is_pressed(),
            #[cfg(feature = "gpio-button")]
            StopInput::Gpio(g) => g.is_pressed(),
        }
    }
}

fn stop_input(cfg: &Config) -> StopInput {
    let path = cfg.paths().stop_file;
    #[cfg(feature = "gpio-button")]
    if let Some(pin) = cfg.stop_button_pin {
        match tablero::hardware::GpioButton::new(pin) {
            Ok(button) => return StopInput::Gpio(button),
            Err(e) => warn!("GPIO stop button unavailable ({}), watching {}", e, path.display()),
        }
    }
    #[cfg(not(feature = "gpio-button"))]
    if cfg.stop_button_pin.is_some() {
        warn!("stop_button_pin set but built without gpio-button, watching {}", path.display());
    }
    StopInput::File(StopFile::new(path))
}

/// Waits for SIGINT, SIGTERM or SIGHUP.
async fn signal_handler() -> Result<(), std::io::Error> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load().context("loading configuration")?;

    let level = cfg.log_level.clone().unwrap_or_else(|| "info".into());
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    info!("{} - the board is up", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let api = cfg.api();
    let paths = cfg.paths();
    let client = build_client().context("building HTTP client")?;

    let feeds = Feeds {
        text: HttpTextSource::new(client.clone()),
        weather: AccuWeather::new(client.clone(), api.accuweather_key, api.accuweather_location),
        stocks: TwelveData::new(client.clone(), api.twelve_data_key),
        transit: Cta::new(client, api.cta_train_key, api.cta_bus_key),
    };

    let images = ImageCache::new(SvgImageStore::new(&paths.images), IMAGE_CACHE_CAPACITY);
    let devices = Devices {
        display: FrameSurface::new(images, paths.frame_dump.clone()),
        clock: SystemClock::new(cfg.timezone_offset),
        link: InterfaceLink::new(),
        stop: stop_input(&cfg),
    };

    let host_offset = SystemClock::host_offset_hours();
    if cfg.timezone_offset.is_none() {
        info!("No timezone_offset configured, using host offset {}h", host_offset);
    }
    let mut app = App::new(&cfg, feeds, devices).with_tz_offset(Some(host_offset));

    let signalled = tokio::select! {
        r = app.run() => {
            r?;
            false
        }
        r = signal_handler() => {
            if let Err(e) = r {
                warn!("Signal handler failed: {}", e);
            }
            true
        }
    };
    if signalled {
        app.shutdown();
    }

    info!("Exiting...");
    Ok(())
}
