/*
 *  display/mod.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display subsystem - panels, the surface seam and the 64x32 canvas
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

pub mod canvas;
pub mod color;
pub mod render;

use chrono::NaiveDateTime;

use crate::error::BoardResult;
use crate::events::Event;
use crate::schedule::Schedule;
use crate::settings::TemperatureUnit;
use crate::stocks::{PricePoint, Quote, StockEntry};
use crate::transit::RouteArrivals;
use crate::weather::{CurrentWeather, ForecastColumn};

pub use canvas::{Canvas, MATRIX_HEIGHT, MATRIX_WIDTH};
pub use color::NamedColor;
pub use render::FrameSurface;

/// Everything the rotation can put on the matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum Panel {
    Clock {
        now: NaiveDateTime,
    },
    /// Short status line such as `NO WIFI`
    Message {
        text: String,
        color: NamedColor,
    },
    Weather {
        weather: CurrentWeather,
        unit: TemperatureUnit,
    },
    Forecast {
        columns: Vec<ForecastColumn>,
    },
    StockRows {
        rows: Vec<(StockEntry, Quote)>,
    },
    StockChart {
        entry: StockEntry,
        quote: Quote,
        series: Vec<PricePoint>,
    },
    Schedule {
        schedule: Schedule,
        now: NaiveDateTime,
        /// Elapsed share of the window, `None` hides the bar
        progress: Option<f32>,
        weather: Option<CurrentWeather>,
    },
    Transit {
        rows: Vec<RouteArrivals>,
    },
    Event {
        event: Event,
    },
}

impl Panel {
    pub fn kind(&self) -> &'static str {
        match self {
            Panel::Clock { .. } => "clock",
            Panel::Message { .. } => "message",
            Panel::Weather { .. } => "weather",
            Panel::Forecast { .. } => "forecast",
            Panel::StockRows { .. } => "stocks",
            Panel::StockChart { .. } => "chart",
            Panel::Schedule { .. } => "schedule",
            Panel::Transit { .. } => "transit",
            Panel::Event { .. } => "event",
        }
    }

    /// The weekday square only goes on rotation panels.
    pub fn takes_weekday_indicator(&self) -> bool {
        !matches!(self, Panel::Message { .. } | Panel::Schedule { .. })
    }
}

/// Where finished panels go; the hold between panels belongs to the caller.
pub trait DisplaySurface {
    fn show(&mut self, panel: &Panel) -> BoardResult<()>;

    /// Weekday (0 is Monday) for the corner indicator, `None` hides it.
    fn set_weekday_indicator(&mut self, _weekday: Option<u32>) {}
}

impl<T: DisplaySurface + ?Sized> DisplaySurface for &mut T {
    fn show(&mut self, panel: &Panel) -> BoardResult<()> {
        (**self).show(panel)
    }

    fn set_weekday_indicator(&mut self, weekday: Option<u32>) {
        (**self).set_weekday_indicator(weekday)
    }
}
