/*
 *  display/render.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Panel layouts drawn onto the canvas
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

use chrono::NaiveDateTime;
use embedded_graphics::{
    mono_font::{
        MonoFont, MonoTextStyle,
        iso_8859_1::{FONT_4X6, FONT_5X8, FONT_6X10, FONT_9X15},
    },
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{Line, PrimitiveStyle, Rectangle, Triangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};
use log::{debug, trace};
use std::path::PathBuf;

use super::canvas::{Canvas, MATRIX_HEIGHT, MATRIX_WIDTH};
use super::color::NamedColor;
use super::{DisplaySurface, Panel};
use crate::error::BoardResult;
use crate::events::Event;
use crate::images::{ImageCache, ImageStore};
use crate::schedule::{NightMode, Schedule};
use crate::settings::TemperatureUnit;
use crate::stocks::{
    Direction, PricePoint, Quote, RowIndicator, StockEntry, format_chart_percent, format_chart_price,
};
use crate::transit::RouteArrivals;
use crate::weather::{CurrentWeather, ForecastColumn};

/// Drawn when an icon cannot be decoded
pub const PLACEHOLDER_IMAGE: &str = "blank.svg";

const STOCK_ROW_Y: [i32; 3] = [2, 13, 24];
const TRANSIT_ROW_Y: [i32; 3] = [9, 17, 25];
const FORECAST_COLUMN_X: [i32; 3] = [0, 22, 43];
const CHART_TOP: i32 = 16;

fn direction_color(direction: Direction) -> NamedColor {
    match direction {
        Direction::Up => NamedColor::Green,
        Direction::Down => NamedColor::Red,
    }
}

fn degrees(t: i32) -> String {
    format!("{}°", t)
}

/// Renders panels into an in-memory 64x32 frame, optionally dumping each
/// finished frame as a PPM for inspection.
pub struct FrameSurface<S> {
    canvas: Canvas,
    images: ImageCache<S>,
    weekday: Option<u32>,
    dump_path: Option<PathBuf>,
    frames: u64,
}

impl<S: ImageStore> FrameSurface<S> {
    pub fn new(images: ImageCache<S>, dump_path: Option<PathBuf>) -> Self {
        Self {
            canvas: Canvas::new(),
            images,
            weekday: None,
            dump_path,
            frames: 0,
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn images(&self) -> &ImageCache<S> {
        &self.images
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn text(&mut self, s: &str, at: Point, font: &MonoFont<'_>, color: NamedColor, alignment: Alignment) {
        let style = MonoTextStyle::new(font, color.to_rgb888());
        let layout = TextStyleBuilder::new().alignment(alignment).baseline(Baseline::Top).build();
        Text::with_text_style(s, at, style, layout).draw(&mut self.canvas).ok();
    }

    fn fill(&mut self, top_left: Point, size: Size, color: NamedColor) {
        Rectangle::new(top_left, size)
            .into_styled(PrimitiveStyle::with_fill(color.to_rgb888()))
            .draw(&mut self.canvas)
            .ok();
    }

    /// Icon, else the placeholder, else nothing and the panel stays text only.
    fn icon(&mut self, path: &str, origin: Point) -> bool {
        match self.images.get_or_placeholder(path, PLACEHOLDER_IMAGE) {
            Some(bitmap) => {
                self.canvas.blit(&bitmap, origin);
                true
            }
            None => false,
        }
    }

    fn draw_clock(&mut self, now: &NaiveDateTime) {
        let date = now.format("%a %b %-d").to_string().to_uppercase();
        self.text(&date, Point::new(1, 1), &FONT_5X8, NamedColor::DimmestWhite, Alignment::Left);
        let time = now.format("%-I:%M").to_string();
        self.text(&time, Point::new(32, 12), &FONT_9X15, NamedColor::White, Alignment::Center);
        let meridiem = now.format("%p").to_string();
        self.text(&meridiem, Point::new(63, 26), &FONT_4X6, NamedColor::DimmestWhite, Alignment::Right);
    }

    fn draw_message(&mut self, text: &str, color: NamedColor) {
        self.text(text, Point::new(32, 11), &FONT_6X10, color, Alignment::Center);
    }

    fn draw_weather(&mut self, w: &CurrentWeather, unit: TemperatureUnit) {
        self.icon(&format!("weather/{}.svg", w.icon), Point::new(0, 0));
        self.text(&degrees(w.temp), Point::new(63, 2), &FONT_9X15, NamedColor::White, Alignment::Right);
        if w.feels_like != w.temp {
            let feels = format!("{}{}", unit.as_str(), degrees(w.feels_like));
            self.text(&feels, Point::new(63, 17), &FONT_5X8, NamedColor::DimmestWhite, Alignment::Right);
        }
        // UV on the second to last row, humidity on the last
        let uv_len = (w.uv * 3).min(MATRIX_WIDTH);
        if uv_len > 0 {
            self.fill(Point::new(0, MATRIX_HEIGHT as i32 - 3), Size::new(uv_len, 1), NamedColor::Orange);
        }
        let hum_len = w.humidity.min(100) * MATRIX_WIDTH / 100;
        if hum_len > 0 {
            self.fill(Point::new(0, MATRIX_HEIGHT as i32 - 1), Size::new(hum_len, 1), NamedColor::Blue);
        }
    }

    fn draw_forecast(&mut self, columns: &[ForecastColumn]) {
        for (col, x) in columns.iter().zip(FORECAST_COLUMN_X) {
            let label_color = if col.jumped { NamedColor::Mint } else { NamedColor::DimmestWhite };
            self.text(&col.label, Point::new(x + 10, 1), &FONT_4X6, label_color, Alignment::Center);
            self.icon(&format!("columns/{}.svg", col.icon), Point::new(x + 4, 8));
            self.text(&degrees(col.feels_like), Point::new(x + 10, 23), &FONT_5X8, NamedColor::White, Alignment::Center);
        }
    }

    fn draw_indicator(&mut self, indicator: RowIndicator, y: i32) {
        match indicator {
            RowIndicator::Arrow(direction) => {
                let (a, b, c) = match direction {
                    Direction::Up => (Point::new(0, y + 5), Point::new(4, y + 5), Point::new(2, y + 1)),
                    Direction::Down => (Point::new(0, y + 1), Point::new(4, y + 1), Point::new(2, y + 5)),
                };
                Triangle::new(a, b, c)
                    .into_styled(PrimitiveStyle::with_fill(direction_color(direction).to_rgb888()))
                    .draw(&mut self.canvas)
                    .ok();
            }
            RowIndicator::Dollar => {
                self.text("$", Point::new(0, y), &FONT_5X8, NamedColor::Yellow, Alignment::Left);
            }
        }
    }

    fn draw_stock_rows(&mut self, rows: &[(StockEntry, Quote)]) {
        for ((entry, quote), y) in rows.iter().zip(STOCK_ROW_Y) {
            self.draw_indicator(entry.kind.indicator(quote), y);
            self.text(&entry.display_name, Point::new(7, y), &FONT_5X8, NamedColor::White, Alignment::Left);
            let value = entry.kind.row_value(quote);
            self.text(&value, Point::new(63, y), &FONT_5X8, direction_color(quote.direction), Alignment::Right);
        }
    }

    fn draw_chart(&mut self, entry: &StockEntry, quote: &Quote, series: &[PricePoint]) {
        let color = direction_color(quote.direction);
        self.text(&entry.display_name, Point::new(0, 0), &FONT_5X8, NamedColor::White, Alignment::Left);
        self.text(&format_chart_percent(quote.change_percent), Point::new(63, 0), &FONT_4X6, color, Alignment::Right);
        self.text(&format_chart_price(quote.price), Point::new(0, 8), &FONT_5X8, NamedColor::DimmestWhite, Alignment::Left);

        if series.len() < 2 {
            return;
        }
        let lo = series.iter().map(|p| p.close).chain([quote.open_price]).fold(f64::INFINITY, f64::min);
        let hi = series.iter().map(|p| p.close).chain([quote.open_price]).fold(f64::NEG_INFINITY, f64::max);
        let span = (hi - lo).max(f64::EPSILON);
        let bottom = MATRIX_HEIGHT as i32 - 1;
        let height = (bottom - CHART_TOP) as f64;
        let to_y = |v: f64| bottom - ((v - lo) / span * height).round() as i32;
        let to_x = |i: usize| (i as f64 * (MATRIX_WIDTH - 1) as f64 / (series.len() - 1) as f64).round() as i32;

        let open_y = to_y(quote.open_price);
        Line::new(Point::new(0, open_y), Point::new(MATRIX_WIDTH as i32 - 1, open_y))
            .into_styled(PrimitiveStyle::with_stroke(NamedColor::DimmestWhite.to_rgb888(), 1))
            .draw(&mut self.canvas)
            .ok();
        for (i, pair) in series.windows(2).enumerate() {
            Line::new(Point::new(to_x(i), to_y(pair[0].close)), Point::new(to_x(i + 1), to_y(pair[1].close)))
                .into_styled(PrimitiveStyle::with_stroke(color.to_rgb888(), 1))
                .draw(&mut self.canvas)
                .ok();
        }
    }

    fn draw_schedule(&mut self, schedule: &Schedule, now: &NaiveDateTime, progress: Option<f32>, weather: Option<&CurrentWeather>) {
        self.icon(&format!("schedules/{}", schedule.image), Point::new(0, 0));
        let time = now.format("%-I:%M").to_string();
        self.text(&time, Point::new(63, 1), &FONT_5X8, NamedColor::White, Alignment::Right);

        if let Some(w) = weather {
            self.text(&degrees(w.temp), Point::new(63, 11), &FONT_5X8, NamedColor::White, Alignment::Right);
            if schedule.night_mode == NightMode::Full {
                self.text(&format!("UV{}", w.uv), Point::new(63, 20), &FONT_4X6, NamedColor::Orange, Alignment::Right);
            }
        }

        if let Some(p) = progress {
            let y = MATRIX_HEIGHT as i32 - 1;
            self.fill(Point::new(0, y), Size::new(MATRIX_WIDTH, 1), NamedColor::DimmestWhite);
            let done = (p.clamp(0.0, 1.0) * MATRIX_WIDTH as f32).round() as u32;
            if done > 0 {
                self.fill(Point::new(0, y), Size::new(done, 1), NamedColor::Green);
            }
        }
    }

    fn draw_transit(&mut self, rows: &[RouteArrivals]) {
        self.text("CTA", Point::new(1, 1), &FONT_4X6, NamedColor::DimmestWhite, Alignment::Left);
        for (row, y) in rows.iter().zip(TRANSIT_ROW_Y) {
            self.icon(&format!("transit/{}", row.icon), Point::new(0, y));
            let label: String = row.label.chars().take(6).collect();
            self.text(&label, Point::new(14, y), &FONT_4X6, NamedColor::DimmestWhite, Alignment::Left);
            self.text(&row.minutes_text(), Point::new(63, y), &FONT_4X6, row.color, Alignment::Right);
        }
    }

    fn draw_event(&mut self, event: &Event) {
        self.icon(&format!("events/{}", event.image), Point::new(37, 2));
        self.text(&event.top, Point::new(1, 14), &FONT_5X8, NamedColor::DimmestWhite, Alignment::Left);
        self.text(&event.bottom, Point::new(1, 23), &FONT_5X8, event.color, Alignment::Left);
    }

    /// 4x4 square in the top-right corner with a black margin left and below.
    fn draw_weekday(&mut self, weekday: u32) {
        let x = MATRIX_WIDTH as i32 - 5;
        self.fill(Point::new(x, 0), Size::new(5, 5), NamedColor::Black);
        self.fill(Point::new(x + 1, 0), Size::new(4, 4), NamedColor::for_weekday(weekday));
    }

    fn flush(&self) -> BoardResult<()> {
        if let Some(path) = &self.dump_path {
            let mut file = std::fs::File::create(path)?;
            self.canvas.write_ppm(&mut file)?;
            trace!("Frame {} written to {}", self.frames, path.display());
        }
        Ok(())
    }
}

impl<S: ImageStore> DisplaySurface for FrameSurface<S> {
    fn show(&mut self, panel: &Panel) -> BoardResult<()> {
        self.canvas.clear_black();
        match panel {
            Panel::Clock { now } => self.draw_clock(now),
            Panel::Message { text, color } => self.draw_message(text, *color),
            Panel::Weather { weather, unit } => self.draw_weather(weather, *unit),
            Panel::Forecast { columns } => self.draw_forecast(columns),
            Panel::StockRows { rows } => self.draw_stock_rows(rows),
            Panel::StockChart { entry, quote, series } => self.draw_chart(entry, quote, series),
            Panel::Schedule { schedule, now, progress, weather } => {
                self.draw_schedule(schedule, now, *progress, weather.as_ref())
            }
            Panel::Transit { rows } => self.draw_transit(rows),
            Panel::Event { event } => self.draw_event(event),
        }
        if let Some(weekday) = self.weekday.filter(|_| panel.takes_weekday_indicator()) {
            self.draw_weekday(weekday);
        }
        self.frames += 1;
        debug!("Showing {} panel (frame {})", panel.kind(), self.frames);
        self.flush()
    }

    fn set_weekday_indicator(&mut self, weekday: Option<u32>) {
        self.weekday = weekday;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoardError;
    use crate::images::Bitmap;
    use chrono::NaiveDate;

    /// Only `blank.svg` decodes, a single red pixel.
    struct BlankOnly;

    impl ImageStore for BlankOnly {
        fn decode(&self, path: &str) -> BoardResult<Bitmap> {
            if path == PLACEHOLDER_IMAGE {
                Ok(Bitmap::new(1, 1, vec![Some(Rgb888::new(255, 0, 0))]))
            } else {
                Err(BoardError::DisplayResourceMissing(path.to_string()))
            }
        }
    }

    struct Nothing;

    impl ImageStore for Nothing {
        fn decode(&self, path: &str) -> BoardResult<Bitmap> {
            Err(BoardError::DisplayResourceMissing(path.to_string()))
        }
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap().and_hms_opt(12, 5, 0).unwrap()
    }

    fn weather() -> CurrentWeather {
        CurrentWeather {
            temp: 71, feels_like: 69, feels_shade: 67, uv: 4, humidity: 50, icon: 3,
            condition: "Partly Sunny".into(), has_precipitation: false,
        }
    }

    #[test]
    fn test_clock_and_weekday_indicator() {
        let mut s = FrameSurface::new(ImageCache::new(Nothing, 4), None);
        s.set_weekday_indicator(Some(3));
        s.show(&Panel::Clock { now: noon() }).unwrap();
        assert!(s.canvas().lit_pixels() > 20);
        assert_eq!(s.canvas().pixel(61, 1), Some(NamedColor::Green.to_rgb888()));
        assert_eq!(s.canvas().pixel(59, 2), Some(Rgb888::BLACK));

        s.show(&Panel::Message { text: "NO WIFI".into(), color: NamedColor::Red }).unwrap();
        assert_ne!(s.canvas().pixel(61, 1), Some(NamedColor::Green.to_rgb888()));
        assert_eq!(s.frames(), 2);
    }

    #[test]
    fn test_missing_icon_uses_placeholder_then_text_only() {
        let mut s = FrameSurface::new(ImageCache::new(BlankOnly, 4), None);
        s.show(&Panel::Weather { weather: weather(), unit: TemperatureUnit::Fahrenheit }).unwrap();
        assert_eq!(s.canvas().pixel(0, 0), Some(Rgb888::new(255, 0, 0)));
        assert!(s.images().contains(PLACEHOLDER_IMAGE));

        let mut bare = FrameSurface::new(ImageCache::new(Nothing, 4), None);
        bare.show(&Panel::Weather { weather: weather(), unit: TemperatureUnit::Celsius }).unwrap();
        assert!(bare.canvas().lit_pixels() > 0);
    }

    #[test]
    fn test_schedule_progress_bar() {
        let schedule = Schedule::parse_row("Bedtime,1,0123456,20,0,21,0,sleep.svg,1,0").unwrap();
        let mut s = FrameSurface::new(ImageCache::new(Nothing, 4), None);
        s.show(&Panel::Schedule { schedule, now: noon(), progress: Some(0.5), weather: None }).unwrap();
        assert_eq!(s.canvas().pixel(0, 31), Some(NamedColor::Green.to_rgb888()));
        assert_eq!(s.canvas().pixel(63, 31), Some(NamedColor::DimmestWhite.to_rgb888()));
    }

    #[test]
    fn test_frame_dump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.ppm");
        let mut s = FrameSurface::new(ImageCache::new(Nothing, 4), Some(path.clone()));
        s.show(&Panel::Clock { now: noon() }).unwrap();
        assert!(std::fs::read(&path).unwrap().starts_with(b"P6\n64 32\n255\n"));
    }
}
