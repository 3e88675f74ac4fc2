/*
 *  lib.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Rotation scheduler and data-freshness engine for a 64x32 RGB matrix
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

pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod freshness;
pub mod hardware;
pub mod http;
pub mod images;
pub mod metrics;
pub mod rotation;
pub mod schedule;
pub mod settings;
pub mod stocks;
pub mod transit;
pub mod weather;
pub mod windows;

pub use error::{BoardError, BoardResult};
pub use rotation::{App, CycleReport, Devices, Feeds};
