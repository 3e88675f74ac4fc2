/*
 *  display/color.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Named palette for the RGB matrix
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

use embedded_graphics::pixelcolor::Rgb888;
use log::warn;
use std::fmt;
use std::str::FromStr;

use crate::error::BoardError;

/// Every colour a CSV row may name.
///
/// Route and event files refer to colours by name, so the set is closed and
/// an unknown name is an error the caller decides how to degrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NamedColor {
    Black,
    #[default]
    White,
    Green,
    Red,
    Blue,
    Orange,
    Yellow,
    Aqua,
    Mint,
    Lilac,
    Pink,
    Purple,
    Brown,
    DimmestWhite,
}

impl NamedColor {
    pub const ALL: [NamedColor; 14] = [
        NamedColor::Black,
        NamedColor::White,
        NamedColor::Green,
        NamedColor::Red,
        NamedColor::Blue,
        NamedColor::Orange,
        NamedColor::Yellow,
        NamedColor::Aqua,
        NamedColor::Mint,
        NamedColor::Lilac,
        NamedColor::Pink,
        NamedColor::Purple,
        NamedColor::Brown,
        NamedColor::DimmestWhite,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NamedColor::Black => "BLACK",
            NamedColor::White => "WHITE",
            NamedColor::Green => "GREEN",
            NamedColor::Red => "RED",
            NamedColor::Blue => "BLUE",
            NamedColor::Orange => "ORANGE",
            NamedColor::Yellow => "YELLOW",
            NamedColor::Aqua => "AQUA",
            NamedColor::Mint => "MINT",
            NamedColor::Lilac => "LILAC",
            NamedColor::Pink => "PINK",
            NamedColor::Purple => "PURPLE",
            NamedColor::Brown => "BROWN",
            NamedColor::DimmestWhite => "DIMMEST_WHITE",
        }
    }

    /// Panel RGB, white is warm to keep the matrix from looking blue.
    pub fn to_rgb888(&self) -> Rgb888 {
        let hex: u32 = match self {
            NamedColor::Black => 0x000000,
            NamedColor::White => 0xF5F5DC,
            NamedColor::Green => 0x00FF00,
            NamedColor::Red => 0xFF0000,
            NamedColor::Blue => 0x0000FF,
            NamedColor::Orange => 0xFFA500,
            NamedColor::Yellow => 0xFFD700,
            NamedColor::Aqua => 0x00C8C8,
            NamedColor::Mint => 0x288C3C,
            NamedColor::Lilac => 0xB48CDC,
            NamedColor::Pink => 0xFF5A96,
            NamedColor::Purple => 0x8C28C8,
            NamedColor::Brown => 0x8B4513,
            NamedColor::DimmestWhite => 0x4A4A3C,
        };
        Rgb888::new((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
    }

    /// Parse, or fall back to white with a warning naming the row's owner.
    pub fn parse_or_white(name: &str, owner: &str) -> NamedColor {
        name.parse().unwrap_or_else(|e| {
            warn!("{} for {} - using WHITE", e, owner);
            NamedColor::White
        })
    }

    /// Day-of-week indicator colour, 0 is Monday.
    pub fn for_weekday(weekday: u32) -> NamedColor {
        match weekday {
            0 => NamedColor::Red,
            1 => NamedColor::Orange,
            2 => NamedColor::Yellow,
            3 => NamedColor::Green,
            4 => NamedColor::Aqua,
            5 => NamedColor::Purple,
            6 => NamedColor::Pink,
            _ => NamedColor::White,
        }
    }
}

impl FromStr for NamedColor {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        NamedColor::ALL
            .into_iter()
            .find(|c| c.name() == wanted)
            .ok_or_else(|| BoardError::UnknownColor(s.trim().to_string()))
    }
}

impl fmt::Display for NamedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("mint".parse::<NamedColor>().unwrap(), NamedColor::Mint);
        assert_eq!(" Dimmest_White ".parse::<NamedColor>().unwrap(), NamedColor::DimmestWhite);
    }

    #[test]
    fn test_unknown_name_is_an_error() {
        let err = "BUGAMBILIA".parse::<NamedColor>().unwrap_err();
        assert!(matches!(err, BoardError::UnknownColor(ref n) if n == "BUGAMBILIA"));
        assert_eq!(NamedColor::parse_or_white("BUGAMBILIA", "event 1225"), NamedColor::White);
    }

    #[test]
    fn test_names_round_trip() {
        for c in NamedColor::ALL {
            assert_eq!(c.name().parse::<NamedColor>().unwrap(), c);
        }
    }

    #[test]
    fn test_rgb_and_weekday() {
        assert_eq!(NamedColor::Red.to_rgb888(), Rgb888::new(255, 0, 0));
        assert_eq!(NamedColor::Mint.to_rgb888(), Rgb888::new(0x28, 0x8C, 0x3C));
        assert_eq!(NamedColor::for_weekday(0), NamedColor::Red);
        assert_eq!(NamedColor::for_weekday(6), NamedColor::Pink);
    }
}
