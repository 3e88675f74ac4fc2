/*
 *  display/canvas.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Fixed 64x32 RGB framebuffer for embedded-graphics
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

use core::convert::Infallible;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use std::io::Write;

use crate::images::Bitmap;

pub const MATRIX_WIDTH: u32 = 64;
pub const MATRIX_HEIGHT: u32 = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    buf: Vec<Rgb888>,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas {
    pub fn new() -> Self {
        Self { buf: vec![Rgb888::BLACK; (MATRIX_WIDTH * MATRIX_HEIGHT) as usize] }
    }

    pub fn as_slice(&self) -> &[Rgb888] {
        &self.buf
    }

    pub fn clear_black(&mut self) {
        self.buf.fill(Rgb888::BLACK);
    }

    #[inline]
    fn idx(&self, p: Point) -> Option<usize> {
        if p.x >= 0 && p.y >= 0 && (p.x as u32) < MATRIX_WIDTH && (p.y as u32) < MATRIX_HEIGHT {
            return Some(p.y as usize * MATRIX_WIDTH as usize + p.x as usize);
        }
        None
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgb888> {
        self.idx(Point::new(x, y)).map(|i| self.buf[i])
    }

    pub fn lit_pixels(&self) -> usize {
        self.buf.iter().filter(|c| **c != Rgb888::BLACK).count()
    }

    /// Copy the opaque pixels of `bitmap` with its top-left at `origin`.
    pub fn blit(&mut self, bitmap: &Bitmap, origin: Point) {
        for y in 0..bitmap.height {
            for x in 0..bitmap.width {
                if let Some(c) = bitmap.pixel(x, y) {
                    if let Some(i) = self.idx(origin + Point::new(x as i32, y as i32)) {
                        self.buf[i] = c;
                    }
                }
            }
        }
    }

    /// Binary PPM (P6), handy for eyeballing a frame on a desktop.
    pub fn write_ppm<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        write!(out, "P6\n{} {}\n255\n", MATRIX_WIDTH, MATRIX_HEIGHT)?;
        let bytes: Vec<u8> = self.buf.iter().flat_map(|c| [c.r(), c.g(), c.b()]).collect();
        out.write_all(&bytes)
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(MATRIX_WIDTH, MATRIX_HEIGHT)
    }
}

impl DrawTarget for Canvas {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, c) in pixels {
            if let Some(i) = self.idx(p) {
                self.buf[i] = c;
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.buf.fill(color);
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let area = area.intersection(&self.bounding_box());
        for p in area.points() {
            if let Some(i) = self.idx(p) {
                self.buf[i] = color;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::primitives::{Line, PrimitiveStyle};

    #[test]
    fn test_draw_clips_to_matrix() {
        let mut c = Canvas::new();
        Line::new(Point::new(-5, 0), Point::new(70, 0))
            .into_styled(PrimitiveStyle::with_stroke(Rgb888::RED, 1))
            .draw(&mut c)
            .unwrap();
        assert_eq!(c.lit_pixels(), MATRIX_WIDTH as usize);
        assert_eq!(c.pixel(63, 0), Some(Rgb888::RED));
        assert_eq!(c.pixel(64, 0), None);
    }

    #[test]
    fn test_blit_skips_transparent() {
        let mut c = Canvas::new();
        let b = Bitmap::new(2, 1, vec![Some(Rgb888::GREEN), None]);
        c.blit(&b, Point::new(62, 31));
        c.blit(&b, Point::new(63, 31));
        assert_eq!(c.pixel(62, 31), Some(Rgb888::GREEN));
        assert_eq!(c.pixel(63, 31), Some(Rgb888::GREEN));
        assert_eq!(c.lit_pixels(), 2);
    }

    #[test]
    fn test_ppm_header_and_size() {
        let c = Canvas::new();
        let mut out = Vec::new();
        c.write_ppm(&mut out).unwrap();
        let header = b"P6\n64 32\n255\n";
        assert!(out.starts_with(header));
        assert_eq!(out.len(), header.len() + 64 * 32 * 3);
    }
}
