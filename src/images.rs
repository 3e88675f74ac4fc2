/*
 *  images.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Decoded icon cache (LRU) and the SVG rasteriser behind it
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
use log::{debug, warn};
use resvg::{
    render,
    usvg::{Options as ResvgUsvgOptions, Transform, Tree as ResvgTree},
};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiny_skia::Pixmap;

use crate::error::{BoardError, BoardResult};

pub const IMAGE_CACHE_CAPACITY: usize = 12;

/// Alpha below this is left transparent when blitting.
const ALPHA_THRESHOLD: u8 = 128;

/// Decoded RGB image, `None` pixels are transparent.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Option<Rgb888>>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32, pixels: Vec<Option<Rgb888>>) -> Self {
        Self { width, height, pixels }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb888> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied().flatten()
    }
}

/// Turns an asset path into pixels.
pub trait ImageStore {
    fn decode(&self, path: &str) -> BoardResult<Bitmap>;
}

/// Icons live as SVG under one asset root, `.bmp` names resolve to the `.svg` twin.
#[derive(Debug, Clone)]
pub struct SvgImageStore {
    root: PathBuf,
}

impl SvgImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let rel = Path::new(path.trim_start_matches('/'));
        let full = self.root.join(rel);
        match full.extension().and_then(|e| e.to_str()) {
            Some("svg") => full,
            _ => full.with_extension("svg"),
        }
    }

    /// Rasterise at the document's own size.
    pub fn rasterise(svg_data: &str) -> BoardResult<Bitmap> {
        let tree = ResvgTree::from_str(svg_data, &ResvgUsvgOptions::default())
            .map_err(|e| BoardError::Parse(format!("Failed to parse SVG: {:?}", e)))?;
        let size = tree.size();
        let (width, height) = (size.width().ceil() as u32, size.height().ceil() as u32);

        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| BoardError::Parse(format!("Failed to create {}x{} pixmap", width, height)))?;
        render(&tree, Transform::default(), &mut pixmap.as_mut());

        let pixels = pixmap
            .pixels()
            .iter()
            .map(|p| {
                let c = p.demultiply();
                (c.alpha() >= ALPHA_THRESHOLD).then(|| Rgb888::new(c.red(), c.green(), c.blue()))
            })
            .collect();
        Ok(Bitmap::new(width, height, pixels))
    }
}

impl ImageStore for SvgImageStore {
    fn decode(&self, path: &str) -> BoardResult<Bitmap> {
        let full = self.resolve(path);
        let data = std::fs::read_to_string(&full).map_err(|e| {
            BoardError::DisplayResourceMissing(format!("{}: {}", full.display(), e))
        })?;
        let bitmap = Self::rasterise(&data)?;
        debug!("Rasterised {} ({}x{})", full.display(), bitmap.width, bitmap.height);
        Ok(bitmap)
    }
}

/// Bounded decoded-image cache, least recently used goes first.
pub struct ImageCache<S> {
    store: S,
    capacity: usize,
    entries: HashMap<String, Arc<Bitmap>>,
    order: VecDeque<String>,
}

impl<S: ImageStore> ImageCache<S> {
    pub fn new(store: S, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Paths from least to most recently used.
    pub fn recency(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    fn touch(&mut self, path: &str) {
        if let Some(pos) = self.order.iter().position(|p| p == path) {
            if let Some(key) = self.order.remove(pos) {
                self.order.push_back(key);
            }
        }
    }

    /// Cached bitmap, decoding on a miss. Decode errors are returned, never cached.
    pub fn get(&mut self, path: &str) -> BoardResult<Arc<Bitmap>> {
        if let Some(bitmap) = self.entries.get(path).cloned() {
            self.touch(path);
            return Ok(bitmap);
        }

        let bitmap = Arc::new(self.store.decode(path)?);
        self.entries.insert(path.to_string(), Arc::clone(&bitmap));
        self.order.push_back(path.to_string());

        if self.entries.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                debug!("Image cache evicted {}", oldest);
            }
        }
        Ok(bitmap)
    }

    /// `path`, else the placeholder, else `None` for a text-only panel.
    pub fn get_or_placeholder(&mut self, path: &str, placeholder: &str) -> Option<Arc<Bitmap>> {
        match self.get(path) {
            Ok(b) => Some(b),
            Err(e) => {
                warn!("Image {} unavailable: {} - trying placeholder", path, e);
                match self.get(placeholder) {
                    Ok(b) => Some(b),
                    Err(e) => {
                        warn!("Placeholder {} unavailable: {} - text only", placeholder, e);
                        None
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct CountingStore {
        decoded: RefCell<Vec<String>>,
    }

    impl ImageStore for &CountingStore {
        fn decode(&self, path: &str) -> BoardResult<Bitmap> {
            if path.starts_with("missing") {
                return Err(BoardError::DisplayResourceMissing(path.to_string()));
            }
            self.decoded.borrow_mut().push(path.to_string());
            Ok(Bitmap::new(1, 1, vec![Some(Rgb888::new(1, 2, 3))]))
        }
    }

    fn store() -> CountingStore {
        CountingStore { decoded: RefCell::new(Vec::new()) }
    }

    #[test]
    fn test_overflow_evicts_least_recent() {
        let s = store();
        let mut cache = ImageCache::new(&s, 3);
        for p in ["a", "b", "c"] {
            cache.get(p).unwrap();
        }
        cache.get("a").unwrap();
        cache.get("d").unwrap();

        assert!(!cache.contains("b"));
        assert_eq!(cache.recency().collect::<Vec<_>>(), vec!["c", "a", "d"]);
        assert_eq!(s.decoded.borrow().len(), 4);
    }

    #[test]
    fn test_capacity_plus_one_evicts_first() {
        let s = store();
        let mut cache = ImageCache::new(&s, IMAGE_CACHE_CAPACITY);
        let paths: Vec<String> = (0..=IMAGE_CACHE_CAPACITY).map(|i| format!("img/{}.svg", i)).collect();
        for p in &paths {
            cache.get(p).unwrap();
        }
        assert_eq!(cache.len(), IMAGE_CACHE_CAPACITY);
        assert!(!cache.contains(&paths[0]));
        assert!(cache.contains(&paths[1]));
    }

    #[test]
    fn test_failures_not_cached() {
        let s = store();
        let mut cache = ImageCache::new(&s, 2);
        assert!(cache.get("missing.svg").is_err());
        assert!(cache.is_empty());

        assert!(cache.get_or_placeholder("missing.svg", "blank.svg").is_some());
        assert!(cache.contains("blank.svg"));
        assert!(cache.get_or_placeholder("missing.svg", "missing-too.svg").is_none());
    }

    #[test]
    fn test_rasterise_svg() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="4" height="2">
            <rect x="0" y="0" width="2" height="2" fill="#ff0000"/></svg>"##;
        let b = SvgImageStore::rasterise(svg).unwrap();
        assert_eq!((b.width, b.height), (4, 2));
        assert_eq!(b.pixel(0, 0), Some(Rgb888::new(255, 0, 0)));
        assert_eq!(b.pixel(3, 1), None);
    }

    #[test]
    fn test_resolve_maps_to_svg() {
        let s = SvgImageStore::new("/opt/tablero/img");
        assert_eq!(s.resolve("/schedules/sleep.bmp"), PathBuf::from("/opt/tablero/img/schedules/sleep.svg"));
        assert_eq!(s.resolve("weather/1.svg"), PathBuf::from("/opt/tablero/img/weather/1.svg"));
    }
}
