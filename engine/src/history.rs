use std::collections::VecDeque;
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use std::io::Cursor;
use crate::error::Result;

/// Linear undo stack with a cursor. Pushing after an undo drops the redo tail;
/// past `cap` entries the oldest is evicted.
#[derive(Clone, Debug)]
pub struct History<T: Clone> {
    entries: VecDeque<T>,
    cursor: usize,
    cap: usize,
}

impl<T: Clone> History<T> {
    pub fn new(initial: T, cap: usize) -> Self {
        let mut entries = VecDeque::new();
        entries.push_back(initial);
        History { entries, cursor: 0, cap: cap.max(1) }
    }

    pub fn push(&mut self, entry: T) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push_back(entry);
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len() - 1;
    }

    pub fn undo(&mut self) -> Option<&T> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor)
    }

    pub fn redo(&mut self) -> Option<&T> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor)
    }

    pub fn current(&self) -> &T {
        &self.entries[self.cursor]
    }

    /// Drop everything and start over from `initial`.
    pub fn reset(&mut self, initial: T) {
        self.entries.clear();
        self.entries.push_back(initial);
        self.cursor = 0;
    }

    pub fn can_undo(&self) -> bool { self.cursor > 0 }
    pub fn can_redo(&self) -> bool { self.cursor + 1 < self.entries.len() }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn cursor(&self) -> usize { self.cursor }
}

/// PNG-encoded copy of the base-layer raster.
#[derive(Clone, Debug, PartialEq)]
pub struct BaseSnapshot {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

impl BaseSnapshot {
    pub fn capture(raster: &RgbaImage) -> Result<Self> {
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(raster.clone()).write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)?;
        Ok(BaseSnapshot { width: raster.width(), height: raster.height(), png })
    }

    pub fn restore(&self) -> Result<RgbaImage> {
        Ok(image::load_from_memory(&self.png)?.to_rgba8())
    }
}
