use std::fmt;

use image::{Rgba, RgbaImage};

use crate::Color;

/// An RGBA8 drawing surface, typically used as a transparent overlay on top of a video frame.
#[derive(Clone, PartialEq, Eq)]
pub struct Canvas {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Canvas {
    /// Creates a fully transparent canvas of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the raw RGBA8 pixel data, row by row.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Changes the size of the canvas.
    ///
    /// Like resizing an HTML canvas, this discards the current contents, even if the size does not
    /// change.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.resize(width as usize * height as usize * 4, 0);
    }

    /// Resets every pixel to [`Color::NONE`].
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Returns `true` if every pixel on the canvas is fully transparent.
    pub fn is_blank(&self) -> bool {
        self.data.chunks_exact(4).all(|px| px[3] == 0)
    }

    /// Returns the color of the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    pub fn get(&self, x: u32, y: u32) -> Color {
        let i = self.index(x, y);
        Color([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    /// Overwrites the pixel at `(x, y)` with `color`. No blending is performed.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        let i = self.index(x, y);
        self.data[i..i + 4].copy_from_slice(&color.0);
    }

    fn index(&self, x: u32, y: u32) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for {}x{} canvas",
            self.width,
            self.height,
        );
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Blends this canvas over `frame`, anchored at the top left corner.
    ///
    /// Pixels outside of the overlapping region are left untouched.
    pub fn composite_onto(&self, frame: &mut RgbaImage) {
        let width = self.width.min(frame.width());
        let height = self.height.min(frame.height());
        for y in 0..height {
            for x in 0..width {
                let src = self.get(x, y);
                if src.a() == 0 {
                    continue;
                }
                let dest = frame.get_pixel_mut(x, y);
                let blended = src.over(Color(dest.0));
                *dest = Rgba(blended.0);
            }
        }
    }
}

impl fmt::Debug for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canvas")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}
