//! Drawing API for [`Canvas`]es.
//!
//! This module contains a collection of freestanding functions that draw shapes onto a [`Canvas`].
//! All functions return a *guard object* that allows optional customization of the shape and
//! performs the draw operation when dropped.
//!
//! All drawing operations *overwrite* the target pixel with the shape color. They do not perform
//! blending; blending happens once, when the canvas is composited onto a frame.
//!
//! Coordinates are in pixels and may be fractional, they are rounded to the nearest pixel. Shapes
//! partially outside of the canvas are clipped.

use std::convert::Infallible;

use embedded_graphics::{
    mono_font::{iso_8859_1, MonoTextStyle},
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle, PrimitiveStyleBuilder, Rectangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};

use crate::{Canvas, Color};

/// Guard returned by [`line`][line()]; draws the line when dropped and allows customization.
pub struct DrawLine<'a> {
    canvas: &'a mut Canvas,
    start: Point,
    end: Point,
    color: Color,
    stroke_width: u32,
}

impl DrawLine<'_> {
    /// Sets the line's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the line's stroke width.
    ///
    /// By default, a stroke width of 1 is used.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl Drop for DrawLine<'_> {
    fn drop(&mut self) {
        match Line::new(self.start, self.end)
            .into_styled(PrimitiveStyle::with_stroke(self.color, self.stroke_width))
            .draw(&mut Target(&mut *self.canvas))
        {
            Ok(()) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Guard returned by [`circle`]; draws the circle when dropped and allows customization.
pub struct DrawCircle<'a> {
    canvas: &'a mut Canvas,
    center: Point,
    radius: f32,
    color: Color,
    fill: Option<Color>,
    stroke_width: u32,
}

impl DrawCircle<'_> {
    /// Sets the outline color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Fills the inside of the circle with `color`.
    ///
    /// By default, circles are not filled.
    pub fn fill(&mut self, color: Color) -> &mut Self {
        self.fill = Some(color);
        self
    }

    /// Sets the width of the outline.
    ///
    /// By default, a stroke width of 1 is used. A width of 0 draws no outline.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl Drop for DrawCircle<'_> {
    fn drop(&mut self) {
        let diameter = (self.radius * 2.0).round().max(1.0) as u32;
        let mut style = PrimitiveStyleBuilder::new()
            .stroke_color(self.color)
            .stroke_width(self.stroke_width);
        if let Some(fill) = self.fill {
            style = style.fill_color(fill);
        }

        match Circle::with_center(self.center, diameter)
            .into_styled(style.build())
            .draw(&mut Target(&mut *self.canvas))
        {
            Ok(()) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Guard returned by [`rect`]; draws the filled rectangle when dropped.
pub struct DrawRect<'a> {
    canvas: &'a mut Canvas,
    top_left: Point,
    size: Size,
    color: Color,
}

impl DrawRect<'_> {
    /// Sets the fill color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }
}

impl Drop for DrawRect<'_> {
    fn drop(&mut self) {
        match Rectangle::new(self.top_left, self.size)
            .into_styled(PrimitiveStyle::with_fill(self.color))
            .draw(&mut Target(&mut *self.canvas))
        {
            Ok(()) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Guard returned by [`text`]; draws the text when dropped and allows customization.
pub struct DrawText<'a> {
    canvas: &'a mut Canvas,
    position: Point,
    text: &'a str,
    color: Color,
    alignment: Alignment,
    baseline: Baseline,
}

impl DrawText<'_> {
    /// Sets the text color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Aligns the left side of the text with the `x` coordinate.
    pub fn align_left(&mut self) -> &mut Self {
        self.alignment = Alignment::Left;
        self
    }

    /// Aligns the right side of the text with the `x` coordinate.
    pub fn align_right(&mut self) -> &mut Self {
        self.alignment = Alignment::Right;
        self
    }

    /// Aligns the top of the text with the `y` coordinate.
    pub fn align_top(&mut self) -> &mut Self {
        self.baseline = Baseline::Top;
        self
    }
}

impl Drop for DrawText<'_> {
    fn drop(&mut self) {
        // Latin-1 covers the accented characters of the status texts. Anything else (emoji, check
        // marks) is rendered as the font's replacement glyph.
        let character_style = MonoTextStyle::new(&iso_8859_1::FONT_7X13, self.color);
        let text_style = TextStyleBuilder::new()
            .alignment(self.alignment)
            .baseline(self.baseline)
            .build();
        match Text::with_text_style(self.text, self.position, character_style, text_style)
            .draw(&mut Target(&mut *self.canvas))
        {
            Ok(_) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Height of a line of text drawn by [`text`], in pixels.
pub const LINE_HEIGHT: u32 = 13;

fn point(x: f32, y: f32) -> Point {
    Point::new(x.round() as i32, y.round() as i32)
}

/// Draws a line from `(start_x, start_y)` to `(end_x, end_y)`.
pub fn line(
    canvas: &mut Canvas,
    start_x: f32,
    start_y: f32,
    end_x: f32,
    end_y: f32,
) -> DrawLine<'_> {
    DrawLine {
        canvas,
        start: point(start_x, start_y),
        end: point(end_x, end_y),
        color: Color::BLUE,
        stroke_width: 1,
    }
}

/// Draws a circle with the given center and radius.
pub fn circle(canvas: &mut Canvas, x: f32, y: f32, radius: f32) -> DrawCircle<'_> {
    DrawCircle {
        canvas,
        center: point(x, y),
        radius,
        color: Color::GREEN,
        fill: None,
        stroke_width: 1,
    }
}

/// Draws a filled, axis-aligned rectangle.
pub fn rect(canvas: &mut Canvas, x: i32, y: i32, width: u32, height: u32) -> DrawRect<'_> {
    DrawRect {
        canvas,
        top_left: Point::new(x, y),
        size: Size::new(width, height),
        color: Color::BLACK,
    }
}

/// Draws a text string onto a canvas.
///
/// By default, the text is drawn centered horizontally and vertically around `x` and `y`.
pub fn text<'a>(canvas: &'a mut Canvas, x: i32, y: i32, text: &'a str) -> DrawText<'a> {
    DrawText {
        canvas,
        position: Point::new(x, y),
        text,
        color: Color::WHITE,
        alignment: Alignment::Center,
        baseline: Baseline::Middle,
    }
}

struct Target<'a>(&'a mut Canvas);

impl OriginDimensions for Target<'_> {
    fn size(&self) -> Size {
        Size::new(self.0.width(), self.0.height())
    }
}

impl DrawTarget for Target<'_> {
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(pos, color) in pixels {
            if pos.x >= 0
                && (pos.x as u32) < self.0.width()
                && pos.y >= 0
                && (pos.y as u32) < self.0.height()
            {
                self.0.set(pos.x as u32, pos.y as u32, color);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_is_clipped() {
        let mut canvas = Canvas::new(8, 8);
        line(&mut canvas, -4.0, 3.0, 20.0, 3.0).color(Color::RED);
        for x in 0..8 {
            assert_eq!(canvas.get(x, 3), Color::RED);
        }
        assert_eq!(canvas.get(0, 0), Color::NONE);
    }

    #[test]
    fn filled_circle() {
        let mut canvas = Canvas::new(21, 21);
        circle(&mut canvas, 10.0, 10.0, 8.0)
            .color(Color::RED)
            .fill(Color::BLUE);

        assert_eq!(canvas.get(10, 10), Color::BLUE);
        assert_eq!(canvas.get(0, 0), Color::NONE);
        // Somewhere on the outline.
        assert!((0..21).any(|x| canvas.get(x, 10) == Color::RED));
    }

    #[test]
    fn larger_radius_covers_more_pixels() {
        let covered = |radius| {
            let mut canvas = Canvas::new(32, 32);
            circle(&mut canvas, 16.0, 16.0, radius).fill(Color::WHITE);
            canvas
                .data()
                .chunks_exact(4)
                .filter(|px| px[3] != 0)
                .count()
        };
        assert!(covered(8.0) > covered(2.0));
    }

    #[test]
    fn text_draws_something() {
        let mut canvas = Canvas::new(64, 16);
        text(&mut canvas, 0, 0, "Cámara").align_left().align_top();
        assert!(!canvas.is_blank());
    }
}
