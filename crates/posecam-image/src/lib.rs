//! Overlay canvas and drawing primitives.
//!
//! # Overview
//!
//! A [`Canvas`] is an owned RGBA8 pixel buffer that starts out fully transparent. It is meant to be
//! used as an overlay: shapes are drawn onto it with the functions in the [`draw`] module, and the
//! result is composited onto a video frame with [`Canvas::composite_onto`].
//!
//! Colors are always non-premultiplied sRGBA, see [`Color`].

pub mod draw;

mod canvas;
mod color;

pub use canvas::Canvas;
pub use color::Color;

/// Re-export of the [`image`] crate's RGBA buffer type, used for video frames.
pub use image::RgbaImage;
