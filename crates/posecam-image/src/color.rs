use std::fmt;

use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};

/// An 8-bit RGBA color.
///
/// Colors are always in the non-linear sRGB color space and use non-premultiplied alpha.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    /// Fully transparent black (all components are 0).
    pub const NONE: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);
    pub const GREEN: Self = Self([0, 255, 0, 255]);
    pub const BLUE: Self = Self([0, 0, 255, 255]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub const fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }

    /// Blends `self` over `dest` using straight alpha, returning the resulting color.
    ///
    /// The alpha of the result is that of `dest` combined with `self`'s coverage.
    pub fn over(self, dest: Color) -> Color {
        let sa = u32::from(self.a());
        if sa == 255 {
            return self;
        }
        if sa == 0 {
            return dest;
        }

        let mix = |s: u8, d: u8| ((u32::from(s) * sa + u32::from(d) * (255 - sa)) / 255) as u8;
        let a = sa + u32::from(dest.a()) * (255 - sa) / 255;
        Color([
            mix(self.r(), dest.r()),
            mix(self.g(), dest.g()),
            mix(self.b(), dest.b()),
            a.min(255) as u8,
        ])
    }

    /// Packs the color into a `0RGB` word, as expected by framebuffer-style window surfaces.
    pub fn to_0rgb(self) -> u32 {
        (u32::from(self.r()) << 16) | (u32::from(self.g()) << 8) | u32::from(self.b())
    }
}

impl PixelColor for Color {
    type Raw = RawU32;
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r(),
            self.g(),
            self.b(),
            self.a(),
        )
    }
}
