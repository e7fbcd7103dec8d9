//! Desktop window presenting the [`App`].
//!
//! The window shows the live video with the skeleton overlay on top and a panel with the status
//! and statistics below it. `Space` or `Enter` clicks the camera toggle; `Escape` or closing the
//! window quits.

use minifb::{Key, KeyRepeat, Window, WindowOptions};
use posecam_image::{draw, Canvas, Color, RgbaImage};

use crate::app::App;

pub const WINDOW_TITLE: &str = "ISTEduca - Detección de Poses con IA";

/// Size of the video area, in window pixels.
pub const VIDEO_WIDTH: usize = 960;
pub const VIDEO_HEIGHT: usize = 540;
/// Height of the status panel below the video.
pub const PANEL_HEIGHT: usize = 56;

const TARGET_FPS: usize = 60;

const BACKGROUND: u32 = 0x00_10_10_18;
const PANEL_COLOR: Color = Color::from_rgb8(0x4A, 0x31, 0x68);
const ACCENT_COLOR: Color = Color::from_rgb8(0xC7, 0x43, 0x98);
const DISABLED_COLOR: Color = Color::from_rgb8(0x90, 0x90, 0x90);

/// A region of the window buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Viewport {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
}

/// Fits an image of `src_width`x`src_height` into `dest_width`x`dest_height`, preserving its aspect
/// ratio and centering it.
fn fit(src_width: u32, src_height: u32, dest_width: usize, dest_height: usize) -> Viewport {
    if src_width == 0 || src_height == 0 {
        return Viewport {
            x: 0,
            y: 0,
            width: 0,
            height: 0,
        };
    }

    let scale = (dest_width as f32 / src_width as f32).min(dest_height as f32 / src_height as f32);
    let width = ((src_width as f32 * scale).round() as usize).min(dest_width);
    let height = ((src_height as f32 * scale).round() as usize).min(dest_height);
    Viewport {
        x: (dest_width - width) / 2,
        y: (dest_height - height) / 2,
        width,
        height,
    }
}

fn rgba_to_0rgb([r, g, b, a]: [u8; 4]) -> u32 {
    Color::from_rgba8(r, g, b, a).to_0rgb()
}

/// Copies `image` into `viewport` of a buffer that is `stride` pixels wide, using
/// nearest-neighbor scaling.
fn blit_scaled(image: &RgbaImage, buffer: &mut [u32], stride: usize, viewport: Viewport) {
    for dy in 0..viewport.height {
        let sy = (dy * image.height() as usize / viewport.height) as u32;
        let row = (viewport.y + dy) * stride + viewport.x;
        for dx in 0..viewport.width {
            let sx = (dx * image.width() as usize / viewport.width) as u32;
            buffer[row + dx] = rgba_to_0rgb(image.get_pixel(sx, sy).0);
        }
    }
}

/// Draws the status panel for the current app state.
fn draw_panel(panel: &mut Canvas, app: &App) {
    let dom = app.dom();
    let (width, height) = (panel.width(), panel.height());
    draw::rect(panel, 0, 0, width, height).color(PANEL_COLOR);

    let (line1, line2) = (6, 6 + 2 * draw::LINE_HEIGHT as i32);
    draw::text(panel, 8, line1, &dom.status)
        .align_left()
        .align_top()
        .color(Color::WHITE);

    let stats = format!(
        "Poses detectadas: {}   Confianza promedio: {}",
        dom.pose_count, dom.confidence
    );
    draw::text(panel, 8, line2, &stats)
        .align_left()
        .align_top()
        .color(Color::WHITE);

    let (toggle, color) = if dom.toggle.disabled {
        (format!("[{}]", dom.toggle.label), DISABLED_COLOR)
    } else if dom.toggle.is_active() {
        (format!("[Espacio] {}", dom.toggle.label), ACCENT_COLOR)
    } else {
        (format!("[Espacio] {}", dom.toggle.label), Color::WHITE)
    };
    draw::text(panel, width as i32 - 8, line2, &toggle)
        .align_right()
        .align_top()
        .color(color);
}

pub struct Gui {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    panel: Canvas,
}

impl Gui {
    pub fn open(title: &str) -> anyhow::Result<Self> {
        let width = VIDEO_WIDTH;
        let height = VIDEO_HEIGHT + PANEL_HEIGHT;
        let mut window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;
        window.set_target_fps(TARGET_FPS);

        log::debug!("opened {width}x{height} window '{title}'");

        Ok(Self {
            window,
            buffer: vec![BACKGROUND; width * height],
            width,
            height,
            panel: Canvas::new(width as u32, PANEL_HEIGHT as u32),
        })
    }

    /// Returns `false` once the user closed the window or pressed `Escape`.
    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    /// Returns whether the toggle was clicked since the last [`Gui::present`].
    pub fn toggle_clicked(&self) -> bool {
        self.window.is_key_pressed(Key::Space, KeyRepeat::No)
            || self.window.is_key_pressed(Key::Enter, KeyRepeat::No)
    }

    /// Renders the app state into the window.
    pub fn present(&mut self, app: &App) -> anyhow::Result<()> {
        self.buffer.fill(BACKGROUND);

        if app.dom().is_video_visible() {
            if let Some(frame) = app.video().current_frame() {
                let mut image = frame.image().clone();
                app.canvas().composite_onto(&mut image);
                let viewport = fit(image.width(), image.height(), self.width, VIDEO_HEIGHT);
                blit_scaled(&image, &mut self.buffer, self.width, viewport);
            }
        }

        draw_panel(&mut self.panel, app);
        let panel = self.panel.data().chunks_exact(4);
        let dest = &mut self.buffer[VIDEO_HEIGHT * self.width..];
        for (px, rgba) in dest.iter_mut().zip(panel) {
            *px = rgba_to_0rgb([rgba[0], rgba[1], rgba[2], rgba[3]]);
        }

        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)?;
        Ok(())
    }
}

/// Runs the application in a window until the user quits.
pub fn run(mut app: App) -> anyhow::Result<()> {
    let mut gui = Gui::open(WINDOW_TITLE)?;
    while gui.is_open() {
        if gui.toggle_clicked() && !app.dom().toggle.disabled {
            app.click();
        }
        app.poll();
        app.tick();
        gui.present(&app)?;
    }
    log::debug!("window closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_preserves_aspect_ratio() {
        let full = fit(1280, 720, VIDEO_WIDTH, VIDEO_HEIGHT);
        assert_eq!(
            full,
            Viewport {
                x: 0,
                y: 0,
                width: 960,
                height: 540
            }
        );

        let pillarboxed = fit(640, 480, VIDEO_WIDTH, VIDEO_HEIGHT);
        assert_eq!(
            pillarboxed,
            Viewport {
                x: 120,
                y: 0,
                width: 720,
                height: 540
            }
        );

        assert_eq!(fit(0, 480, VIDEO_WIDTH, VIDEO_HEIGHT).width, 0);
    }

    #[test]
    fn blit_scales_nearest_neighbor() {
        let mut src = RgbaImage::new(2, 1);
        src.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        src.put_pixel(1, 0, image::Rgba([0, 0, 255, 255]));

        let mut buffer = vec![0; 6 * 2];
        let viewport = Viewport {
            x: 1,
            y: 0,
            width: 4,
            height: 2,
        };
        blit_scaled(&src, &mut buffer, 6, viewport);
        let red = Color::RED.to_0rgb();
        let blue = Color::BLUE.to_0rgb();
        assert_eq!(&buffer[..6], &[0, red, red, blue, blue, 0]);
        assert_eq!(&buffer[6..], &[0, red, red, blue, blue, 0]);
    }
}
