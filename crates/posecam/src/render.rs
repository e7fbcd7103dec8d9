//! Skeleton overlay rendering.

use posecam_image::{draw, Canvas, Color};

use crate::{landmark::Landmarks, pose::Connection};

/// Outline and connector color.
pub const STROKE_COLOR: Color = Color::from_rgb8(0xC7, 0x43, 0x98);
/// Landmark fill color.
pub const FILL_COLOR: Color = Color::from_rgb8(0x4A, 0x31, 0x68);

/// Depth range mapped onto the landmark radius. Closer landmarks have smaller Z.
pub const DEPTH_NEAR: f32 = -0.15;
pub const DEPTH_FAR: f32 = 0.1;
/// Radius of landmarks at (or closer than) [`DEPTH_NEAR`].
pub const RADIUS_NEAR: f32 = 8.0;
/// Radius of landmarks at (or farther than) [`DEPTH_FAR`].
pub const RADIUS_FAR: f32 = 2.0;

/// How landmarks are drawn.
#[derive(Debug, Clone, Copy)]
pub struct LandmarkStyle {
    pub color: Color,
    pub fill_color: Color,
    pub line_width: u32,
}

impl Default for LandmarkStyle {
    fn default() -> Self {
        Self {
            color: STROKE_COLOR,
            fill_color: FILL_COLOR,
            line_width: 1,
        }
    }
}

/// How connections between landmarks are drawn.
#[derive(Debug, Clone, Copy)]
pub struct ConnectorStyle {
    pub color: Color,
    pub line_width: u32,
}

impl Default for ConnectorStyle {
    fn default() -> Self {
        Self {
            color: STROKE_COLOR,
            line_width: 3,
        }
    }
}

/// Draws landmark sets onto a [`Canvas`].
///
/// Landmark coordinates are normalized, so they are scaled by the canvas size.
pub struct DrawingUtils<'a> {
    canvas: &'a mut Canvas,
}

impl<'a> DrawingUtils<'a> {
    pub fn new(canvas: &'a mut Canvas) -> Self {
        Self { canvas }
    }

    /// Maps `value` from `[start, end]` onto `[from, to]`.
    ///
    /// `value` is clamped to the input interval first, so the result always lies between `from`
    /// and `to`.
    pub fn lerp(value: f32, start: f32, end: f32, from: f32, to: f32) -> f32 {
        let t = ((value - start) / (end - start)).clamp(0.0, 1.0);
        from + (to - from) * t
    }

    /// Landmark radius for a depth value.
    pub fn radius_for_depth(z: f32) -> f32 {
        Self::lerp(z, DEPTH_NEAR, DEPTH_FAR, RADIUS_NEAR, RADIUS_FAR)
    }

    /// Draws every landmark of `landmarks` as a filled circle sized by its depth.
    pub fn draw_landmarks(&mut self, landmarks: &Landmarks, style: &LandmarkStyle) {
        let (w, h) = (self.canvas.width() as f32, self.canvas.height() as f32);
        for lm in landmarks {
            draw::circle(
                self.canvas,
                lm.x() * w,
                lm.y() * h,
                Self::radius_for_depth(lm.z()),
            )
            .color(style.color)
            .fill(style.fill_color)
            .stroke_width(style.line_width);
        }
    }

    /// Draws a line for every connection whose endpoints both exist in `landmarks`.
    pub fn draw_connectors(
        &mut self,
        landmarks: &Landmarks,
        connections: &[Connection],
        style: &ConnectorStyle,
    ) {
        let (w, h) = (self.canvas.width() as f32, self.canvas.height() as f32);
        for conn in connections {
            let (Some(a), Some(b)) = (
                landmarks.get(conn.start as usize),
                landmarks.get(conn.end as usize),
            ) else {
                continue;
            };
            draw::line(self.canvas, a.x() * w, a.y() * h, b.x() * w, b.y() * h)
                .color(style.color)
                .stroke_width(style.line_width);
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::{
        landmark::Landmark,
        pose::{LandmarkIdx, POSE_CONNECTIONS},
    };

    use super::*;

    #[test]
    fn lerp_is_linear_and_clamped() {
        assert_relative_eq!(DrawingUtils::lerp(0.5, 0.0, 1.0, 10.0, 20.0), 15.0);
        assert_relative_eq!(DrawingUtils::lerp(-3.0, 0.0, 1.0, 10.0, 20.0), 10.0);
        assert_relative_eq!(DrawingUtils::lerp(3.0, 0.0, 1.0, 10.0, 20.0), 20.0);
    }

    #[test]
    fn radius_by_depth() {
        assert_relative_eq!(DrawingUtils::radius_for_depth(DEPTH_NEAR), RADIUS_NEAR);
        assert_relative_eq!(DrawingUtils::radius_for_depth(-1.0), RADIUS_NEAR);
        assert_relative_eq!(DrawingUtils::radius_for_depth(DEPTH_FAR), RADIUS_FAR);
        assert_relative_eq!(DrawingUtils::radius_for_depth(1.0), RADIUS_FAR);
        assert_relative_eq!(DrawingUtils::radius_for_depth(-0.025), 5.0, epsilon = 1e-5);
    }

    #[test]
    fn landmarks_are_scaled_to_canvas() {
        let mut canvas = Canvas::new(100, 50);
        let set: Landmarks = [Landmark::new([0.5, 0.5, 0.0])].into_iter().collect();
        DrawingUtils::new(&mut canvas).draw_landmarks(&set, &LandmarkStyle::default());
        assert_eq!(canvas.get(50, 25), FILL_COLOR);
        assert_eq!(canvas.get(0, 0), Color::NONE);
    }

    #[test]
    fn connectors_with_missing_landmarks_are_skipped() {
        let mut canvas = Canvas::new(64, 64);
        // Only the face is present; every other connection refers to missing landmarks.
        let set: Landmarks = (0..=LandmarkIdx::MouthRight as usize)
            .map(|i| Landmark::new([i as f32 / 16.0, 0.5, 0.0]))
            .collect();
        DrawingUtils::new(&mut canvas).draw_connectors(
            &set,
            POSE_CONNECTIONS,
            &ConnectorStyle::default(),
        );

        let mut empty = Canvas::new(64, 64);
        DrawingUtils::new(&mut empty).draw_connectors(
            &Landmarks::default(),
            POSE_CONNECTIONS,
            &ConnectorStyle::default(),
        );
        assert!(!canvas.is_blank());
        assert!(empty.is_blank());
    }
}
