//! Webcam body pose overlay.
//!
//! `posecam` captures frames from a webcam, forwards them to a body pose landmark model, and draws
//! the returned skeletons on a transparent overlay on top of the live video. A small status panel
//! (in Spanish) shows the number of detected poses and the average landmark confidence.
//!
//! # Architecture
//!
//! The model is only ever accessed through the [`session::PoseLandmarker`] trait, and the camera
//! only through [`media::MediaDevices`]. [`app::App`] owns all mutable state and wires the
//! [`camera::CameraController`], the [`frame_loop::FrameLoop`] and the UI model ([`ui::Dom`])
//! together. [`gui`] presents the result in a window.
//!
//! # Coordinates
//!
//! Landmark X and Y coordinates are normalized to the input frame: `(0, 0)` is the top left corner
//! and `(1, 1)` the bottom right corner. Z is the depth relative to the hips, on roughly the same
//! scale as X. Smaller values are closer to the camera.
//!
//! # Environment Variables
//!
//! See [`config::Config`] for the environment variables that configure the application.

pub mod app;
pub mod camera;
pub mod config;
#[cfg(any(test, feature = "fake"))]
pub mod fake;
pub mod frame_loop;
pub mod gui;
pub mod landmark;
pub mod media;
pub mod nn;
pub mod pose;
pub mod promise;
pub mod render;
pub mod session;
pub mod stats;
pub mod timer;
pub mod ui;
pub mod video;
pub mod webcam;

use log::LevelFilter;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .filter(Some("tract_onnx"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and posecam will log at *trace* level.
/// Otherwise, they will log at *debug* level.
///
/// `tract_onnx` will always log at *warn* level. `RUST_LOG` can override all of these.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
