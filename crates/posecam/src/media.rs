//! Platform media boundary.
//!
//! A [`MediaDevices`] implementation hands out [`MediaStream`]s, which are then played back by a
//! [`Video`][crate::video::Video] element. The real implementation lives in
//! [`webcam`][crate::webcam].

use posecam_image::RgbaImage;

use crate::promise::PromiseHandle;

/// Constraints for [`MediaDevices::get_user_media`].
///
/// The requested resolution is a preference. The device may deliver frames of any other size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl MediaConstraints {
    pub fn ideal(width: u32, height: u32) -> Self {
        Self {
            ideal_width: width,
            ideal_height: height,
        }
    }
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self::ideal(1280, 720)
    }
}

/// A live video stream, such as an opened webcam.
pub trait MediaStream: Send + 'static {
    /// Human-readable name of the source.
    fn label(&self) -> &str;

    /// Reads the next frame.
    ///
    /// This may block until a frame is available. `Ok(None)` means that no frame was available yet
    /// and the caller should try again.
    fn read(&mut self) -> anyhow::Result<Option<RgbaImage>>;

    /// Stops all tracks of the stream, releasing the device.
    ///
    /// Reading from a stopped stream yields no more frames.
    fn stop(&mut self);
}

/// Pending result of [`MediaDevices::get_user_media`].
pub type StreamRequest = PromiseHandle<anyhow::Result<Box<dyn MediaStream>>>;

/// Access to the camera devices of the platform.
pub trait MediaDevices {
    /// Returns whether the platform can provide camera streams at all.
    fn is_supported(&self) -> bool;

    /// Requests a camera stream.
    ///
    /// Opening a camera can take a while, so this returns immediately and resolves the request
    /// once the stream is available or access has failed.
    fn get_user_media(&mut self, constraints: &MediaConstraints) -> StreamRequest;
}
