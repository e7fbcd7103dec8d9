//! The video element: plays back an attached [`MediaStream`].
//!
//! Attaching a stream spawns a capture thread that continuously reads frames from it and
//! publishes the most recent one. Consumers sample the latest frame and its playback time, like a
//! `<video>` element's `currentTime`, and are expected to skip work when the time has not advanced.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use posecam_image::RgbaImage;

use crate::media::MediaStream;

/// Number of consecutive read errors after which the capture thread gives up on a stream.
const MAX_CONSECUTIVE_ERRORS: u32 = 30;

/// A decoded video frame together with its playback time.
#[derive(Clone)]
pub struct Frame {
    image: Arc<RgbaImage>,
    time: f64,
}

impl Frame {
    pub fn new(image: RgbaImage, time: f64) -> Self {
        Self {
            image: Arc::new(image),
            time,
        }
    }

    #[inline]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Playback time of the frame in seconds, relative to when the stream was attached.
    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("time", &self.time)
            .finish()
    }
}

#[derive(Default)]
struct Shared {
    latest: Mutex<Option<Frame>>,
}

impl Shared {
    fn latest(&self) -> MutexGuard<'_, Option<Frame>> {
        // A panicking capture thread cannot leave the slot in an inconsistent state.
        self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct Capture {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    label: String,
}

/// Plays back a [`MediaStream`] and exposes its most recent frame.
#[derive(Default)]
pub struct Video {
    shared: Arc<Shared>,
    capture: Option<Capture>,
}

impl Video {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a stream (`Some`) or detaches the current one (`None`).
    ///
    /// Detaching stops all of the stream's tracks and resets the element to its empty state. Any
    /// previously attached stream is detached first.
    pub fn set_src_object(&mut self, stream: Option<Box<dyn MediaStream>>) -> anyhow::Result<()> {
        self.detach();

        let Some(stream) = stream else {
            return Ok(());
        };

        let label = stream.label().to_string();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = thread::Builder::new().name("video capture".into()).spawn({
            let shared = self.shared.clone();
            let stop = stop.clone();
            move || capture(stream, &shared, &stop)
        })?;
        log::debug!("attached stream '{label}'");

        self.capture = Some(Capture {
            stop,
            handle: Some(handle),
            label,
        });
        Ok(())
    }

    fn detach(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop.store(true, Ordering::Release);
            // The capture thread notices the flag after its current read and stops the stream
            // itself. Only join it if it already exited, so that a stalled camera can't block the
            // caller.
            if let Some(handle) = capture.handle.take() {
                if handle.is_finished() {
                    handle.join().ok();
                }
            }
            log::debug!("detached stream '{}'", capture.label);
        }
        // A new `Shared` makes sure that a capture thread that is still finishing up can't
        // publish frames into the next playback.
        self.shared = Arc::default();
    }

    /// Returns whether a stream is attached.
    pub fn has_src_object(&self) -> bool {
        self.capture.is_some()
    }

    /// Returns whether at least one frame has been received since the stream was attached.
    pub fn has_current_data(&self) -> bool {
        self.shared.latest().is_some()
    }

    /// Returns the playback time of the most recent frame in seconds, or `0.0` if there is none.
    pub fn current_time(&self) -> f64 {
        self.shared.latest().as_ref().map_or(0.0, Frame::time)
    }

    /// Returns the width of the most recent frame, or 0 if there is none.
    pub fn video_width(&self) -> u32 {
        self.shared.latest().as_ref().map_or(0, Frame::width)
    }

    /// Returns the height of the most recent frame, or 0 if there is none.
    pub fn video_height(&self) -> u32 {
        self.shared.latest().as_ref().map_or(0, Frame::height)
    }

    /// Returns the most recent frame.
    pub fn current_frame(&self) -> Option<Frame> {
        self.shared.latest().clone()
    }

    /// Publishes a frame as the current one, as if it had been read from the attached stream.
    ///
    /// This is what the capture thread does for every frame; it is public for driving a
    /// [`Video`] without a camera.
    pub fn present(&self, frame: Frame) {
        *self.shared.latest() = Some(frame);
    }
}

impl Drop for Video {
    fn drop(&mut self) {
        self.detach();
    }
}

fn capture(mut stream: Box<dyn MediaStream>, shared: &Shared, stop: &AtomicBool) {
    let start = Instant::now();
    let mut last_time = -1.0;
    let mut errors = 0;
    while !stop.load(Ordering::Acquire) {
        match stream.read() {
            Ok(Some(image)) => {
                errors = 0;
                // Playback time must strictly increase, otherwise consumers would skip the frame.
                let mut time = start.elapsed().as_secs_f64();
                if time <= last_time {
                    time = last_time + 1e-6;
                }
                last_time = time;
                let frame = Frame::new(image, time);
                if stop.load(Ordering::Acquire) {
                    break;
                }
                *shared.latest() = Some(frame);
            }
            Ok(None) => {}
            Err(e) => {
                errors += 1;
                log::error!("failed to read from stream '{}': {e:#}", stream.label());
                if errors >= MAX_CONSECUTIVE_ERRORS {
                    log::error!(
                        "giving up on stream '{}' after {errors} consecutive errors",
                        stream.label()
                    );
                    break;
                }
            }
        }
    }
    stream.stop();
    log::debug!("stopped stream '{}'", stream.label());
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::fake::FakeMediaStream;

    use super::*;

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn empty_element() {
        let video = Video::new();
        assert!(!video.has_src_object());
        assert!(!video.has_current_data());
        assert_eq!(video.current_time(), 0.0);
        assert_eq!((video.video_width(), video.video_height()), (0, 0));
        assert!(video.current_frame().is_none());
    }

    #[test]
    fn present_updates_current_frame() {
        let video = Video::new();
        video.present(Frame::new(RgbaImage::new(4, 3), 0.5));
        assert!(video.has_current_data());
        assert_eq!(video.current_time(), 0.5);
        assert_eq!((video.video_width(), video.video_height()), (4, 3));
    }

    #[test]
    fn attached_stream_advances_and_detach_stops_tracks() {
        let (stream, tracks) = FakeMediaStream::new(8, 6);
        let mut video = Video::new();
        video.set_src_object(Some(Box::new(stream))).unwrap();
        assert!(video.has_src_object());

        wait_until(|| video.has_current_data());
        let first = video.current_time();
        wait_until(|| video.current_time() > first);
        assert_eq!((video.video_width(), video.video_height()), (8, 6));

        video.set_src_object(None).unwrap();
        assert!(!video.has_src_object());
        assert!(!video.has_current_data());
        wait_until(|| tracks.is_stopped());
    }
}
