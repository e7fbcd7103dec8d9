//! V4L2 webcam access.
//!
//! Only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are supported.

use std::{cmp::Ordering, thread, time::Duration};

use anyhow::bail;
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use image::ImageFormat;
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};
use posecam_image::RgbaImage;

use crate::{
    media::{MediaConstraints, MediaDevices, MediaStream, StreamRequest},
    promise::{promise, Promise, PromiseHandle},
    timer::{FpsCounter, Timer},
};

/// A frame size and rate a device offers.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameFormat {
    width: u32,
    height: u32,
    fps: f32,
}

impl FrameFormat {
    fn num_pixels(&self) -> u32 {
        self.width * self.height
    }

    fn covers(&self, constraints: &MediaConstraints) -> bool {
        self.width >= constraints.ideal_width && self.height >= constraints.ideal_height
    }
}

/// Picks the format closest to the ideal resolution.
///
/// That is the smallest format at least as large as the ideal resolution or, if the device can't
/// deliver that, the largest one. Ties are broken by frame rate. Returns the index into `formats`.
fn pick_format(formats: &[FrameFormat], constraints: &MediaConstraints) -> Option<usize> {
    let by_fps = |a: &FrameFormat, b: &FrameFormat| {
        a.fps.partial_cmp(&b.fps).unwrap_or(Ordering::Equal)
    };

    let covering = formats
        .iter()
        .enumerate()
        .filter(|(_, fmt)| fmt.covers(constraints))
        .max_by(|(_, a), (_, b)| b.num_pixels().cmp(&a.num_pixels()).then(by_fps(a, b)));
    if let Some((i, _)) = covering {
        return Some(i);
    }

    formats
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.num_pixels().cmp(&b.num_pixels()).then(by_fps(a, b)))
        .map(|(i, _)| i)
}

fn negotiate_format(
    device: &Device,
    constraints: &MediaConstraints,
) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?.pixel_format();
        if format == PixelFormat::JPEG || format == PixelFormat::MJPG {
            pixel_format = Some(format);
            break;
        }
    }

    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found");
    };

    let mut formats = Vec::new();
    let mut intervals = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let rates = match device.frame_intervals(pixel_format, size.width(), size.height())?
                {
                    FrameIntervals::Discrete(rates) => rates,
                    FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                        bail!("stepwise or continuous frame rates are not supported")
                    }
                };
                for rate in rates {
                    let interval = *rate.fract();
                    formats.push(FrameFormat {
                        width: size.width(),
                        height: size.height(),
                        fps: 1.0 / interval.as_f32(),
                    });
                    intervals.push(interval);
                }
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }

    let Some(i) = pick_format(&formats, constraints) else {
        bail!("failed to negotiate a webcam format");
    };
    let fmt = formats[i];
    log::debug!(
        "negotiated {}x{} @ {:.1}Hz (ideal {}x{})",
        fmt.width,
        fmt.height,
        fmt.fps,
        constraints.ideal_width,
        constraints.ideal_height,
    );
    Ok((
        PixFormat::new(fmt.width, fmt.height, pixel_format),
        intervals[i],
    ))
}

/// An opened webcam.
///
/// The device stays on the thread that opened it. [`WebcamDevices`] runs that thread and forwards
/// the frames to a [`WebcamStream`].
pub struct Webcam {
    label: String,
    stream: ReadStream,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the first supported webcam found, or the one named `name`.
    ///
    /// This function can block for a significant amount of time while the webcam initializes (on
    /// the order of hundreds of milliseconds).
    pub fn open(name: Option<&str>, constraints: &MediaConstraints) -> anyhow::Result<Self> {
        for res in linuxvideo::list()? {
            match res {
                Ok(dev) => match Self::open_impl(dev, name, constraints) {
                    Ok(Some(webcam)) => return Ok(webcam),
                    Ok(None) => {}
                    Err(e) => {
                        log::debug!("{e}");
                    }
                },
                Err(e) => {
                    log::warn!("{e}");
                }
            }
        }

        match name {
            Some(name) => bail!("no supported webcam named '{name}' found"),
            None => bail!("no supported webcam device found"),
        }
    }

    fn open_impl(
        dev: Device,
        name: Option<&str>,
        constraints: &MediaConstraints,
    ) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        if let Some(name) = name {
            if caps.card() != name {
                return Ok(None);
            }
        }

        let cap_flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        );

        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixfmt, fract) = negotiate_format(&dev, constraints)?;
        let capture = dev.video_capture(pixfmt)?;
        let format = capture.format();
        let actual = capture.set_frame_interval(fract)?;

        log::info!(
            "opened {} ({}), {}x{} @ {:.1}Hz",
            caps.card(),
            path.display(),
            format.width(),
            format.height(),
            1.0 / actual.as_f32(),
        );

        let stream = capture.into_stream()?;

        Ok(Some(Self {
            label: caps.card().to_string(),
            stream,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Reads and decodes the next frame.
    ///
    /// If no frame is available, this method will block until one is.
    pub fn read(&mut self) -> anyhow::Result<RgbaImage> {
        let t_decode = &self.t_decode;
        let dequeue_guard = self.t_dequeue.start();
        let decoded = self.stream.dequeue(|buf| {
            drop(dequeue_guard);
            // Webcams occasionally produce corrupted MJPG frames, so decode errors are reported
            // per frame instead of failing the dequeue.
            Ok(t_decode.time(|| image::load_from_memory_with_format(&buf, ImageFormat::Jpeg)))
        })?;
        Ok(decoded?.into_rgba8())
    }

    /// Returns profiling timers for webcam access and decoding.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_dequeue, &self.t_decode].into_iter()
    }
}

/// How long [`WebcamStream::read`] waits for a frame before reporting that none is available.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// The [`MediaStream`] of a webcam that is running on its own thread.
pub struct WebcamStream {
    label: String,
    frames: Option<Receiver<anyhow::Result<RgbaImage>>>,
}

impl MediaStream for WebcamStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn read(&mut self) -> anyhow::Result<Option<RgbaImage>> {
        let Some(frames) = &self.frames else {
            return Ok(None);
        };
        match frames.recv_timeout(READ_TIMEOUT) {
            Ok(frame) => frame.map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                bail!("webcam '{}' stopped delivering frames", self.label)
            }
        }
    }

    fn stop(&mut self) {
        // The webcam thread exits, closing the device, once it notices that nobody is listening.
        self.frames = None;
    }
}

fn run_webcam(
    name: Option<String>,
    constraints: MediaConstraints,
    promise: Promise<anyhow::Result<Box<dyn MediaStream>>>,
) {
    let mut webcam = match Webcam::open(name.as_deref(), &constraints) {
        Ok(webcam) => webcam,
        Err(e) => return promise.fulfill(Err(e)),
    };

    let (sender, recv) = channel::bounded(1);
    promise.fulfill(Ok(Box::new(WebcamStream {
        label: webcam.label().to_string(),
        frames: Some(recv),
    })));

    let mut fps = FpsCounter::new("webcam");
    loop {
        let frame = webcam.read();
        if sender.send(frame).is_err() {
            break;
        }
        fps.tick_with(webcam.timers());
    }
    log::debug!("closed webcam '{}'", webcam.label());
}

/// [`MediaDevices`] backed by V4L2 webcams.
pub struct WebcamDevices {
    name: Option<String>,
}

impl WebcamDevices {
    /// `name` selects a specific device by its card name; otherwise the first supported one is
    /// used.
    pub fn new(name: Option<String>) -> Self {
        Self { name }
    }
}

impl MediaDevices for WebcamDevices {
    fn is_supported(&self) -> bool {
        match linuxvideo::list() {
            Ok(mut devices) => devices.next().is_some(),
            Err(e) => {
                log::warn!("failed to enumerate video devices: {e}");
                false
            }
        }
    }

    fn get_user_media(&mut self, constraints: &MediaConstraints) -> StreamRequest {
        let (promise, handle) = promise();
        let name = self.name.clone();
        let constraints = *constraints;
        let spawned = thread::Builder::new()
            .name("webcam".into())
            .spawn(move || run_webcam(name, constraints, promise));
        match spawned {
            Ok(_) => handle,
            Err(e) => PromiseHandle::ready(Err(e.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(width: u32, height: u32, fps: f32) -> FrameFormat {
        FrameFormat { width, height, fps }
    }

    #[test]
    fn picks_smallest_covering_format() {
        let formats = [
            fmt(640, 480, 30.0),
            fmt(1920, 1080, 30.0),
            fmt(1280, 720, 15.0),
            fmt(1280, 720, 30.0),
        ];
        let ideal = MediaConstraints::ideal(1280, 720);
        assert_eq!(pick_format(&formats, &ideal), Some(3));
    }

    #[test]
    fn falls_back_to_largest_format() {
        let formats = [fmt(320, 240, 30.0), fmt(640, 480, 30.0), fmt(640, 480, 60.0)];
        let ideal = MediaConstraints::ideal(1280, 720);
        assert_eq!(pick_format(&formats, &ideal), Some(2));
        assert_eq!(pick_format(&[], &ideal), None);
    }
}
