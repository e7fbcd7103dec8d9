//! Scriptable stand-ins for the model and the camera.
//!
//! These implement [`PoseLandmarker`], [`MediaDevices`] and [`MediaStream`] without any hardware or
//! model file, and come with a cloneable handle that lets the owner steer them after they have been
//! moved into the application. Completions can be delivered immediately or held back until the
//! handle releases them, which makes asynchronous orderings reproducible.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread,
    time::Duration,
};

use anyhow::{anyhow, bail};
use image::Rgba;
use posecam_image::RgbaImage;

use crate::{
    media::{MediaConstraints, MediaDevices, MediaStream, StreamRequest},
    promise::{promise, Promise, PromiseHandle},
    session::{
        check_video_timestamp, Detection, PoseLandmarker, PoseLandmarkerResult, RunningMode,
    },
    video::Frame,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type DetectionPromise = Promise<anyhow::Result<PoseLandmarkerResult>>;

#[derive(Default)]
struct LandmarkerState {
    result: PoseLandmarkerResult,
    deferred: bool,
    fail_detections: bool,
    reject_submissions: bool,
    pending: Vec<DetectionPromise>,
    timestamps: Vec<f64>,
    mode_switches: usize,
}

impl LandmarkerState {
    fn outcome(&self) -> anyhow::Result<PoseLandmarkerResult> {
        if self.fail_detections {
            Err(anyhow!("inference failed"))
        } else {
            Ok(self.result.clone())
        }
    }
}

/// A [`PoseLandmarker`] that reports a configurable result for every frame.
pub struct FakeLandmarker {
    mode: RunningMode,
    last_timestamp_ms: Option<f64>,
    state: Arc<Mutex<LandmarkerState>>,
}

/// Controls a [`FakeLandmarker`] and observes the requests it received.
#[derive(Clone)]
pub struct FakeLandmarkerHandle {
    state: Arc<Mutex<LandmarkerState>>,
}

impl FakeLandmarker {
    /// Creates a landmarker in [`RunningMode::Video`] that detects nobody.
    pub fn new() -> (Self, FakeLandmarkerHandle) {
        let state = Arc::new(Mutex::new(LandmarkerState::default()));
        (
            Self {
                mode: RunningMode::Video,
                last_timestamp_ms: None,
                state: state.clone(),
            },
            FakeLandmarkerHandle { state },
        )
    }

    pub fn with_running_mode(self, mode: RunningMode) -> Self {
        Self { mode, ..self }
    }
}

impl PoseLandmarker for FakeLandmarker {
    fn running_mode(&self) -> RunningMode {
        self.mode
    }

    fn set_running_mode(&mut self, mode: RunningMode) -> anyhow::Result<()> {
        if mode != self.mode {
            lock(&self.state).mode_switches += 1;
            self.mode = mode;
            self.last_timestamp_ms = None;
        }
        Ok(())
    }

    fn detect(&mut self, _image: &RgbaImage) -> anyhow::Result<PoseLandmarkerResult> {
        if self.mode != RunningMode::Image {
            bail!("landmarker is not in image mode");
        }
        lock(&self.state).outcome()
    }

    fn detect_for_video(&mut self, _frame: &Frame, timestamp_ms: f64) -> anyhow::Result<Detection> {
        check_video_timestamp(self.mode, self.last_timestamp_ms, timestamp_ms)?;
        let mut state = lock(&self.state);
        if state.reject_submissions {
            bail!("landmarker rejected the frame");
        }
        state.timestamps.push(timestamp_ms);
        self.last_timestamp_ms = Some(timestamp_ms);

        let (promise, handle) = promise();
        if state.deferred {
            state.pending.push(promise);
        } else {
            promise.fulfill(state.outcome());
        }
        Ok(handle)
    }
}

impl FakeLandmarkerHandle {
    /// Sets the result reported for subsequent detections.
    pub fn set_result(&self, result: PoseLandmarkerResult) {
        lock(&self.state).result = result;
    }

    /// When enabled, detections stay pending until [`FakeLandmarkerHandle::resolve_pending`].
    pub fn set_deferred(&self, deferred: bool) {
        lock(&self.state).deferred = deferred;
    }

    /// Makes subsequent detections complete with an error.
    pub fn set_fail_detections(&self, fail: bool) {
        lock(&self.state).fail_detections = fail;
    }

    /// Makes subsequent submissions fail synchronously.
    pub fn set_reject_submissions(&self, reject: bool) {
        lock(&self.state).reject_submissions = reject;
    }

    /// Completes all held-back detections with the current result. Returns how many there were.
    pub fn resolve_pending(&self) -> usize {
        let mut state = lock(&self.state);
        let pending = std::mem::take(&mut state.pending);
        let count = pending.len();
        for promise in pending {
            promise.fulfill(state.outcome());
        }
        count
    }

    /// Drops all held-back detections without completing them.
    pub fn drop_pending(&self) -> usize {
        let pending = std::mem::take(&mut lock(&self.state).pending);
        pending.len()
    }

    /// Number of detections that are held back.
    pub fn pending(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Timestamps of all accepted submissions, in order.
    pub fn timestamps(&self) -> Vec<f64> {
        lock(&self.state).timestamps.clone()
    }

    /// Number of times the running mode was actually changed.
    pub fn mode_switches(&self) -> usize {
        lock(&self.state).mode_switches
    }
}

const FRAME_INTERVAL: Duration = Duration::from_millis(5);

/// A [`MediaStream`] producing solid gray frames at a fixed size.
pub struct FakeMediaStream {
    width: u32,
    height: u32,
    tracks: FakeTracks,
}

/// Observes whether a [`FakeMediaStream`] has been stopped.
#[derive(Clone, Default)]
pub struct FakeTracks {
    stopped: Arc<AtomicBool>,
}

impl FakeTracks {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl FakeMediaStream {
    pub fn new(width: u32, height: u32) -> (Self, FakeTracks) {
        let tracks = FakeTracks::default();
        (
            Self {
                width,
                height,
                tracks: tracks.clone(),
            },
            tracks,
        )
    }
}

impl MediaStream for FakeMediaStream {
    fn label(&self) -> &str {
        "fake camera"
    }

    fn read(&mut self) -> anyhow::Result<Option<RgbaImage>> {
        thread::sleep(FRAME_INTERVAL);
        if self.tracks.is_stopped() {
            return Ok(None);
        }
        Ok(Some(RgbaImage::from_pixel(
            self.width,
            self.height,
            Rgba([96, 96, 96, 255]),
        )))
    }

    fn stop(&mut self) {
        self.tracks.stopped.store(true, Ordering::Release);
    }
}

type StreamPromise = Promise<anyhow::Result<Box<dyn MediaStream>>>;

struct DevicesState {
    supported: bool,
    denied: bool,
    deferred: bool,
    frame_size: (u32, u32),
    pending: Vec<StreamPromise>,
    requests: Vec<MediaConstraints>,
    streams: Vec<FakeTracks>,
}

impl DevicesState {
    fn open(&mut self) -> anyhow::Result<Box<dyn MediaStream>> {
        if self.denied {
            bail!("NotAllowedError: permission denied");
        }
        let (width, height) = self.frame_size;
        let (stream, tracks) = FakeMediaStream::new(width, height);
        self.streams.push(tracks);
        Ok(Box::new(stream))
    }
}

/// [`MediaDevices`] handing out [`FakeMediaStream`]s.
pub struct FakeMediaDevices {
    state: Arc<Mutex<DevicesState>>,
}

/// Controls a [`FakeMediaDevices`] and observes the streams it handed out.
#[derive(Clone)]
pub struct FakeMediaDevicesHandle {
    state: Arc<Mutex<DevicesState>>,
}

impl FakeMediaDevices {
    /// Creates supported devices that grant every request immediately with 64x48 frames.
    pub fn new() -> (Self, FakeMediaDevicesHandle) {
        Self::with_support(true)
    }

    /// Creates devices on a platform without camera support.
    pub fn unsupported() -> (Self, FakeMediaDevicesHandle) {
        Self::with_support(false)
    }

    fn with_support(supported: bool) -> (Self, FakeMediaDevicesHandle) {
        let state = Arc::new(Mutex::new(DevicesState {
            supported,
            denied: false,
            deferred: false,
            frame_size: (64, 48),
            pending: Vec::new(),
            requests: Vec::new(),
            streams: Vec::new(),
        }));
        (
            Self {
                state: state.clone(),
            },
            FakeMediaDevicesHandle { state },
        )
    }
}

impl MediaDevices for FakeMediaDevices {
    fn is_supported(&self) -> bool {
        lock(&self.state).supported
    }

    fn get_user_media(&mut self, constraints: &MediaConstraints) -> StreamRequest {
        let mut state = lock(&self.state);
        state.requests.push(*constraints);
        if state.deferred {
            let (promise, handle) = promise();
            state.pending.push(promise);
            handle
        } else {
            PromiseHandle::ready(state.open())
        }
    }
}

impl FakeMediaDevicesHandle {
    /// Makes subsequent requests fail as if the user denied camera access.
    pub fn set_denied(&self, denied: bool) {
        lock(&self.state).denied = denied;
    }

    /// When enabled, requests stay pending until [`FakeMediaDevicesHandle::resolve_pending`].
    pub fn set_deferred(&self, deferred: bool) {
        lock(&self.state).deferred = deferred;
    }

    pub fn set_frame_size(&self, width: u32, height: u32) {
        lock(&self.state).frame_size = (width, height);
    }

    /// Resolves all pending requests. Returns how many there were.
    pub fn resolve_pending(&self) -> usize {
        let mut state = lock(&self.state);
        let pending = std::mem::take(&mut state.pending);
        let count = pending.len();
        for promise in pending {
            promise.fulfill(state.open());
        }
        count
    }

    /// Number of `get_user_media` calls so far.
    pub fn requests(&self) -> usize {
        lock(&self.state).requests.len()
    }

    /// Constraints of the most recent request.
    pub fn last_constraints(&self) -> Option<MediaConstraints> {
        lock(&self.state).requests.last().copied()
    }

    /// Number of streams handed out that have not been stopped.
    pub fn live_streams(&self) -> usize {
        lock(&self.state)
            .streams
            .iter()
            .filter(|tracks| !tracks.is_stopped())
            .count()
    }

    /// Number of streams handed out so far.
    pub fn opened_streams(&self) -> usize {
        lock(&self.state).streams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deferred_detection_resolves_on_demand() {
        let (mut landmarker, handle) = FakeLandmarker::new();
        handle.set_deferred(true);
        let frame = Frame::new(RgbaImage::new(2, 2), 0.0);
        let mut detection = landmarker.detect_for_video(&frame, 1.0).unwrap();
        assert!(detection.poll().is_none());
        assert_eq!(handle.resolve_pending(), 1);
        assert!(detection.poll().unwrap().unwrap().is_ok());
        assert_eq!(handle.timestamps(), vec![1.0]);
    }

    #[test]
    fn repeated_timestamp_is_rejected() {
        let (mut landmarker, handle) = FakeLandmarker::new();
        let frame = Frame::new(RgbaImage::new(2, 2), 0.0);
        landmarker.detect_for_video(&frame, 5.0).unwrap();
        assert!(landmarker.detect_for_video(&frame, 5.0).is_err());
        assert_eq!(handle.timestamps(), vec![5.0]);
    }

    #[test]
    fn denied_request() {
        let (mut devices, handle) = FakeMediaDevices::new();
        handle.set_denied(true);
        let request = devices.get_user_media(&MediaConstraints::default());
        assert!(request.block().unwrap().is_err());
        assert_eq!(handle.requests(), 1);
        assert_eq!(handle.opened_streams(), 0);
    }
}
