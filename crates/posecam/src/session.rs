//! The model session: a lazily loaded handle to a pose landmark model.
//!
//! All inference goes through the [`PoseLandmarker`] trait. The application creates exactly one
//! [`ModelSession`] at startup, which loads the model in the background. A failed load is final:
//! the session stays in the failed state and detection is never possible.

use std::{fmt, io, path::PathBuf, str::FromStr, thread};

use anyhow::bail;

use crate::{
    landmark::Landmarks,
    promise::{promise, PromiseHandle},
    video::Frame,
};

/// Operating mode of a [`PoseLandmarker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningMode {
    /// Independent still images, processed with [`PoseLandmarker::detect`].
    Image,
    /// Sequential frames of a video with monotonically increasing timestamps, processed with
    /// [`PoseLandmarker::detect_for_video`].
    Video,
}

/// The hardware backend a [`PoseLandmarker`] should prefer for inference.
///
/// This is a preference. Backends that cannot honor it fall back to the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delegate {
    Gpu,
    Cpu,
}

impl FromStr for Delegate {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gpu" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            _ => Err(()),
        }
    }
}

/// Options used to create a [`PoseLandmarker`].
#[derive(Debug, Clone, PartialEq)]
pub struct PoseLandmarkerOptions {
    /// Location of the model file.
    pub model_asset_path: PathBuf,
    pub delegate: Delegate,
    /// Initial running mode.
    pub running_mode: RunningMode,
    /// Maximum number of poses reported per frame.
    pub num_poses: usize,
}

impl PoseLandmarkerOptions {
    pub fn new(model_asset_path: impl Into<PathBuf>) -> Self {
        Self {
            model_asset_path: model_asset_path.into(),
            delegate: Delegate::Gpu,
            running_mode: RunningMode::Video,
            num_poses: 2,
        }
    }

    pub fn delegate(self, delegate: Delegate) -> Self {
        Self { delegate, ..self }
    }

    pub fn running_mode(self, running_mode: RunningMode) -> Self {
        Self {
            running_mode,
            ..self
        }
    }

    pub fn num_poses(self, num_poses: usize) -> Self {
        Self { num_poses, ..self }
    }
}

/// Landmarks detected in a single image or video frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseLandmarkerResult {
    /// One landmark set per detected person.
    pub landmarks: Vec<Landmarks>,
}

impl PoseLandmarkerResult {
    pub fn new(landmarks: Vec<Landmarks>) -> Self {
        Self { landmarks }
    }

    /// Limits the number of reported poses to `num_poses`.
    pub fn truncate(&mut self, num_poses: usize) {
        self.landmarks.truncate(num_poses);
    }
}

/// Pending result of [`PoseLandmarker::detect_for_video`].
///
/// Resolves exactly once. Inference errors are delivered through the inner [`anyhow::Result`].
pub type Detection = PromiseHandle<anyhow::Result<PoseLandmarkerResult>>;

/// A body pose landmark model.
pub trait PoseLandmarker: Send {
    /// Returns the current [`RunningMode`].
    fn running_mode(&self) -> RunningMode;

    /// Switches the running mode.
    fn set_running_mode(&mut self, mode: RunningMode) -> anyhow::Result<()>;

    /// Detects poses in a still image. Requires [`RunningMode::Image`].
    fn detect(&mut self, image: &posecam_image::RgbaImage) -> anyhow::Result<PoseLandmarkerResult>;

    /// Submits a video frame for detection. Requires [`RunningMode::Video`].
    ///
    /// `timestamp_ms` must increase with every call. The returned [`Detection`] resolves once the
    /// frame has been processed.
    fn detect_for_video(&mut self, frame: &Frame, timestamp_ms: f64) -> anyhow::Result<Detection>;
}

/// Validates that `timestamp_ms` is usable for video mode, given the previous timestamp.
///
/// Shared by [`PoseLandmarker`] implementations.
pub fn check_video_timestamp(
    mode: RunningMode,
    last_timestamp_ms: Option<f64>,
    timestamp_ms: f64,
) -> anyhow::Result<()> {
    if mode != RunningMode::Video {
        bail!("landmarker is not in video mode (current mode: {mode:?})");
    }
    if let Some(last) = last_timestamp_ms {
        if timestamp_ms <= last {
            bail!(
                "video timestamps must be monotonically increasing (got {timestamp_ms}ms after {last}ms)"
            );
        }
    }
    Ok(())
}

type LoadResult = anyhow::Result<Box<dyn PoseLandmarker>>;

enum State {
    Loading(PromiseHandle<LoadResult>),
    Ready(Box<dyn PoseLandmarker>),
    Failed,
}

/// Outcome of a model load, reported once by [`ModelSession::poll`].
#[derive(Debug)]
pub enum LoadEvent {
    Loaded,
    Failed(anyhow::Error),
}

/// The single, lazily initialized handle to the landmark model.
pub struct ModelSession {
    state: State,
}

impl ModelSession {
    /// Starts loading the model on a background thread.
    ///
    /// The result is picked up by [`ModelSession::poll`].
    pub fn load<F>(loader: F) -> io::Result<Self>
    where
        F: FnOnce() -> LoadResult + Send + 'static,
    {
        let (promise, handle) = promise();
        thread::Builder::new()
            .name("model loader".into())
            .spawn(move || promise.fulfill(loader()))?;
        Ok(Self {
            state: State::Loading(handle),
        })
    }

    #[cfg(test)]
    pub(crate) fn loading(handle: PromiseHandle<LoadResult>) -> Self {
        Self {
            state: State::Loading(handle),
        }
    }

    /// Creates a session around an already loaded model.
    pub fn ready(landmarker: Box<dyn PoseLandmarker>) -> Self {
        Self {
            state: State::Ready(landmarker),
        }
    }

    /// Creates a session whose model failed to load.
    pub fn failed() -> Self {
        Self {
            state: State::Failed,
        }
    }

    /// Checks on a pending load, returning the outcome the first time it is available.
    pub fn poll(&mut self) -> Option<LoadEvent> {
        let State::Loading(handle) = &mut self.state else {
            return None;
        };
        let result = handle.poll()?;
        let (state, event) = match result {
            Ok(Ok(landmarker)) => (State::Ready(landmarker), LoadEvent::Loaded),
            Ok(Err(e)) => (State::Failed, LoadEvent::Failed(e)),
            Err(dropped) => (State::Failed, LoadEvent::Failed(dropped.into())),
        };
        self.state = state;
        Some(event)
    }

    /// Returns whether the model has been loaded successfully.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, State::Failed)
    }

    /// Returns the loaded model, if any.
    pub fn landmarker(&mut self) -> Option<&mut (dyn PoseLandmarker + 'static)> {
        match &mut self.state {
            State::Ready(landmarker) => Some(&mut **landmarker),
            _ => None,
        }
    }

    /// Makes sure the model is in [`RunningMode::Video`], switching it if necessary.
    ///
    /// Does nothing if the model is not loaded.
    pub fn ensure_video_mode(&mut self) -> anyhow::Result<()> {
        if let Some(landmarker) = self.landmarker() {
            if landmarker.running_mode() != RunningMode::Video {
                log::debug!("switching landmarker to video mode");
                landmarker.set_running_mode(RunningMode::Video)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ModelSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Loading(_) => "loading",
            State::Ready(_) => "ready",
            State::Failed => "failed",
        };
        f.debug_struct("ModelSession").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use anyhow::anyhow;

    use crate::fake::FakeLandmarker;

    use super::*;

    fn poll_until_done(session: &mut ModelSession) -> LoadEvent {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(event) = session.poll() {
                return event;
            }
            assert!(Instant::now() < deadline, "model load did not finish");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn load_success() {
        let mut session = ModelSession::load(|| {
            Ok(Box::new(FakeLandmarker::new().0) as Box<dyn PoseLandmarker>)
        })
        .unwrap();
        assert!(matches!(poll_until_done(&mut session), LoadEvent::Loaded));
        assert!(session.is_ready());
        assert!(session.poll().is_none());
    }

    #[test]
    fn load_failure_is_permanent() {
        let mut session = ModelSession::load(|| Err(anyhow!("404 Not Found"))).unwrap();
        assert!(matches!(poll_until_done(&mut session), LoadEvent::Failed(_)));
        assert!(session.is_failed());
        assert!(!session.is_ready());
        assert!(session.landmarker().is_none());
        assert!(session.poll().is_none());
        session.ensure_video_mode().unwrap();
    }

    #[test]
    fn panicking_loader_counts_as_failure() {
        let mut session = ModelSession::load(|| panic!("loader panicked")).unwrap();
        assert!(matches!(poll_until_done(&mut session), LoadEvent::Failed(_)));
    }

    #[test]
    fn switches_to_video_mode_once() {
        let (landmarker, handle) = FakeLandmarker::new();
        let mut session = ModelSession::ready(Box::new(
            landmarker.with_running_mode(RunningMode::Image),
        ));
        session.ensure_video_mode().unwrap();
        session.ensure_video_mode().unwrap();
        assert_eq!(
            session.landmarker().unwrap().running_mode(),
            RunningMode::Video
        );
        assert_eq!(handle.mode_switches(), 1);
    }

    #[test]
    fn timestamps_must_increase() {
        check_video_timestamp(RunningMode::Video, None, 0.0).unwrap();
        check_video_timestamp(RunningMode::Video, Some(10.0), 11.0).unwrap();
        assert!(check_video_timestamp(RunningMode::Video, Some(10.0), 10.0).is_err());
        assert!(check_video_timestamp(RunningMode::Image, None, 1.0).is_err());
    }

    #[test]
    fn delegate_parsing() {
        assert_eq!("GPU".parse(), Ok(Delegate::Gpu));
        assert_eq!(" cpu ".parse(), Ok(Delegate::Cpu));
        assert_eq!("npu".parse::<Delegate>(), Err(()));
    }
}
