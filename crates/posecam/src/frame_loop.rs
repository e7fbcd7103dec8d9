//! The per-frame detection loop.
//!
//! While active, the loop is ticked once per displayed frame. Every tick forwards the current video
//! frame to the model (unless the video has not advanced or a detection is still in flight) and
//! renders the most recent detection result onto the overlay canvas.

use std::time::Instant;

use posecam_image::Canvas;

use crate::{
    pose::POSE_CONNECTIONS,
    render::{ConnectorStyle, DrawingUtils, LandmarkStyle},
    session::{Detection, ModelSession, PoseLandmarkerResult},
    stats::{detection_status, update_stats, update_status, DetectionStats},
    timer::{FpsCounter, Timer},
    ui::Dom,
    video::Video,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Active,
}

/// What the scheduler should do after a [`FrameLoop::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Tick again on the next frame.
    Next,
    /// The loop has stopped itself.
    Stop,
}

/// Everything a tick reads or writes besides the loop's own state.
pub struct FrameContext<'a> {
    /// Whether the camera is (still) supposed to be running.
    pub running: bool,
    pub video: &'a Video,
    pub session: &'a mut ModelSession,
    pub canvas: &'a mut Canvas,
    pub stats: &'a mut DetectionStats,
    pub dom: &'a mut Dom,
}

pub struct FrameLoop {
    state: LoopState,
    last_video_time: f64,
    last_timestamp_ms: f64,
    in_flight: Option<Detection>,
    epoch: Instant,
    landmark_style: LandmarkStyle,
    connector_style: ConnectorStyle,
    fps: FpsCounter,
    t_submit: Timer,
    t_render: Timer,
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameLoop {
    pub fn new() -> Self {
        Self {
            state: LoopState::Idle,
            last_video_time: -1.0,
            last_timestamp_ms: f64::NEG_INFINITY,
            in_flight: None,
            epoch: Instant::now(),
            landmark_style: LandmarkStyle::default(),
            connector_style: ConnectorStyle::default(),
            fps: FpsCounter::new("frame loop"),
            t_submit: Timer::new("submit"),
            t_render: Timer::new("render"),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == LoopState::Active
    }

    /// Returns whether a detection has been submitted and not yet completed.
    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn start(&mut self) {
        if self.state == LoopState::Idle {
            log::debug!("frame loop started");
            self.state = LoopState::Active;
        }
    }

    /// Stops the loop. A detection that is still in flight is abandoned.
    pub fn stop(&mut self) {
        if self.state == LoopState::Active {
            log::debug!("frame loop stopped");
        }
        self.state = LoopState::Idle;
        self.in_flight = None;
    }

    /// Runs one iteration of the loop.
    pub fn tick(&mut self, cx: &mut FrameContext<'_>) -> Schedule {
        if self.state == LoopState::Idle {
            return Schedule::Stop;
        }

        // Resizing discards the overlay, so it has to happen before a result is drawn.
        let (width, height) = (cx.video.video_width(), cx.video.video_height());
        if width > 0 && height > 0 && (cx.canvas.width(), cx.canvas.height()) != (width, height) {
            log::debug!("resizing overlay to {width}x{height}");
            cx.canvas.resize(width, height);
        }

        self.drain(cx);

        if let Err(e) = cx.session.ensure_video_mode() {
            log::error!("failed to switch to video mode: {e:#}");
        }

        if self.in_flight.is_none() {
            self.submit(cx);
        }

        self.fps.tick_with([&self.t_submit, &self.t_render]);

        if cx.running {
            Schedule::Next
        } else {
            self.stop();
            Schedule::Stop
        }
    }

    fn submit(&mut self, cx: &mut FrameContext<'_>) {
        let Some(frame) = cx.video.current_frame() else {
            return;
        };
        if frame.time() == self.last_video_time {
            return;
        }
        let Some(landmarker) = cx.session.landmarker() else {
            return;
        };
        self.last_video_time = frame.time();

        // The landmarker rejects timestamps that don't increase.
        let now_ms = self.epoch.elapsed().as_secs_f64() * 1000.0;
        let timestamp_ms = if now_ms > self.last_timestamp_ms {
            now_ms
        } else {
            self.last_timestamp_ms + 0.001
        };
        self.last_timestamp_ms = timestamp_ms;

        let result = self
            .t_submit
            .time(|| landmarker.detect_for_video(&frame, timestamp_ms));
        match result {
            Ok(detection) => {
                self.in_flight = Some(detection);
                // Synchronous backends have already completed.
                self.drain(cx);
            }
            Err(e) => log::error!("detection failed: {e:#}"),
        }
    }

    fn drain(&mut self, cx: &mut FrameContext<'_>) {
        let Some(detection) = &mut self.in_flight else {
            return;
        };
        let Some(outcome) = detection.poll() else {
            return;
        };
        self.in_flight = None;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                log::error!("detection failed: {e:#}");
                return;
            }
            Err(e) => {
                log::error!("detection failed: {e}");
                return;
            }
        };

        if !cx.running {
            log::trace!("discarding detection result that arrived after stop");
            return;
        }
        self.present(result, cx);
    }

    fn present(&self, result: PoseLandmarkerResult, cx: &mut FrameContext<'_>) {
        let _guard = self.t_render.start();

        cx.canvas.clear();
        cx.stats.pose_count = result.landmarks.len();
        if result.landmarks.is_empty() {
            cx.stats.confidence = 0.0;
        }

        let mut utils = DrawingUtils::new(cx.canvas);
        for landmarks in &result.landmarks {
            cx.stats.confidence = landmarks.average_visibility();
            utils.draw_landmarks(landmarks, &self.landmark_style);
            utils.draw_connectors(landmarks, POSE_CONNECTIONS, &self.connector_style);
        }

        update_stats(cx.stats, cx.dom);
        let status = detection_status(cx.stats.pose_count);
        update_status(cx.stats, cx.dom, status);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use posecam_image::{Color, RgbaImage};

    use crate::{
        fake::{FakeLandmarker, FakeLandmarkerHandle},
        landmark::{Landmark, Landmarks},
        pose::NUM_LANDMARKS,
        session::RunningMode,
        stats::STATUS_WAITING_FOR_PERSON,
        video::Frame,
    };

    use super::*;

    struct Harness {
        frame_loop: FrameLoop,
        running: bool,
        video: Video,
        session: ModelSession,
        canvas: Canvas,
        stats: DetectionStats,
        dom: Dom,
        model: FakeLandmarkerHandle,
    }

    impl Harness {
        fn new() -> Self {
            let (landmarker, model) = FakeLandmarker::new();
            let mut frame_loop = FrameLoop::new();
            frame_loop.start();
            Self {
                frame_loop,
                running: true,
                video: Video::new(),
                session: ModelSession::ready(Box::new(landmarker)),
                canvas: Canvas::new(0, 0),
                stats: DetectionStats::new(),
                dom: Dom::new(),
                model,
            }
        }

        fn tick(&mut self) -> Schedule {
            self.frame_loop.tick(&mut FrameContext {
                running: self.running,
                video: &self.video,
                session: &mut self.session,
                canvas: &mut self.canvas,
                stats: &mut self.stats,
                dom: &mut self.dom,
            })
        }

        fn show_frame(&self, time: f64) {
            self.show_sized_frame(time, 32, 24);
        }

        fn show_sized_frame(&self, time: f64, width: u32, height: u32) {
            self.video.present(Frame::new(RgbaImage::new(width, height), time));
        }
    }

    /// A standing person: every landmark at horizontal position `x`, spread out vertically.
    fn person(x: f32, visibility: f32) -> Landmarks {
        (0..NUM_LANDMARKS)
            .map(|i| Landmark::new([x, 0.1 + i as f32 * 0.02, 0.0]).with_visibility(visibility))
            .collect()
    }

    #[test]
    fn one_submission_per_video_time() {
        let mut h = Harness::new();
        h.tick();
        assert!(h.model.timestamps().is_empty(), "no frame yet");

        h.show_frame(0.1);
        h.tick();
        h.tick();
        h.tick();
        assert_eq!(h.model.timestamps().len(), 1);

        h.show_frame(0.2);
        h.tick();
        let timestamps = h.model.timestamps();
        assert_eq!(timestamps.len(), 2);
        assert!(timestamps[1] > timestamps[0]);
    }

    #[test]
    fn waits_for_in_flight_detection() {
        let mut h = Harness::new();
        h.model.set_deferred(true);
        h.show_frame(0.1);
        h.tick();
        h.show_frame(0.2);
        h.tick();
        assert_eq!(h.model.timestamps().len(), 1);
        assert!(h.frame_loop.has_in_flight());

        h.model.resolve_pending();
        h.tick();
        assert_eq!(h.model.timestamps().len(), 2);
    }

    #[test]
    fn renders_result_and_updates_stats() {
        let mut h = Harness::new();
        h.model.set_result(PoseLandmarkerResult::new(vec![
            person(0.25, 0.9),
            person(0.75, 0.5),
        ]));
        h.show_frame(0.1);
        assert_eq!(h.tick(), Schedule::Next);

        assert_eq!((h.canvas.width(), h.canvas.height()), (32, 24));
        // Both skeletons are drawn, each at its own position.
        assert_ne!(h.canvas.get(8, 12), Color::NONE);
        assert_ne!(h.canvas.get(24, 12), Color::NONE);
        assert_eq!(h.canvas.get(16, 12), Color::NONE);
        assert_eq!(h.stats.pose_count, 2);
        // Confidence comes from the last set.
        assert_relative_eq!(h.stats.confidence, 0.5);
        assert_eq!(h.dom.pose_count, "2");
        assert_eq!(h.dom.confidence, "50.0%");
        assert_eq!(h.dom.status, "✅ Detectando 2 pose(s)");
    }

    #[test]
    fn empty_result_resets_confidence() {
        let mut h = Harness::new();
        h.model.set_result(PoseLandmarkerResult::new(vec![person(0.5, 0.8)]));
        h.show_frame(0.1);
        h.tick();
        assert!(!h.canvas.is_blank());

        h.model.set_result(PoseLandmarkerResult::default());
        h.show_frame(0.2);
        h.tick();
        assert!(h.canvas.is_blank());
        assert_eq!(h.stats.pose_count, 0);
        assert_eq!(h.dom.confidence, "-");
        assert_eq!(h.dom.status, STATUS_WAITING_FOR_PERSON);
    }

    #[test]
    fn result_is_drawn_at_new_frame_size() {
        let mut h = Harness::new();
        h.model.set_deferred(true);
        h.model.set_result(PoseLandmarkerResult::new(vec![person(0.5, 0.8)]));
        h.show_frame(0.1);
        h.tick();
        assert_eq!((h.canvas.width(), h.canvas.height()), (32, 24));

        h.show_sized_frame(0.2, 64, 48);
        h.model.resolve_pending();
        h.tick();

        assert_eq!((h.canvas.width(), h.canvas.height()), (64, 48));
        assert!(!h.canvas.is_blank());
        assert_ne!(h.canvas.get(32, 24), Color::NONE);
        assert_eq!(h.stats.pose_count, 1);
    }

    #[test]
    fn late_completion_is_discarded() {
        let mut h = Harness::new();
        h.model.set_deferred(true);
        h.model.set_result(PoseLandmarkerResult::new(vec![person(0.5, 0.8)]));
        h.show_frame(0.1);
        h.tick();

        h.running = false;
        h.model.resolve_pending();
        assert_eq!(h.tick(), Schedule::Stop);
        assert_eq!(h.frame_loop.state(), LoopState::Idle);
        assert_eq!(h.stats, DetectionStats::new());
        assert_eq!(h.dom.pose_count, "0");
        assert!(h.canvas.is_blank());
    }

    #[test]
    fn detection_errors_are_skipped() {
        let mut h = Harness::new();
        h.model.set_fail_detections(true);
        h.show_frame(0.1);
        assert_eq!(h.tick(), Schedule::Next);
        assert!(!h.frame_loop.has_in_flight());

        h.model.set_fail_detections(false);
        h.model.set_reject_submissions(true);
        h.show_frame(0.2);
        assert_eq!(h.tick(), Schedule::Next);
        assert_eq!(h.stats, DetectionStats::new());
    }

    #[test]
    fn vanished_detection_is_skipped() {
        let mut h = Harness::new();
        h.model.set_deferred(true);
        h.show_frame(0.1);
        h.tick();
        assert_eq!(h.model.drop_pending(), 1);
        assert_eq!(h.tick(), Schedule::Next);
        assert!(!h.frame_loop.has_in_flight());

        h.show_frame(0.2);
        h.tick();
        assert_eq!(h.model.timestamps().len(), 2);
    }

    #[test]
    fn switches_image_mode_landmarker_to_video() {
        let (landmarker, model) = FakeLandmarker::new();
        let mut h = Harness::new();
        h.session =
            ModelSession::ready(Box::new(landmarker.with_running_mode(RunningMode::Image)));
        h.model = model;
        h.show_frame(0.1);
        h.tick();
        assert_eq!(h.model.mode_switches(), 1);
        assert_eq!(h.model.timestamps().len(), 1);
    }

    #[test]
    fn idle_loop_does_nothing() {
        let mut h = Harness::new();
        h.frame_loop.stop();
        h.show_frame(0.1);
        assert_eq!(h.tick(), Schedule::Stop);
        assert!(h.model.timestamps().is_empty());
    }
}
