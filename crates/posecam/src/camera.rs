//! The camera controller: turns the camera on and off in response to the toggle.
//!
//! The controller owns the running flag. Activation requests a stream from [`MediaDevices`],
//! which resolves asynchronously; [`CameraController::poll`] picks up the outcome, attaches the
//! stream to the [`Video`] element, and starts the [`FrameLoop`] once the first frame is there.

use crate::{
    frame_loop::FrameLoop,
    media::{MediaConstraints, MediaDevices, StreamRequest},
    session::ModelSession,
    stats::{
        update_status, DetectionStats, STATUS_CAMERA_ACTIVE, STATUS_CAMERA_ERROR,
        STATUS_CAMERA_OFF, STATUS_CAMERA_STARTING, STATUS_CAMERA_UNSUPPORTED,
        STATUS_MODEL_NOT_READY,
    },
    ui::Dom,
    video::Video,
};

/// State the controller acts on.
pub struct CameraContext<'a> {
    pub session: &'a ModelSession,
    pub video: &'a mut Video,
    pub frame_loop: &'a mut FrameLoop,
    pub stats: &'a mut DetectionStats,
    pub dom: &'a mut Dom,
}

pub struct CameraController {
    devices: Box<dyn MediaDevices>,
    constraints: MediaConstraints,
    supported: bool,
    running: bool,
    /// Stream request of the current activation.
    pending: Option<StreamRequest>,
    /// Requests of earlier activations that were cancelled before they resolved.
    abandoned: Vec<StreamRequest>,
    /// Set once the stream is attached, until the first frame arrives.
    awaiting_data: bool,
}

impl CameraController {
    /// Creates the controller and checks for camera support.
    ///
    /// Without camera support, the toggle is disabled and the controller ignores all clicks.
    pub fn new(
        devices: Box<dyn MediaDevices>,
        constraints: MediaConstraints,
        stats: &mut DetectionStats,
        dom: &mut Dom,
    ) -> Self {
        let supported = devices.is_supported();
        if !supported {
            log::warn!("camera capture is not supported on this system");
            update_status(stats, dom, STATUS_CAMERA_UNSUPPORTED);
            dom.toggle.disabled = true;
        }
        Self {
            devices,
            constraints,
            supported,
            running: false,
            pending: None,
            abandoned: Vec::new(),
            awaiting_data: false,
        }
    }

    /// Returns whether the camera is supposed to be running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// Handles a click on the toggle.
    pub fn click(&mut self, cx: &mut CameraContext<'_>) {
        if !self.supported {
            log::debug!("ignoring toggle: camera not supported");
            return;
        }
        if !cx.session.is_ready() {
            update_status(cx.stats, cx.dom, STATUS_MODEL_NOT_READY);
            return;
        }

        if self.running {
            self.deactivate(cx);
        } else {
            self.activate(cx);
        }
    }

    fn activate(&mut self, cx: &mut CameraContext<'_>) {
        self.running = true;
        cx.dom.show_camera(true);
        update_status(cx.stats, cx.dom, STATUS_CAMERA_STARTING);

        log::debug!(
            "requesting camera stream, ideal resolution {}x{}",
            self.constraints.ideal_width,
            self.constraints.ideal_height
        );
        self.pending = Some(self.devices.get_user_media(&self.constraints));
        self.awaiting_data = false;
    }

    fn deactivate(&mut self, cx: &mut CameraContext<'_>) {
        self.running = false;
        cx.dom.show_camera(false);
        update_status(cx.stats, cx.dom, STATUS_CAMERA_OFF);

        if let Some(request) = self.pending.take() {
            log::debug!("camera turned off before the stream was ready");
            self.abandoned.push(request);
        }
        self.awaiting_data = false;
        cx.frame_loop.stop();
        if let Err(e) = cx.video.set_src_object(None) {
            log::error!("failed to detach stream: {e:#}");
        }
    }

    /// Processes asynchronous camera events. Call once per UI iteration.
    pub fn poll(&mut self, cx: &mut CameraContext<'_>) {
        self.reap_abandoned();

        if let Some(request) = &mut self.pending {
            if let Some(outcome) = request.poll() {
                self.pending = None;
                let attached = match outcome {
                    Ok(Ok(stream)) => cx.video.set_src_object(Some(stream)),
                    Ok(Err(e)) => Err(e),
                    Err(dropped) => Err(dropped.into()),
                };
                match attached {
                    Ok(()) => self.awaiting_data = true,
                    Err(e) => self.fail(cx, e),
                }
            }
        }

        if self.awaiting_data && cx.video.has_current_data() {
            self.awaiting_data = false;
            update_status(cx.stats, cx.dom, STATUS_CAMERA_ACTIVE);
            cx.frame_loop.start();
        }
    }

    /// Stops streams that arrive for activations the user already cancelled.
    fn reap_abandoned(&mut self) {
        self.abandoned.retain_mut(|request| match request.poll() {
            None => true,
            Some(Ok(Ok(mut stream))) => {
                log::debug!("stopping stream '{}' that arrived too late", stream.label());
                stream.stop();
                false
            }
            Some(_) => false,
        });
    }

    fn fail(&mut self, cx: &mut CameraContext<'_>, error: anyhow::Error) {
        log::error!("failed to access the camera: {error:#}");
        update_status(cx.stats, cx.dom, STATUS_CAMERA_ERROR);
        self.running = false;
        cx.dom.show_camera(false);
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        fake::{FakeLandmarker, FakeMediaDevices, FakeMediaDevicesHandle},
        frame_loop::LoopState,
        ui::{LABEL_ACTIVATE, LABEL_DEACTIVATE},
    };

    use super::*;

    struct Harness {
        camera: CameraController,
        devices: FakeMediaDevicesHandle,
        session: ModelSession,
        video: Video,
        frame_loop: FrameLoop,
        stats: DetectionStats,
        dom: Dom,
    }

    impl Harness {
        fn with_devices((devices, handle): (FakeMediaDevices, FakeMediaDevicesHandle)) -> Self {
            let mut stats = DetectionStats::new();
            let mut dom = Dom::new();
            let camera = CameraController::new(
                Box::new(devices),
                MediaConstraints::default(),
                &mut stats,
                &mut dom,
            );
            Self {
                camera,
                devices: handle,
                session: ModelSession::ready(Box::new(FakeLandmarker::new().0)),
                video: Video::new(),
                frame_loop: FrameLoop::new(),
                stats,
                dom,
            }
        }

        fn new() -> Self {
            Self::with_devices(FakeMediaDevices::new())
        }

        fn click(&mut self) {
            let mut cx = CameraContext {
                session: &self.session,
                video: &mut self.video,
                frame_loop: &mut self.frame_loop,
                stats: &mut self.stats,
                dom: &mut self.dom,
            };
            self.camera.click(&mut cx);
        }

        fn poll(&mut self) {
            let mut cx = CameraContext {
                session: &self.session,
                video: &mut self.video,
                frame_loop: &mut self.frame_loop,
                stats: &mut self.stats,
                dom: &mut self.dom,
            };
            self.camera.poll(&mut cx);
        }
    }

    #[test]
    fn activation_requests_ideal_resolution() {
        let mut h = Harness::new();
        h.click();
        assert!(h.camera.is_running());
        assert_eq!(h.dom.toggle.label, LABEL_DEACTIVATE);
        assert!(h.dom.toggle.is_active());
        assert!(h.dom.is_video_visible());
        assert_eq!(h.dom.status, STATUS_CAMERA_STARTING);
        let constraints = h.devices.last_constraints().unwrap();
        assert_eq!((constraints.ideal_width, constraints.ideal_height), (1280, 720));
    }

    #[test]
    fn model_not_ready_rejects_activation() {
        let mut h = Harness::new();
        h.session = ModelSession::failed();
        h.click();
        assert!(!h.camera.is_running());
        assert_eq!(h.dom.status, STATUS_MODEL_NOT_READY);
        assert_eq!(h.devices.requests(), 0);
        assert_eq!(h.dom.toggle.label, LABEL_ACTIVATE);
    }

    #[test]
    fn unsupported_camera_disables_toggle() {
        let mut h = Harness::with_devices(FakeMediaDevices::unsupported());
        assert_eq!(h.dom.status, STATUS_CAMERA_UNSUPPORTED);
        assert!(h.dom.toggle.disabled);
        h.click();
        assert!(!h.camera.is_running());
        assert_eq!(h.devices.requests(), 0);
    }

    #[test]
    fn denied_access_reverts_to_inactive() {
        let mut h = Harness::new();
        h.devices.set_denied(true);
        h.click();
        h.poll();
        assert!(!h.camera.is_running());
        assert_eq!(h.dom.status, STATUS_CAMERA_ERROR);
        assert_eq!(h.dom.toggle.label, LABEL_ACTIVATE);
        assert!(!h.dom.toggle.is_active());
        assert!(!h.dom.is_video_visible());

        // The user may retry.
        h.devices.set_denied(false);
        h.click();
        h.poll();
        assert!(h.camera.is_running());
        assert!(h.video.has_src_object());
    }

    #[test]
    fn first_frame_starts_frame_loop() {
        use std::{
            thread,
            time::{Duration, Instant},
        };

        let mut h = Harness::new();
        h.click();
        h.poll();
        assert!(h.video.has_src_object());

        let deadline = Instant::now() + Duration::from_secs(5);
        while h.frame_loop.state() == LoopState::Idle {
            assert!(Instant::now() < deadline, "no frame arrived");
            thread::sleep(Duration::from_millis(1));
            h.poll();
        }
        assert_eq!(h.dom.status, STATUS_CAMERA_ACTIVE);
    }

    #[test]
    fn deactivation_stops_stream() {
        let mut h = Harness::new();
        h.click();
        h.poll();
        h.click();
        assert!(!h.camera.is_running());
        assert!(!h.video.has_src_object());
        assert_eq!(h.frame_loop.state(), LoopState::Idle);
        assert_eq!(h.dom.status, STATUS_CAMERA_OFF);
        assert!(!h.dom.is_video_visible());
    }

    #[test]
    fn stream_arriving_after_deactivation_is_stopped() {
        let mut h = Harness::new();
        h.devices.set_deferred(true);
        h.click();
        h.click();
        assert_eq!(h.devices.resolve_pending(), 1);
        h.poll();
        assert!(!h.video.has_src_object());
        assert_eq!(h.devices.opened_streams(), 1);
        assert_eq!(h.devices.live_streams(), 0);
        assert_eq!(h.dom.status, STATUS_CAMERA_OFF);
    }
}
