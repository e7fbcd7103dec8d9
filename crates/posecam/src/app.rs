//! Application state and event dispatch.

use posecam_image::Canvas;

use crate::{
    camera::{CameraContext, CameraController},
    frame_loop::{FrameContext, FrameLoop, Schedule},
    media::{MediaConstraints, MediaDevices},
    session::{LoadEvent, ModelSession},
    stats::{
        update_status, DetectionStats, STATUS_LOADING_MODEL, STATUS_MODEL_FAILED,
        STATUS_MODEL_LOADED,
    },
    ui::Dom,
    video::Video,
};

/// Owns all mutable state of the application.
///
/// The GUI drives the app by calling [`App::poll`] and [`App::tick`] once per displayed frame and
/// [`App::click`] whenever the user activates the toggle.
pub struct App {
    session: ModelSession,
    camera: CameraController,
    video: Video,
    frame_loop: FrameLoop,
    canvas: Canvas,
    stats: DetectionStats,
    dom: Dom,
}

impl App {
    /// Creates the application around a model session that may still be loading.
    pub fn new(
        session: ModelSession,
        devices: Box<dyn MediaDevices>,
        constraints: MediaConstraints,
    ) -> Self {
        let mut stats = DetectionStats::new();
        let mut dom = Dom::new();
        let camera = CameraController::new(devices, constraints, &mut stats, &mut dom);

        // The model status replaces the "camera unsupported" message; the toggle stays disabled.
        let status = if session.is_ready() {
            STATUS_MODEL_LOADED
        } else if session.is_failed() {
            STATUS_MODEL_FAILED
        } else {
            STATUS_LOADING_MODEL
        };
        update_status(&mut stats, &mut dom, status);

        Self {
            session,
            camera,
            video: Video::new(),
            frame_loop: FrameLoop::new(),
            canvas: Canvas::new(0, 0),
            stats,
            dom,
        }
    }

    /// Processes asynchronous events: model loading and camera activation.
    pub fn poll(&mut self) {
        match self.session.poll() {
            Some(LoadEvent::Loaded) => {
                log::info!("pose landmark model loaded");
                update_status(&mut self.stats, &mut self.dom, STATUS_MODEL_LOADED);
            }
            Some(LoadEvent::Failed(e)) => {
                log::error!("failed to load the pose landmark model: {e:#}");
                update_status(&mut self.stats, &mut self.dom, STATUS_MODEL_FAILED);
            }
            None => {}
        }

        let Self {
            session,
            camera,
            video,
            frame_loop,
            stats,
            dom,
            ..
        } = self;
        camera.poll(&mut CameraContext {
            session,
            video,
            frame_loop,
            stats,
            dom,
        });
    }

    /// Handles a click on the camera toggle.
    pub fn click(&mut self) {
        let Self {
            session,
            camera,
            video,
            frame_loop,
            stats,
            dom,
            ..
        } = self;
        camera.click(&mut CameraContext {
            session,
            video,
            frame_loop,
            stats,
            dom,
        });
    }

    /// Runs one frame loop iteration, if the loop is active.
    pub fn tick(&mut self) -> Schedule {
        if !self.frame_loop.is_active() {
            return Schedule::Stop;
        }
        self.frame_loop.tick(&mut FrameContext {
            running: self.camera.is_running(),
            video: &self.video,
            session: &mut self.session,
            canvas: &mut self.canvas,
            stats: &mut self.stats,
            dom: &mut self.dom,
        })
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn stats(&self) -> &DetectionStats {
        &self.stats
    }

    /// The overlay the skeletons are drawn on.
    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn video(&self) -> &Video {
        &self.video
    }

    pub fn frame_loop(&self) -> &FrameLoop {
        &self.frame_loop
    }

    pub fn session(&self) -> &ModelSession {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        self.camera.is_running()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        fake::{FakeLandmarker, FakeMediaDevices},
        promise::promise,
        stats::{STATUS_CAMERA_UNSUPPORTED, STATUS_MODEL_NOT_READY},
    };

    use super::*;

    #[test]
    fn startup_status_follows_model() {
        let (devices, _) = FakeMediaDevices::new();
        let app = App::new(
            ModelSession::ready(Box::new(FakeLandmarker::new().0)),
            Box::new(devices),
            MediaConstraints::default(),
        );
        assert_eq!(app.dom().status, STATUS_MODEL_LOADED);

        let (devices, _) = FakeMediaDevices::new();
        let app = App::new(
            ModelSession::failed(),
            Box::new(devices),
            MediaConstraints::default(),
        );
        assert_eq!(app.dom().status, STATUS_MODEL_FAILED);
    }

    #[test]
    fn loading_overrides_unsupported_camera() {
        let (devices, _) = FakeMediaDevices::unsupported();
        let (load, handle) = promise();
        let mut app = App::new(
            ModelSession::loading(handle),
            Box::new(devices),
            MediaConstraints::default(),
        );
        assert_eq!(app.dom().status, STATUS_LOADING_MODEL);
        assert!(app.dom().toggle.disabled);
        assert_ne!(app.dom().status, STATUS_CAMERA_UNSUPPORTED);

        app.click();
        assert_eq!(app.dom().status, STATUS_LOADING_MODEL);

        load.fulfill(Err(anyhow::anyhow!("no model")));
        app.poll();
        assert!(app.session().is_failed());
        assert_eq!(app.dom().status, STATUS_MODEL_FAILED);
    }

    #[test]
    fn click_while_loading_is_rejected() {
        let (devices, camera) = FakeMediaDevices::new();
        let (load, handle) = promise();
        let mut app = App::new(
            ModelSession::loading(handle),
            Box::new(devices),
            MediaConstraints::default(),
        );
        app.click();
        assert!(!app.is_running());
        assert_eq!(app.dom().status, STATUS_MODEL_NOT_READY);
        assert_eq!(camera.requests(), 0);
        assert_eq!(app.tick(), Schedule::Stop);

        load.fulfill(Ok(Box::new(FakeLandmarker::new().0)));
        app.poll();
        assert!(app.session().is_ready());
        assert_eq!(app.dom().status, STATUS_MODEL_LOADED);
    }
}
