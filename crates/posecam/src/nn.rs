//! ONNX pose landmark backend.
//!
//! Runs a MediaPipe BlazePose landmark network (`pose_landmark_lite.onnx` or
//! `pose_landmark_full.onnx`) on the CPU using tract. The network looks at the whole frame, so it
//! reports at most one pose.
//!
//! Inference happens on a dedicated worker thread. [`PoseLandmarker::detect_for_video`] only
//! enqueues the frame and returns immediately.

use std::{path::Path, sync::Arc};

use anyhow::{bail, Context};
use posecam_image::RgbaImage;
use tract_onnx::prelude::{
    tvec, Framework, Graph, InferenceModelExt, SimplePlan, TValue, Tensor, TypedFact, TypedOp,
};

use crate::{
    landmark::{Landmark, Landmarks},
    pose::NUM_LANDMARKS,
    promise::{promise, Promise, Worker},
    session::{
        check_video_timestamp, Delegate, Detection, PoseLandmarker, PoseLandmarkerOptions,
        PoseLandmarkerResult, RunningMode,
    },
    timer::{FpsCounter, Timer},
    video::Frame,
};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Total number of landmarks the network outputs: 33 body landmarks plus 6 auxiliary ones.
const NETWORK_LANDMARKS: usize = NUM_LANDMARKS + 6;
/// Values per landmark: x, y, z, visibility logit, presence logit.
const VALUES_PER_LANDMARK: usize = 5;
/// Pose flag value below which the frame is considered empty.
const PRESENCE_THRESHOLD: f32 = 0.5;

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputLayout {
    Nchw,
    Nhwc,
}

/// Maps between frame coordinates and the square network input.
///
/// Frames are letterboxed: scaled uniformly and centered, with black bars filling the rest.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    frame_width: f32,
    frame_height: f32,
    side: f32,
    offset_x: f32,
    offset_y: f32,
}

impl Letterbox {
    fn new(frame_width: u32, frame_height: u32) -> Self {
        let (w, h) = (frame_width as f32, frame_height as f32);
        let side = w.max(h);
        Self {
            frame_width: w,
            frame_height: h,
            side,
            offset_x: (side - w) / 2.0,
            offset_y: (side - h) / 2.0,
        }
    }

    /// Maps normalized network input coordinates to frame pixel coordinates.
    fn to_frame(&self, u: f32, v: f32) -> (f32, f32) {
        (u * self.side - self.offset_x, v * self.side - self.offset_y)
    }

    /// Maps normalized network input coordinates and depth to normalized frame coordinates.
    fn normalize(&self, [u, v, z]: [f32; 3]) -> [f32; 3] {
        let (x, y) = self.to_frame(u, v);
        [
            x / self.frame_width,
            y / self.frame_height,
            z * self.side / self.frame_width,
        ]
    }
}

struct Network {
    model: Model,
    input_size: usize,
    layout: InputLayout,
    t_preprocess: Timer,
    t_infer: Timer,
}

impl Network {
    fn load(path: &Path) -> anyhow::Result<Self> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => bail!(
                "pose landmark network '{}' must have `.onnx` extension",
                path.display()
            ),
        }

        let graph = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to load '{}'", path.display()))?
            .into_optimized()?;

        let input_shape = graph
            .input_fact(0)?
            .shape
            .as_concrete()
            .context("network input shape is not concrete")?
            .to_vec();
        let (layout, input_size) = match input_shape[..] {
            [1, 3, h, w] if h == w => (InputLayout::Nchw, w),
            [1, h, w, 3] if h == w => (InputLayout::Nhwc, w),
            _ => bail!("unexpected network input shape {input_shape:?}"),
        };

        let outputs = graph.output_outlets()?;
        if outputs.len() < 2 {
            bail!(
                "pose landmark network needs at least 2 outputs, this one has {}",
                outputs.len()
            );
        }
        // Landmarks and pose flag. Segmentation, heatmap and world landmarks are not computed.
        let selected = outputs[..2].to_vec();
        let model = SimplePlan::new_for_outputs(graph, &selected)?;

        log::debug!(
            "loaded pose landmark network '{}' ({layout:?}, {input_size}x{input_size})",
            path.display()
        );
        Ok(Self {
            model,
            input_size,
            layout,
            t_preprocess: Timer::new("preprocess"),
            t_infer: Timer::new("infer"),
        })
    }

    fn timers(&self) -> [&Timer; 2] {
        [&self.t_preprocess, &self.t_infer]
    }

    fn input_tensor(&self, image: &RgbaImage) -> anyhow::Result<Tensor> {
        let size = self.input_size;
        let letterbox = Letterbox::new(image.width(), image.height());
        let mut data = vec![0.0f32; 3 * size * size];
        for y in 0..size {
            for x in 0..size {
                let (fx, fy) = letterbox.to_frame(
                    (x as f32 + 0.5) / size as f32,
                    (y as f32 + 0.5) / size as f32,
                );
                if fx < 0.0 || fy < 0.0 {
                    continue;
                }
                let (fx, fy) = (fx as u32, fy as u32);
                let Some(px) = image.get_pixel_checked(fx, fy) else {
                    continue;
                };
                for c in 0..3 {
                    let idx = match self.layout {
                        InputLayout::Nchw => (c * size + y) * size + x,
                        InputLayout::Nhwc => (y * size + x) * 3 + c,
                    };
                    data[idx] = f32::from(px[c]) / 255.0;
                }
            }
        }

        let shape = match self.layout {
            InputLayout::Nchw => [1, 3, size, size],
            InputLayout::Nhwc => [1, size, size, 3],
        };
        Ok(Tensor::from_shape(&shape, &data)?)
    }

    fn infer(&self, image: &RgbaImage) -> anyhow::Result<Option<Landmarks>> {
        let input = self.t_preprocess.time(|| self.input_tensor(image))?;
        let outputs = self
            .t_infer
            .time(|| self.model.run(tvec![TValue::from_const(Arc::new(input))]))?;

        let landmarks = outputs[0].as_slice::<f32>()?;
        let pose_flag = outputs[1].as_slice::<f32>()?;
        if landmarks.len() != NETWORK_LANDMARKS * VALUES_PER_LANDMARK || pose_flag.len() != 1 {
            bail!(
                "unexpected network output sizes {} and {}",
                landmarks.len(),
                pose_flag.len()
            );
        }

        Ok(extract(
            landmarks,
            pose_flag[0],
            self.input_size as f32,
            Letterbox::new(image.width(), image.height()),
        ))
    }
}

/// Converts raw network output into a landmark set in normalized frame coordinates.
///
/// Returns [`None`] if the pose flag indicates that nobody is in the frame.
fn extract(
    values: &[f32],
    pose_flag: f32,
    input_size: f32,
    letterbox: Letterbox,
) -> Option<Landmarks> {
    if pose_flag < PRESENCE_THRESHOLD {
        return None;
    }

    // Only the body landmarks are reported; the auxiliary ones follow them.
    let landmarks = values
        .chunks_exact(VALUES_PER_LANDMARK)
        .take(NUM_LANDMARKS)
        .map(|lm| {
            let pos = letterbox.normalize([
                lm[0] / input_size,
                lm[1] / input_size,
                lm[2] / input_size,
            ]);
            Landmark::new(pos)
                .with_visibility(sigmoid(lm[3]))
                .with_presence(sigmoid(lm[4]))
        })
        .collect();
    Some(landmarks)
}

type Request = (Frame, Promise<anyhow::Result<PoseLandmarkerResult>>);

/// A [`PoseLandmarker`] running an ONNX network on a worker thread.
pub struct OnnxPoseLandmarker {
    mode: RunningMode,
    last_timestamp_ms: Option<f64>,
    worker: Worker<Request>,
}

impl OnnxPoseLandmarker {
    /// Loads the network at `options.model_asset_path` and starts the inference worker.
    ///
    /// This can take a while; [`ModelSession::load`][crate::session::ModelSession::load] calls it
    /// on a background thread.
    pub fn load(options: PoseLandmarkerOptions) -> anyhow::Result<Self> {
        if options.delegate == Delegate::Gpu {
            log::warn!("GPU delegate is not available, running inference on the CPU");
        }

        let network = Network::load(&options.model_asset_path)?;
        let num_poses = options.num_poses;

        let mut fps = FpsCounter::new("pose landmarker");
        let worker = Worker::builder()
            .name("pose landmarker")
            .capacity(1)
            .spawn(move |(frame, promise): Request| {
                let result = network.infer(frame.image()).map(|pose| {
                    let mut result = PoseLandmarkerResult::new(pose.into_iter().collect());
                    result.truncate(num_poses);
                    result
                });
                promise.fulfill(result);
                fps.tick_with(network.timers());
            })?;

        Ok(Self {
            mode: options.running_mode,
            last_timestamp_ms: None,
            worker,
        })
    }

    fn submit(&mut self, frame: Frame) -> anyhow::Result<Detection> {
        let (promise, handle) = promise();
        if self.worker.try_send((frame, promise)).is_err() {
            bail!("pose landmarker is still busy with the previous frame");
        }
        Ok(handle)
    }
}

impl PoseLandmarker for OnnxPoseLandmarker {
    fn running_mode(&self) -> RunningMode {
        self.mode
    }

    fn set_running_mode(&mut self, mode: RunningMode) -> anyhow::Result<()> {
        self.mode = mode;
        self.last_timestamp_ms = None;
        Ok(())
    }

    fn detect(&mut self, image: &RgbaImage) -> anyhow::Result<PoseLandmarkerResult> {
        if self.mode != RunningMode::Image {
            bail!("landmarker is not in image mode (current mode: {:?})", self.mode);
        }
        let handle = self.submit(Frame::new(image.clone(), 0.0))?;
        handle.block()?
    }

    fn detect_for_video(&mut self, frame: &Frame, timestamp_ms: f64) -> anyhow::Result<Detection> {
        check_video_timestamp(self.mode, self.last_timestamp_ms, timestamp_ms)?;
        self.last_timestamp_ms = Some(timestamp_ms);
        self.submit(frame.clone())
    }
}
