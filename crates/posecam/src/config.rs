//! Runtime configuration.

use std::{env, path::PathBuf};

use crate::session::Delegate;

const ENV_VAR_MODEL: &str = "POSECAM_MODEL";
const ENV_VAR_DELEGATE: &str = "POSECAM_DELEGATE";
const ENV_VAR_NUM_POSES: &str = "POSECAM_NUM_POSES";
const ENV_VAR_WEBCAM_NAME: &str = "POSECAM_WEBCAM_NAME";

/// Default location of the pose landmark network, relative to the working directory.
pub const DEFAULT_MODEL_PATH: &str = "3rdparty/onnx/pose_landmark_lite.onnx";

/// Default maximum number of poses reported per frame.
pub const DEFAULT_NUM_POSES: usize = 2;

/// Application configuration.
///
/// Read from the environment with [`Config::from_env`]:
///
/// * `POSECAM_MODEL`: path to the ONNX pose landmark network. Defaults to
///   [`DEFAULT_MODEL_PATH`].
/// * `POSECAM_DELEGATE`: `gpu` or `cpu`, the preferred inference hardware. Defaults to `gpu`.
/// * `POSECAM_NUM_POSES`: maximum number of poses per frame (at least 1). Defaults to
///   [`DEFAULT_NUM_POSES`].
/// * `POSECAM_WEBCAM_NAME`: forces the webcam device with this name to be used. If unset, the first
///   device that supports a compatible image format will be used.
///
/// Invalid values are logged and replaced by the default.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub model_path: PathBuf,
    pub delegate: Delegate,
    pub num_poses: usize,
    pub webcam_name: Option<String>,
    /// Preferred capture resolution; the camera may deliver a different one.
    pub ideal_resolution: (u32, u32),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_path: DEFAULT_MODEL_PATH.into(),
            delegate: Delegate::Gpu,
            num_poses: DEFAULT_NUM_POSES,
            webcam_name: None,
            ideal_resolution: (1280, 720),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| match env::var(key) {
            Ok(value) => Some(value),
            Err(env::VarError::NotPresent) => None,
            Err(env::VarError::NotUnicode(s)) => {
                log::warn!(
                    "ignoring `{key}`: value {} is not valid unicode",
                    s.to_string_lossy()
                );
                None
            }
        })
    }

    /// Builds a configuration from an arbitrary key-value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_VAR_MODEL) {
            log::debug!("model override: `{ENV_VAR_MODEL}` is set to '{path}'");
            config.model_path = path.into();
        }

        if let Some(value) = lookup(ENV_VAR_DELEGATE) {
            match value.parse() {
                Ok(delegate) => config.delegate = delegate,
                Err(()) => log::warn!(
                    "invalid value set for `{ENV_VAR_DELEGATE}`: '{value}'; using {:?}",
                    config.delegate
                ),
            }
        }

        if let Some(value) = lookup(ENV_VAR_NUM_POSES) {
            match value.trim().parse::<usize>() {
                Ok(n) if n >= 1 => config.num_poses = n,
                _ => log::warn!(
                    "invalid value set for `{ENV_VAR_NUM_POSES}`: '{value}'; using {}",
                    config.num_poses
                ),
            }
        }

        if let Some(name) = lookup(ENV_VAR_WEBCAM_NAME) {
            log::debug!("webcam override: `{ENV_VAR_WEBCAM_NAME}` is set to '{name}'");
            config.webcam_name = Some(name);
        }

        config
    }
}
