use faceid_hw::Roi;
use std::path::PathBuf;
use thiserror::Error;

/// Region of the camera frame the probe is cut from.
pub const PROBE_ROI: Roi = Roi {
    x: 200,
    y: 120,
    width: 250,
    height: 250,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("model artifact not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("gallery directory not found: {0}")]
    GalleryNotFound(PathBuf),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory of reference images.
    pub gallery_dir: PathBuf,
    /// Scratch file the captured probe is written to.
    pub probe_path: PathBuf,
    /// Fused `.onnx` graph or TOML model manifest.
    pub model_path: PathBuf,
    /// Preview refresh rate in Hz.
    pub refresh_hz: f64,
    /// Frames to discard after opening the camera (auto exposure settling).
    pub warmup_frames: usize,
}

impl Config {
    /// Load configuration from `FACEID_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = lookup("FACEID_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("application_data"));

        let gallery_dir = lookup("FACEID_GALLERY_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("verification_images"));

        let probe_path = lookup("FACEID_PROBE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("input_image").join("input_image.jpg"));

        let refresh_hz: f64 = parse_or(&lookup, "FACEID_REFRESH_HZ", 33.0)?;
        if !(refresh_hz.is_finite() && refresh_hz > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "FACEID_REFRESH_HZ",
                value: refresh_hz.to_string(),
            });
        }

        Ok(Self {
            camera_device: lookup("FACEID_CAMERA_DEVICE").unwrap_or_else(|| "/dev/video0".to_string()),
            gallery_dir,
            probe_path,
            model_path: lookup("FACEID_MODEL")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("siamesemodel.toml")),
            refresh_hz,
            warmup_frames: parse_or(&lookup, "FACEID_WARMUP_FRAMES", 4)?,
        })
    }

    /// Check that the artifacts needed at startup exist.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.model_path.exists() {
            return Err(ConfigError::ModelNotFound(self.model_path.clone()));
        }
        if !self.gallery_dir.is_dir() {
            return Err(ConfigError::GalleryNotFound(self.gallery_dir.clone()));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.refresh_hz)
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}
