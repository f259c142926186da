//! Application configuration, stored as JSON.
//!
//! Every section has defaults, so a file only needs the fields it changes.

use camgauge_aruco::{builtin_dictionary, Dictionary, DictionaryError, MarkerDetectorParams, DEFAULT_DICTIONARY};
use camgauge_calib::{CalibrationOptions, DEFAULT_CALIBRATION_FILE};
use camgauge_chessboard::{ChessboardParams, ChessboardSpec};
use camgauge_core::DistortionModel;
use camgauge_measure::MeasurementConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
}

/// Capture and calibration settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Internal corners per row.
    pub cols: u32,
    /// Internal corners per column.
    pub rows: u32,
    /// Side of one board square; sets the unit of the extrinsics.
    pub square_size: f64,
    /// Every `interval`-th frame is captured.
    pub interval: u32,
    /// Frames to capture before calibrating.
    pub target_count: usize,
    pub model: DistortionModel,
    pub output: PathBuf,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            cols: 9,
            rows: 6,
            square_size: 0.01,
            interval: 10,
            target_count: 20,
            model: DistortionModel::BrownConrady5,
            output: PathBuf::from(DEFAULT_CALIBRATION_FILE),
        }
    }
}

impl CalibrationConfig {
    pub fn spec(&self) -> ChessboardSpec {
        ChessboardSpec::new(self.cols, self.rows)
    }

    pub fn options(&self) -> CalibrationOptions {
        CalibrationOptions {
            model: self.model,
            ..Default::default()
        }
    }
}

/// Marker detection and pose settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Built-in dictionary name, used unless `dictionary_json` is set.
    pub dictionary: String,
    pub dictionary_json: Option<PathBuf>,
    /// Printed side length of the marker, meters.
    pub marker_size_m: f64,
    /// Marker tracked by the measurement session; `None` takes the first.
    pub marker_id: Option<u32>,
    pub params: MarkerDetectorParams,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            dictionary: DEFAULT_DICTIONARY.to_string(),
            dictionary_json: None,
            marker_size_m: 0.05,
            marker_id: None,
            params: MarkerDetectorParams::default(),
        }
    }
}

impl MarkerConfig {
    /// The configured dictionary, read from disk when a JSON path is set.
    pub fn load_dictionary(&self) -> Result<Dictionary, ConfigError> {
        if let Some(path) = &self.dictionary_json {
            return Ok(Dictionary::load_json(path)?);
        }
        builtin_dictionary(&self.dictionary)
            .cloned()
            .ok_or_else(|| ConfigError::Invalid(format!("unknown dictionary {:?}", self.dictionary)))
    }
}

/// Top-level configuration file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub calibration: CalibrationConfig,
    pub chessboard: ChessboardParams,
    pub markers: MarkerConfig,
    pub measurement: MeasurementConfig,
    /// Preview sessions correct distortion when a calibration is loaded.
    pub undistort_preview: bool,
}

impl AppConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Self = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject values no session can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.calibration;
        if c.cols < 2 || c.rows < 2 {
            return Err(ConfigError::Invalid(format!(
                "board needs at least 2x2 internal corners, got {}x{}",
                c.cols, c.rows
            )));
        }
        if !(c.square_size.is_finite() && c.square_size > 0.0) {
            return Err(ConfigError::Invalid(format!("square size {} must be positive", c.square_size)));
        }
        if c.interval == 0 {
            return Err(ConfigError::Invalid("capture interval must be at least 1".into()));
        }
        if c.target_count == 0 {
            return Err(ConfigError::Invalid("capture count must be at least 1".into()));
        }
        let m = &self.markers;
        if !(m.marker_size_m.is_finite() && m.marker_size_m > 0.0) {
            return Err(ConfigError::Invalid(format!("marker size {} must be positive", m.marker_size_m)));
        }
        if !self.measurement.pointer_offset_m.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "pointer offset {} is not finite",
                self.measurement.pointer_offset_m
            )));
        }
        Ok(())
    }
}
