//! Camera calibration and marker-based metric measurement.
//!
//! This crate ties the `camgauge-*` crates together:
//! - re-exports of the underlying crates
//! - frame sources and a single-slot update channel
//! - camera sessions (calibration capture, preview, marker measurement)
//!   running on their own producer thread
//! - overlay drawing and JSON configuration
//!
//! ## Quickstart
//!
//! ```no_run
//! use camgauge::config::AppConfig;
//! use camgauge::detect::calibrate_frames;
//! use camgauge::source::{FrameSource, ImageSequenceSource};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = AppConfig::default();
//! let mut source = ImageSequenceSource::open("captures")?;
//! let mut frames = Vec::new();
//! while let Some(frame) = source.next_frame()? {
//!     frames.push(frame);
//! }
//! let result = calibrate_frames(&frames, &cfg.calibration, &cfg.chessboard)?;
//! camgauge::calib::write_calibration(&cfg.calibration.output, &result.intrinsics, &result.distortion)?;
//! println!("rms {:.4} px", result.rms);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `camgauge::core`: camera model, poses, homographies, the LM solver.
//! - `camgauge::chessboard`: chessboard detection from ChESS corners.
//! - `camgauge::aruco`: marker dictionaries and decoding.
//! - `camgauge::pose`: planar PnP and single-marker poses.
//! - `camgauge::calib`: calibration, distortion correction, the calibration file.
//! - `camgauge::measure`: distance/area math and the measurement state machine.

pub use camgauge_aruco as aruco;
pub use camgauge_calib as calib;
pub use camgauge_chessboard as chessboard;
pub use camgauge_core as core;
pub use camgauge_measure as measure;
pub use camgauge_pose as pose;

pub mod config;
pub mod detect;
pub mod overlay;
pub mod session;
pub mod slot;
pub mod source;

pub use config::{AppConfig, ConfigError};
pub use detect::DetectError;
pub use session::{SessionError, SessionHandle, SessionRunner, SessionSummary, SessionUpdate};
pub use slot::LatestSlot;
pub use source::{FrameSource, ImageSequenceSource, SourceError, VecSource};
