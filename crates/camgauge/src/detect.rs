//! End-to-end helpers from color frames to correspondences, calibrations and
//! marker poses.

use crate::config::CalibrationConfig;
use camgauge_aruco::{DictionaryError, MarkerDetection};
use camgauge_calib::{calibrate, CalibError, CalibrationResult};
use camgauge_chessboard::{ChessboardDetector, ChessboardError, ChessboardParams};
use camgauge_core::{CameraModel, CorrespondenceSet, Pose};
use camgauge_pose::estimate_pose;
use image::RgbImage;
use log::{debug, info};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors produced by the facade helpers.
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error(transparent)]
    Chessboard(#[from] ChessboardError),
    #[error(transparent)]
    Calib(#[from] CalibError),
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
}

/// Board correspondences of every frame where the board is found, in frame
/// order. Frames without a board are skipped.
pub fn chessboard_sets(
    frames: &[RgbImage],
    detector: &ChessboardDetector,
    square_size: f64,
) -> Vec<CorrespondenceSet> {
    frames
        .iter()
        .enumerate()
        .filter_map(|(i, frame)| match detector.detect(frame) {
            Some(det) => Some(det.correspondences(square_size)),
            None => {
                debug!("frame {i}: no board");
                None
            }
        })
        .collect()
}

/// Detect the configured board in `frames` and calibrate.
///
/// The image size is taken from the first frame.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(frames = frames.len()))
)]
pub fn calibrate_frames(
    frames: &[RgbImage],
    config: &CalibrationConfig,
    params: &ChessboardParams,
) -> Result<CalibrationResult, DetectError> {
    let detector = ChessboardDetector::new(config.spec(), params.clone())?;
    let Some(first) = frames.first() else {
        return Err(CalibError::NoTarget.into());
    };
    let sets = chessboard_sets(frames, &detector, config.square_size);
    info!("board found in {}/{} frames", sets.len(), frames.len());
    Ok(calibrate(&sets, first.dimensions(), &config.options())?)
}

/// A decoded marker with its pose in the camera frame.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerPose {
    pub marker: MarkerDetection,
    pub pose: Pose,
}

/// Poses of all markers whose corners admit one; the rest are dropped with a
/// debug log.
pub fn marker_poses(markers: &[MarkerDetection], marker_size: f64, camera: &CameraModel) -> Vec<MarkerPose> {
    markers
        .iter()
        .filter_map(|m| match estimate_pose(&m.corners, marker_size, camera) {
            Ok(pose) => Some(MarkerPose {
                marker: m.clone(),
                pose,
            }),
            Err(err) => {
                debug!("marker {}: no pose ({err})", m.id);
                None
            }
        })
        .collect()
}

/// The marker with id `id`, or the first one when `id` is `None`.
pub fn select_marker(poses: &[MarkerPose], id: Option<u32>) -> Option<&MarkerPose> {
    match id {
        Some(id) => poses.iter().find(|p| p.marker.id == id),
        None => poses.first(),
    }
}
