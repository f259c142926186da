use super::{FrameTask, SessionError, SessionSummary, SessionUpdate};
use crate::config::CalibrationConfig;
use crate::detect::DetectError;
use crate::overlay::draw_chessboard;
use camgauge_calib::{calibrate, undistort, write_calibration, CalibrationResult};
use camgauge_chessboard::{ChessboardDetector, ChessboardParams};
use camgauge_core::CorrespondenceSet;
use image::RgbImage;
use log::{info, warn};

/// Calibration capture.
///
/// Every `interval`-th frame is captured (status `captured n/N`) and searched
/// for the board. After `target_count` captures the camera is calibrated
/// from the captures where the board was found, the result is written to
/// the configured file and the last capture is shown undistorted with the
/// RMS. A failed calibration is reported in the status line. Either way the
/// session then continues as a plain preview.
pub struct CaptureTask {
    config: CalibrationConfig,
    detector: ChessboardDetector,
    seen: usize,
    captured: usize,
    sets: Vec<CorrespondenceSet>,
    last_capture: Option<RgbImage>,
    image_size: Option<(u32, u32)>,
    calibration: Option<CalibrationResult>,
    done: bool,
}

impl CaptureTask {
    pub fn new(config: CalibrationConfig, params: ChessboardParams) -> Result<Self, DetectError> {
        let detector = ChessboardDetector::new(config.spec(), params)?;
        Ok(Self {
            config,
            detector,
            seen: 0,
            captured: 0,
            sets: Vec::new(),
            last_capture: None,
            image_size: None,
            calibration: None,
            done: false,
        })
    }

    /// Keep `frame` and its board, if found. Returns the annotated frame.
    fn capture(&mut self, frame: &RgbImage) -> Option<RgbImage> {
        self.captured += 1;
        self.image_size.get_or_insert(frame.dimensions());
        self.last_capture = Some(frame.clone());
        let det = self.detector.detect(frame)?;
        self.sets.push(det.correspondences(self.config.square_size));
        let mut annotated = frame.clone();
        draw_chessboard(&mut annotated, &det);
        Some(annotated)
    }

    /// Calibrate, save and undistort the last capture. Returns the frame to
    /// show and the status line.
    fn complete(&mut self) -> (Option<RgbImage>, String) {
        let sets = std::mem::take(&mut self.sets);
        let last = self.last_capture.take();
        let size = self.image_size.unwrap_or((0, 0));
        info!("calibrating from {} of {} captures", sets.len(), self.captured);

        let result = match calibrate(&sets, size, &self.config.options()) {
            Ok(r) => r,
            Err(err) => {
                warn!("calibration failed: {err}");
                return (last, format!("calibration failed: {err}"));
            }
        };
        let mut status = format!("calibration complete, rms {:.6} px", result.rms);
        if let Err(err) = write_calibration(&self.config.output, &result.intrinsics, &result.distortion) {
            warn!("{err}");
            status = format!("{status}; save failed: {err}");
        } else {
            info!("calibration saved to {}", self.config.output.display());
        }
        let shown = last.map(|frame| undistort(&frame, &result.intrinsics, &result.distortion).unwrap_or(frame));
        self.calibration = Some(result);
        (shown, status)
    }
}

impl FrameTask for CaptureTask {
    fn on_frame(&mut self, index: usize, frame: RgbImage) -> Result<SessionUpdate, SessionError> {
        self.seen += 1;
        if self.done || self.seen % self.config.interval.max(1) as usize != 0 {
            return Ok(SessionUpdate::frame(index, frame));
        }

        let annotated = self.capture(&frame);
        let mut update = SessionUpdate::frame(index, annotated.unwrap_or(frame))
            .with_status(format!("captured {}/{}", self.captured, self.config.target_count));
        info!("captured {}/{}", self.captured, self.config.target_count);

        if self.captured >= self.config.target_count {
            self.done = true;
            let (shown, status) = self.complete();
            if shown.is_some() {
                update.frame = shown;
            }
            update.status = Some(status);
        }
        Ok(update)
    }

    fn finish(self, frames: usize) -> SessionSummary {
        SessionSummary {
            frames,
            captured: self.captured,
            calibration: self.calibration,
        }
    }
}
