use super::{FrameTask, SessionError, SessionSummary, SessionUpdate};
use camgauge_calib::undistort;
use camgauge_core::CameraModel;
use image::RgbImage;

/// Publishes frames unchanged, or undistorted when a camera is set.
pub struct PreviewTask {
    camera: Option<CameraModel>,
}

impl PreviewTask {
    pub fn new(camera: Option<CameraModel>) -> Self {
        Self { camera }
    }
}

impl FrameTask for PreviewTask {
    fn on_frame(&mut self, index: usize, frame: RgbImage) -> Result<SessionUpdate, SessionError> {
        let frame = match &self.camera {
            Some(cam) => undistort(&frame, &cam.intrinsics, &cam.distortion)?,
            None => frame,
        };
        Ok(SessionUpdate::frame(index, frame))
    }

    fn finish(self, frames: usize) -> SessionSummary {
        SessionSummary {
            frames,
            ..Default::default()
        }
    }
}
