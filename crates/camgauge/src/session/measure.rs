use super::{FrameTask, SessionError, SessionSummary, SessionUpdate};
use crate::config::AppConfig;
use crate::detect::{marker_poses, select_marker, DetectError};
use crate::overlay::{draw_axes, draw_marker, draw_point, draw_polyline, MAGENTA, YELLOW};
use crate::slot::LatestSlot;
use camgauge_aruco::MarkerDetector;
use camgauge_core::{CameraModel, Pose};
use camgauge_measure::{Measurement, MeasurementMode, MeasurementSession, MeasurementState};
use image::RgbImage;
use log::{debug, info};
use nalgebra::Point3;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock(session: &Mutex<MeasurementSession>) -> MutexGuard<'_, MeasurementSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Consumer side of a measurement session.
///
/// Each committed point uses the newest marker pose published by the
/// session thread; a pose is used at most once.
#[derive(Clone)]
pub struct MeasureControl {
    session: Arc<Mutex<MeasurementSession>>,
    pose: LatestSlot<Pose>,
}

impl MeasureControl {
    pub fn new(session: MeasurementSession) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            pose: LatestSlot::new(),
        }
    }

    /// Slot the session thread publishes marker poses into.
    pub fn pose_slot(&self) -> LatestSlot<Pose> {
        self.pose.clone()
    }

    pub fn start(&self) {
        lock(&self.session).start();
    }

    /// Commit the pointer tip of the latest pose.
    pub fn commit(&self) -> Result<Point3<f64>, SessionError> {
        let pose = self.pose.take().ok_or(SessionError::NoPose)?;
        Ok(lock(&self.session).commit_point(&pose)?)
    }

    pub fn finish(&self) -> Result<Measurement, SessionError> {
        Ok(lock(&self.session).finish()?)
    }

    pub fn stop(&self) {
        lock(&self.session).stop();
    }

    pub fn state(&self) -> MeasurementState {
        lock(&self.session).state()
    }

    pub fn points(&self) -> Vec<Point3<f64>> {
        lock(&self.session).points().to_vec()
    }

    pub fn result(&self) -> Option<Measurement> {
        lock(&self.session).result()
    }
}

/// Marker tracking for measurements.
///
/// Per frame: decode markers, estimate poses, publish the pose of the
/// configured marker (or the first one) and draw outlines, the tracked
/// marker's axes, the pointer tip and the committed points. The pose slot is
/// cleared on frames where the marker is not seen.
pub struct MeasureTask {
    detector: MarkerDetector,
    camera: CameraModel,
    marker_size: f64,
    marker_id: Option<u32>,
    control: MeasureControl,
}

impl MeasureTask {
    pub fn new(config: &AppConfig, camera: CameraModel) -> Result<(Self, MeasureControl), SessionError> {
        camera.intrinsics.validate()?;
        let dictionary = config.markers.load_dictionary()?;
        let detector = MarkerDetector::new(dictionary, config.markers.params.clone()).map_err(DetectError::from)?;
        let control = MeasureControl::new(MeasurementSession::new(config.measurement)?);
        info!(
            "tracking {} with {} m markers",
            config
                .markers
                .marker_id
                .map_or_else(|| "the first marker".to_string(), |id| format!("marker {id}")),
            config.markers.marker_size_m
        );
        let task = Self {
            detector,
            camera,
            marker_size: config.markers.marker_size_m,
            marker_id: config.markers.marker_id,
            control: control.clone(),
        };
        Ok((task, control))
    }

    fn status(&self, tracked: bool) -> String {
        let session = lock(&self.control.session);
        let tracking = if tracked { "marker tracked" } else { "marker not found" };
        match session.result() {
            Some(m) => format!("{m} ({tracking})"),
            None if session.is_active() => {
                format!("{}, {} points ({tracking})", session.state(), session.points().len())
            }
            None => tracking.to_string(),
        }
    }
}

impl FrameTask for MeasureTask {
    fn on_frame(&mut self, index: usize, frame: RgbImage) -> Result<SessionUpdate, SessionError> {
        let markers = self.detector.detect_rgb(&frame);
        let poses = marker_poses(&markers, self.marker_size, &self.camera);
        let mut out = frame;
        for m in &markers {
            draw_marker(&mut out, m);
        }

        let tracked = match select_marker(&poses, self.marker_id) {
            Some(mp) => {
                self.control.pose.publish(mp.pose);
                draw_axes(&mut out, &self.camera, &mp.pose, self.marker_size);
                let tip = lock(&self.control.session).pointer_tip(&mp.pose);
                draw_point(&mut out, &self.camera, &tip, YELLOW);
                true
            }
            None => {
                self.control.pose.take();
                debug!("frame {index}: tracked marker not visible");
                false
            }
        };

        {
            let session = lock(&self.control.session);
            let closed = session.config().mode == MeasurementMode::Area
                && session.state() == MeasurementState::Complete;
            draw_polyline(&mut out, &self.camera, session.points(), closed, MAGENTA);
        }

        let status = self.status(tracked);
        Ok(SessionUpdate::frame(index, out).with_status(status))
    }

    fn finish(self, frames: usize) -> SessionSummary {
        self.control.pose.take();
        SessionSummary {
            frames,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camgauge_core::{Distortion, Intrinsics};
    use camgauge_measure::MeasurementConfig;
    use nalgebra::{Rotation3, Vector3};

    fn at(z: f64) -> Pose {
        Pose::new(Rotation3::identity(), Vector3::new(0.0, 0.0, z))
    }

    #[test]
    fn commit_consumes_the_pose() {
        let cfg = MeasurementConfig {
            pointer_offset_m: 0.0,
            ..MeasurementConfig::distance()
        };
        let control = MeasureControl::new(MeasurementSession::new(cfg).unwrap());
        control.start();
        assert!(matches!(control.commit(), Err(SessionError::NoPose)));

        let slot = control.pose_slot();
        slot.publish(at(2.0));
        slot.publish(at(1.0));
        assert_eq!(control.commit().unwrap(), Point3::new(0.0, 0.0, 1.0));
        assert!(matches!(control.commit(), Err(SessionError::NoPose)));

        slot.publish(at(2.0));
        control.commit().unwrap();
        let m = control.finish().unwrap();
        assert_eq!(m.to_string(), "100.00 cm");
        assert_eq!(control.state(), MeasurementState::Complete);
        assert_eq!(control.points().len(), 2);
    }

    #[test]
    fn zero_intrinsics_refused_at_start() {
        let camera = CameraModel::new(Intrinsics::new(0.0, 0.0, 0.0, 0.0), Distortion::default());
        assert!(matches!(
            MeasureTask::new(&AppConfig::default(), camera),
            Err(SessionError::Camera(_))
        ));
    }
}
