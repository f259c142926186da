use crate::config::{MeasurementConfig, MeasurementMode};
use crate::polygon::{distance, polygon_area_signed};
use camgauge_core::Pose;
use log::{debug, info};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MeasureError {
    #[error("an area needs at least 3 vertices, got {count}")]
    TooFewVertices { count: usize },
    #[error("the first three vertices are collinear")]
    CollinearVertices,
    #[error("vertices deviate {deviation:.4} m from the reference plane (limit {limit:.4} m)")]
    NonPlanar { deviation: f64, limit: f64 },
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: MeasurementState,
        action: &'static str,
    },
    #[error("invalid measurement configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementState {
    #[default]
    Idle,
    AwaitingFirstPoint,
    AwaitingSecondPoint,
    CollectingVertices,
    Complete,
}

impl fmt::Display for MeasurementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MeasurementState::Idle => "idle",
            MeasurementState::AwaitingFirstPoint => "awaiting the first point",
            MeasurementState::AwaitingSecondPoint => "awaiting the second point",
            MeasurementState::CollectingVertices => "collecting vertices",
            MeasurementState::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Finished measurement, SI units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    Distance { meters: f64 },
    /// Signed by winding; see [`crate::polygon_area_signed`].
    Area { square_meters: f64 },
}

impl Measurement {
    /// Value in display units: centimeters or square centimeters (unsigned).
    pub fn display_value(&self) -> f64 {
        match *self {
            Measurement::Distance { meters } => meters * 100.0,
            Measurement::Area { square_meters } => square_meters.abs() * 10_000.0,
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measurement::Distance { .. } => write!(f, "{:.2} cm", self.display_value()),
            Measurement::Area { .. } => write!(f, "{:.2} cm²", self.display_value()),
        }
    }
}

/// One measurement session: owns its point list and state.
///
/// Only [`MeasurementSession::commit_point`] appends points; callers hand it
/// the latest pose they hold.
#[derive(Clone, Debug)]
pub struct MeasurementSession {
    config: MeasurementConfig,
    state: MeasurementState,
    points: Vec<Point3<f64>>,
    result: Option<Measurement>,
}

impl MeasurementSession {
    pub fn new(config: MeasurementConfig) -> Result<Self, MeasureError> {
        if !config.pointer_offset_m.is_finite() {
            return Err(MeasureError::InvalidConfig(format!(
                "pointer offset {} is not finite",
                config.pointer_offset_m
            )));
        }
        if !(config.max_flatness_ratio.is_finite() && config.max_flatness_ratio >= 0.0) {
            return Err(MeasureError::InvalidConfig(format!(
                "flatness ratio {} must be a non-negative number",
                config.max_flatness_ratio
            )));
        }
        Ok(Self {
            config,
            state: MeasurementState::Idle,
            points: Vec::new(),
            result: None,
        })
    }

    pub fn config(&self) -> &MeasurementConfig {
        &self.config
    }

    pub fn state(&self) -> MeasurementState {
        self.state
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn result(&self) -> Option<Measurement> {
        self.result
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, MeasurementState::Idle | MeasurementState::Complete)
    }

    /// Pointer tip of `pose` in camera coordinates.
    pub fn pointer_tip(&self, pose: &Pose) -> Point3<f64> {
        pose.offset_point(self.config.pointer_axis, self.config.pointer_offset_m)
    }

    /// Clear all points and enter the first collecting state.
    pub fn start(&mut self) {
        self.points.clear();
        self.result = None;
        self.state = match self.config.mode {
            MeasurementMode::Distance => MeasurementState::AwaitingFirstPoint,
            MeasurementMode::Area => MeasurementState::CollectingVertices,
        };
        debug!("measurement started ({:?})", self.config.mode);
    }

    /// Record the pointer tip of `pose` and advance.
    pub fn commit_point(&mut self, pose: &Pose) -> Result<Point3<f64>, MeasureError> {
        let next = match self.state {
            MeasurementState::AwaitingFirstPoint => MeasurementState::AwaitingSecondPoint,
            MeasurementState::AwaitingSecondPoint => MeasurementState::Complete,
            MeasurementState::CollectingVertices => MeasurementState::CollectingVertices,
            state @ (MeasurementState::Idle | MeasurementState::Complete) => {
                return Err(MeasureError::InvalidTransition {
                    state,
                    action: "commit a point",
                })
            }
        };
        let tip = self.pointer_tip(pose);
        self.points.push(tip);
        debug!("point {} committed at {:?}", self.points.len(), tip.coords);

        if next == MeasurementState::Complete {
            let m = Measurement::Distance {
                meters: distance(&self.points[0], &self.points[1]),
            };
            info!("distance: {m}");
            self.result = Some(m);
        }
        self.state = next;
        Ok(tip)
    }

    /// Close an area polygon and compute its area.
    ///
    /// On error the session keeps collecting, so more vertices can be added.
    pub fn finish(&mut self) -> Result<Measurement, MeasureError> {
        match self.state {
            MeasurementState::CollectingVertices => {
                let area = polygon_area_signed(&self.points, self.config.max_flatness_ratio)?;
                let m = Measurement::Area { square_meters: area };
                info!("area over {} vertices: {m}", self.points.len());
                self.result = Some(m);
                self.state = MeasurementState::Complete;
                Ok(m)
            }
            MeasurementState::Complete => self.result.ok_or(MeasureError::InvalidTransition {
                state: self.state,
                action: "finish",
            }),
            state => Err(MeasureError::InvalidTransition {
                state,
                action: "finish",
            }),
        }
    }

    /// Return to idle and drop all points.
    pub fn stop(&mut self) {
        self.points.clear();
        self.result = None;
        self.state = MeasurementState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use camgauge_core::Axis;
    use nalgebra::{Rotation3, Vector3};

    fn at(x: f64, y: f64, z: f64) -> Pose {
        Pose::new(Rotation3::identity(), Vector3::new(x, y, z))
    }

    #[test]
    fn distance_session_walks_its_states() {
        let mut s = MeasurementSession::new(MeasurementConfig::distance()).unwrap();
        assert_eq!(s.state(), MeasurementState::Idle);
        assert!(s.commit_point(&at(0.0, 0.0, 1.0)).is_err());

        s.start();
        assert_eq!(s.state(), MeasurementState::AwaitingFirstPoint);
        // Tip sits 5 cm along the marker z axis.
        let p = s.commit_point(&at(0.0, 0.0, 0.95)).unwrap();
        assert_relative_eq!(p.z, 1.0, epsilon = 1e-12);
        assert_eq!(s.state(), MeasurementState::AwaitingSecondPoint);
        s.commit_point(&at(0.0, 0.0, 1.95)).unwrap();
        assert_eq!(s.state(), MeasurementState::Complete);

        let m = s.result().unwrap();
        assert_relative_eq!(m.display_value(), 100.0, epsilon = 1e-9);
        assert_eq!(m.to_string(), "100.00 cm");
        assert_eq!(s.finish().unwrap(), m);
        assert!(matches!(
            s.commit_point(&at(0.0, 0.0, 1.0)),
            Err(MeasureError::InvalidTransition { state: MeasurementState::Complete, .. })
        ));

        s.start();
        assert!(s.points().is_empty());
        assert!(s.result().is_none());
        s.stop();
        assert_eq!(s.state(), MeasurementState::Idle);
    }

    #[test]
    fn pointer_axis_and_offset_are_configurable() {
        let cfg = MeasurementConfig {
            pointer_offset_m: 0.2,
            pointer_axis: Axis::X,
            ..MeasurementConfig::distance()
        };
        let s = MeasurementSession::new(cfg).unwrap();
        let pose = Pose::new(
            Rotation3::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2),
            Vector3::new(0.0, 0.0, 1.0),
        );
        let tip = s.pointer_tip(&pose);
        assert_relative_eq!(tip.coords, Vector3::new(0.0, 0.2, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn area_session_requires_three_vertices() {
        let cfg = MeasurementConfig {
            pointer_offset_m: 0.0,
            ..MeasurementConfig::area()
        };
        let mut s = MeasurementSession::new(cfg).unwrap();
        s.start();
        assert_eq!(s.state(), MeasurementState::CollectingVertices);
        s.commit_point(&at(0.0, 0.0, 1.0)).unwrap();
        s.commit_point(&at(0.2, 0.0, 1.0)).unwrap();
        assert_eq!(s.finish(), Err(MeasureError::TooFewVertices { count: 2 }));
        assert_eq!(s.state(), MeasurementState::CollectingVertices);

        s.commit_point(&at(0.2, 0.1, 1.0)).unwrap();
        s.commit_point(&at(0.0, 0.1, 1.0)).unwrap();
        let m = s.finish().unwrap();
        assert_relative_eq!(m.display_value(), 200.0, epsilon = 1e-9);
        assert_eq!(s.state(), MeasurementState::Complete);
        assert_eq!(s.points().len(), 4);

        s.stop();
        assert!(s.points().is_empty());
        assert_eq!(s.finish(), Err(MeasureError::InvalidTransition { state: MeasurementState::Idle, action: "finish" }));
    }

    #[test]
    fn bad_configuration_is_rejected() {
        let cfg = MeasurementConfig {
            pointer_offset_m: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(MeasurementSession::new(cfg), Err(MeasureError::InvalidConfig(_))));
        let cfg = MeasurementConfig {
            max_flatness_ratio: -1.0,
            ..Default::default()
        };
        assert!(MeasurementSession::new(cfg).is_err());
    }

    #[test]
    fn config_json_uses_defaults() {
        let cfg: MeasurementConfig = serde_json::from_str(r#"{"mode": "area", "pointer_axis": "y"}"#).unwrap();
        assert_eq!(cfg.mode, MeasurementMode::Area);
        assert_eq!(cfg.pointer_axis, Axis::Y);
        assert_eq!(cfg.pointer_offset_m, 0.05);
    }
}
