use camgauge_core::Axis;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementMode {
    /// Two points, Euclidean distance.
    #[default]
    Distance,
    /// Three or more vertices, planar polygon area.
    Area,
}

/// Fixed for the lifetime of a session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    pub mode: MeasurementMode,
    /// Distance of the pointer tip from the marker origin, meters.
    pub pointer_offset_m: f64,
    /// Marker axis the pointer extends along.
    pub pointer_axis: Axis,
    /// Largest vertex distance from the reference plane, relative to the
    /// polygon extent, accepted for an area.
    pub max_flatness_ratio: f64,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            mode: MeasurementMode::Distance,
            pointer_offset_m: 0.05,
            pointer_axis: Axis::Z,
            max_flatness_ratio: 0.05,
        }
    }
}

impl MeasurementConfig {
    pub fn distance() -> Self {
        Self::default()
    }

    pub fn area() -> Self {
        Self {
            mode: MeasurementMode::Area,
            ..Self::default()
        }
    }
}
