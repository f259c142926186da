//! Metric measurements from marker poses.
//!
//! A [`MeasurementSession`] records pointer-tip points (a fixed offset along
//! one axis of the live marker pose) on explicit commit and turns them into a
//! point-to-point distance or a planar polygon area.

mod config;
mod polygon;
mod session;

pub use config::{MeasurementConfig, MeasurementMode};
pub use polygon::{distance, distance_cm, polygon_area, polygon_area_cm2, polygon_area_signed};
pub use session::{MeasureError, Measurement, MeasurementSession, MeasurementState};
