use chess_corners::CornerDescriptor;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A ChESS saddle point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    /// Pixel position, centers at integer coordinates.
    pub position: Point2<f32>,
    /// Direction of one corner diagonal in radians, defined modulo π.
    pub orientation: f32,
    /// Detector response.
    pub strength: f32,
}

impl Corner {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            position: Point2::new(x, y),
            orientation: 0.0,
            strength: 1.0,
        }
    }
}

impl From<&CornerDescriptor> for Corner {
    fn from(c: &CornerDescriptor) -> Self {
        Self {
            position: Point2::new(c.x, c.y),
            orientation: c.orientation,
            strength: c.response,
        }
    }
}
