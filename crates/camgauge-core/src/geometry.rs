//! Correspondence sets and rigid poses.

use nalgebra::{Point2, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Invalid geometric input.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("correspondence set is empty")]
    EmptySet,
    #[error("mismatched correspondence lengths (image={image}, object={object})")]
    MismatchedLengths { image: usize, object: usize },
}

/// Paired 2D observations and 3D reference points of one target in one frame.
///
/// Pairing is positional: `image_points[i]` observes `object_points[i]`.
/// Fields are public so sets can be deserialized or assembled incrementally;
/// consumers call [`CorrespondenceSet::validate`] before using them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceSet {
    pub image_points: Vec<Point2<f64>>,
    pub object_points: Vec<Point3<f64>>,
}

impl CorrespondenceSet {
    pub fn new(
        image_points: Vec<Point2<f64>>,
        object_points: Vec<Point3<f64>>,
    ) -> Result<Self, GeometryError> {
        let set = Self {
            image_points,
            object_points,
        };
        set.validate()?;
        Ok(set)
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.image_points.len() != self.object_points.len() {
            return Err(GeometryError::MismatchedLengths {
                image: self.image_points.len(),
                object: self.object_points.len(),
            });
        }
        if self.image_points.is_empty() {
            return Err(GeometryError::EmptySet);
        }
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.image_points.len().min(self.object_points.len())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate `(object, image)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&Point3<f64>, &Point2<f64>)> {
        self.object_points.iter().zip(self.image_points.iter())
    }

    /// True when every object point lies on the `z = 0` plane within `tol`.
    pub fn is_planar(&self, tol: f64) -> bool {
        self.object_points.iter().all(|p| p.z.abs() <= tol)
    }
}

/// One of the three local axes of a pose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    #[default]
    Z,
}

impl Axis {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Rigid transform from a target frame into the camera frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Rotation3::identity(), Vector3::zeros())
    }

    /// Build a pose from a Rodrigues (axis-angle) vector and a translation.
    pub fn from_rvec_tvec(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self::new(Rotation3::new(rvec), tvec)
    }

    /// Rodrigues vector of the rotation.
    pub fn rvec(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * p.coords + self.translation)
    }

    /// Direction of a local axis expressed in camera coordinates.
    pub fn axis(&self, axis: Axis) -> Vector3<f64> {
        self.rotation.matrix().column(axis.index()).into_owned()
    }

    /// Camera-frame point at `offset` along a local axis from the pose origin.
    pub fn offset_point(&self, axis: Axis, offset: f64) -> Point3<f64> {
        Point3::from(self.translation + self.axis(axis) * offset)
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self::new(rotation, -(rotation * self.translation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn validate_rejects_mismatch_and_empty() {
        let set = CorrespondenceSet {
            image_points: vec![Point2::new(0.0, 0.0); 3],
            object_points: vec![Point3::origin(); 2],
        };
        assert_eq!(
            set.validate(),
            Err(GeometryError::MismatchedLengths {
                image: 3,
                object: 2
            })
        );
        assert_eq!(
            CorrespondenceSet::new(vec![], vec![]),
            Err(GeometryError::EmptySet)
        );
    }

    #[test]
    fn rvec_round_trip_and_inverse() {
        let rvec = Vector3::new(0.1, -0.3, 0.2);
        let pose = Pose::from_rvec_tvec(rvec, Vector3::new(0.1, 0.2, 1.5));
        assert_relative_eq!(pose.rvec(), rvec, epsilon = 1e-12);

        let p = Point3::new(0.3, -0.2, 0.05);
        let back = pose.inverse().transform_point(&pose.transform_point(&p));
        assert_relative_eq!(back, p, epsilon = 1e-12);
    }

    #[test]
    fn offset_point_follows_local_axis() {
        let pose = Pose::from_rvec_tvec(
            Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            Vector3::new(0.0, 0.0, 1.0),
        );
        // Local x maps onto camera y after a quarter turn about z.
        let tip = pose.offset_point(Axis::X, 0.05);
        assert_relative_eq!(tip, Point3::new(0.0, 0.05, 1.0), epsilon = 1e-12);
    }
}
