//! Distance and planar polygon area of 3D points.

use crate::MeasureError;
use nalgebra::{Point3, Vector3};

const M_TO_CM: f64 = 100.0;
const M2_TO_CM2: f64 = 10_000.0;
/// Reference-normal length below which the first three vertices count as
/// collinear, relative to the squared polygon extent.
const COLLINEAR_TOL: f64 = 1e-9;

/// Euclidean distance, meters.
#[inline]
pub fn distance(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    (b - a).norm()
}

/// Euclidean distance, centimeters.
#[inline]
pub fn distance_cm(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    distance(a, b) * M_TO_CM
}

fn extent(vertices: &[Point3<f64>]) -> f64 {
    let mut best = 0.0f64;
    for (i, a) in vertices.iter().enumerate() {
        for b in &vertices[i + 1..] {
            best = best.max(distance(a, b));
        }
    }
    best
}

/// Index of the largest absolute component.
fn dominant_axis(n: &Vector3<f64>) -> usize {
    let a = n.abs();
    if a.x >= a.y && a.x >= a.z {
        0
    } else if a.y >= a.z {
        1
    } else {
        2
    }
}

/// Signed polygon area in square meters.
///
/// The reference normal comes from the first three vertices. The polygon is
/// projected onto the coordinate plane orthogonal to the normal's dominant
/// component, its shoelace area taken there and divided by
/// `|n_drop| / |n|` to undo the foreshortening. The sign follows the
/// winding as seen from the positive dropped axis.
///
/// Fails for fewer than three vertices, collinear first three vertices, or
/// any vertex farther than `max_flatness_ratio × extent` from the reference
/// plane.
pub fn polygon_area_signed(vertices: &[Point3<f64>], max_flatness_ratio: f64) -> Result<f64, MeasureError> {
    if vertices.len() < 3 {
        return Err(MeasureError::TooFewVertices {
            count: vertices.len(),
        });
    }
    let p0 = vertices[0];
    let normal = (vertices[1] - p0).cross(&(vertices[2] - p0));
    let size = extent(vertices);
    let norm = normal.norm();
    if !(norm > COLLINEAR_TOL * size * size) {
        return Err(MeasureError::CollinearVertices);
    }

    let unit = normal / norm;
    let deviation = vertices
        .iter()
        .map(|v| (v - p0).dot(&unit).abs())
        .fold(0.0, f64::max);
    let limit = max_flatness_ratio * size;
    if deviation > limit {
        return Err(MeasureError::NonPlanar { deviation, limit });
    }

    // Cyclic (a, b) so that a × b points along the dropped axis.
    let drop = dominant_axis(&normal);
    let (ia, ib) = ((drop + 1) % 3, (drop + 2) % 3);
    let n = vertices.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let p = &vertices[i];
            let q = &vertices[(i + 1) % n];
            p[ia] * q[ib] - q[ia] * p[ib]
        })
        .sum();
    let projected = 0.5 * twice;
    Ok(projected * norm / normal[drop].abs())
}

/// Unsigned polygon area, square meters.
pub fn polygon_area(vertices: &[Point3<f64>], max_flatness_ratio: f64) -> Result<f64, MeasureError> {
    polygon_area_signed(vertices, max_flatness_ratio).map(f64::abs)
}

/// Unsigned polygon area, square centimeters.
pub fn polygon_area_cm2(vertices: &[Point3<f64>], max_flatness_ratio: f64) -> Result<f64, MeasureError> {
    polygon_area(vertices, max_flatness_ratio).map(|a| a * M2_TO_CM2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Vector3};

    fn tilted(points: &[(f64, f64)]) -> Vec<Point3<f64>> {
        let r = Rotation3::new(Vector3::new(0.4, -0.7, 0.2));
        let t = Vector3::new(0.1, -0.05, 0.8);
        points
            .iter()
            .map(|&(x, y)| Point3::from(r * Vector3::new(x, y, 0.0) + t))
            .collect()
    }

    #[test]
    fn distance_scenario_and_symmetry() {
        let a = Point3::new(0.0, 0.0, 1.0);
        let b = Point3::new(0.0, 0.0, 2.0);
        assert_relative_eq!(distance_cm(&a, &b), 100.0, epsilon = 1e-12);
        assert_eq!(distance(&a, &b), distance(&b, &a));
        assert_eq!(distance(&a, &a), 0.0);
    }

    #[test]
    fn square_area_in_any_plane() {
        let square = tilted(&[(0.0, 0.0), (0.1, 0.0), (0.1, 0.1), (0.0, 0.1)]);
        assert_relative_eq!(polygon_area_cm2(&square, 0.05).unwrap(), 100.0, epsilon = 1e-9);

        let axis_aligned = [
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 0.2, 1.0),
            Point3::new(0.0, 0.2, 1.3),
            Point3::new(0.0, 0.0, 1.3),
        ];
        assert_relative_eq!(polygon_area(&axis_aligned, 0.05).unwrap(), 0.06, epsilon = 1e-12);
    }

    #[test]
    fn rotation_invariant_and_reversal_flips_sign() {
        let poly = tilted(&[(0.0, 0.0), (0.12, 0.01), (0.15, 0.09), (0.05, 0.14), (-0.02, 0.07)]);
        let base = polygon_area_signed(&poly, 0.05).unwrap();
        for k in 1..poly.len() {
            let mut rotated = poly.clone();
            rotated.rotate_left(k);
            assert_relative_eq!(polygon_area_signed(&rotated, 0.05).unwrap(), base, epsilon = 1e-12);
        }
        let mut reversed = poly.clone();
        reversed.reverse();
        assert_relative_eq!(polygon_area_signed(&reversed, 0.05).unwrap(), -base, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_polygons_are_refused() {
        let two = [Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert_eq!(polygon_area(&two, 0.05), Err(MeasureError::TooFewVertices { count: 2 }));

        let line = [
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.1, 0.0, 1.0),
            Point3::new(0.2, 0.0, 1.0),
            Point3::new(0.1, 0.1, 1.0),
        ];
        assert_eq!(polygon_area(&line, 0.05), Err(MeasureError::CollinearVertices));
    }

    #[test]
    fn flatness_bound() {
        let mut poly = vec![
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.1, 0.0, 1.0),
            Point3::new(0.1, 0.1, 1.0),
            Point3::new(0.0, 0.1, 1.0),
        ];
        // 2 mm off the plane of a ~14 cm polygon passes, 3 cm does not.
        poly[3].z += 0.002;
        assert!(polygon_area(&poly, 0.05).is_ok());
        poly[3].z += 0.028;
        assert!(matches!(polygon_area(&poly, 0.05), Err(MeasureError::NonPlanar { .. })));
    }
}
