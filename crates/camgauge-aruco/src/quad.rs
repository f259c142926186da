//! Marker candidate search: contours of the thresholded image reduced to
//! convex quadrilaterals.

use crate::params::MarkerDetectorParams;
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::approximate_polygon_dp;
use imageproc::point::Point;
use nalgebra::Point2;

/// A convex quadrilateral in clockwise image order (y down).
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub corners: [Point2<f64>; 4],
    /// Number of contour pixels the quad was fitted to.
    pub perimeter: usize,
}

#[inline]
fn cross(o: Point2<f64>, a: Point2<f64>, b: Point2<f64>) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Drop vertices lying within `eps` of the line through their neighbors.
fn drop_flat_vertices(mut poly: Vec<Point2<f64>>, eps: f64) -> Vec<Point2<f64>> {
    let mut changed = true;
    while changed && poly.len() > 3 {
        changed = false;
        let n = poly.len();
        for i in 0..n {
            let prev = poly[(i + n - 1) % n];
            let next = poly[(i + 1) % n];
            let base = (next - prev).norm();
            if base < 1e-9 {
                continue;
            }
            let dist = cross(prev, next, poly[i]).abs() / base;
            if dist < eps {
                poly.remove(i);
                changed = true;
                break;
            }
        }
    }
    poly
}

fn is_convex(q: &[Point2<f64>; 4]) -> bool {
    let signs: Vec<f64> = (0..4)
        .map(|i| cross(q[i], q[(i + 1) % 4], q[(i + 2) % 4]))
        .collect();
    signs.iter().all(|&s| s > 0.0) || signs.iter().all(|&s| s < 0.0)
}

/// Quads from one binarized image.
pub fn find_candidates(binary: &GrayImage, params: &MarkerDetectorParams) -> Vec<Candidate> {
    let (w, h) = binary.dimensions();
    let max_dim = w.max(h) as f64;
    let min_perimeter = (params.min_marker_perimeter_rate * max_dim) as usize;
    let max_perimeter = (params.max_marker_perimeter_rate * max_dim) as usize;
    let border = params.min_distance_to_border as f64;

    let mut out = Vec::new();
    for contour in find_contours::<i32>(binary) {
        if !matches!(contour.border_type, BorderType::Outer) {
            continue;
        }
        let len = contour.points.len();
        if len < min_perimeter.max(4) || len > max_perimeter {
            continue;
        }

        let eps = len as f64 * params.polygonal_approx_accuracy_rate;
        let mut approx: Vec<Point<i32>> = approximate_polygon_dp(&contour.points, eps, true);
        if approx.len() > 1 && approx.first() == approx.last() {
            approx.pop();
        }
        let poly: Vec<Point2<f64>> = approx
            .iter()
            .map(|p| Point2::new(p.x as f64, p.y as f64))
            .collect();
        let poly = drop_flat_vertices(poly, eps);
        let Ok(mut quad) = <[Point2<f64>; 4]>::try_from(poly) else {
            continue;
        };
        if !is_convex(&quad) {
            continue;
        }

        let min_side = (0..4)
            .map(|i| (quad[(i + 1) % 4] - quad[i]).norm())
            .fold(f64::INFINITY, f64::min);
        if min_side < len as f64 * params.min_corner_distance_rate {
            continue;
        }
        let near_border = quad.iter().any(|p| {
            p.x < border || p.y < border || p.x > w as f64 - 1.0 - border || p.y > h as f64 - 1.0 - border
        });
        if near_border {
            continue;
        }

        // Clockwise on screen: positive cross product with y pointing down.
        if cross(quad[0], quad[1], quad[2]) < 0.0 {
            quad.swap(1, 3);
        }
        out.push(Candidate {
            corners: quad,
            perimeter: len,
        });
    }
    out
}

/// Mean corner distance under the best cyclic alignment of two quads.
fn quad_distance(a: &[Point2<f64>; 4], b: &[Point2<f64>; 4]) -> f64 {
    (0..4)
        .map(|shift| (0..4).map(|i| (a[i] - b[(i + shift) % 4]).norm()).sum::<f64>() / 4.0)
        .fold(f64::INFINITY, f64::min)
}

/// Suppress near-identical candidates, keeping the one with the longer contour.
pub fn suppress_duplicates(mut candidates: Vec<Candidate>, rate: f64) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.perimeter.cmp(&a.perimeter));
    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for c in candidates {
        let dup = kept.iter().any(|k| {
            let limit = rate * k.perimeter.min(c.perimeter) as f64;
            quad_distance(&k.corners, &c.corners) < limit
        });
        if !dup {
            kept.push(c);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn blob(width: u32, height: u32, x0: u32, y0: u32, side: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let inside = x >= x0 && x < x0 + side && y >= y0 && y < y0 + side;
            Luma([if inside { 255 } else { 0 }])
        })
    }

    #[test]
    fn square_blob_yields_clockwise_quad() {
        let img = blob(100, 100, 20, 30, 40);
        let cands = find_candidates(&img, &MarkerDetectorParams::default());
        assert_eq!(cands.len(), 1);
        let q = cands[0].corners;
        assert!(cross(q[0], q[1], q[2]) > 0.0);
        let xs: Vec<f64> = q.iter().map(|p| p.x).collect();
        assert!(xs.iter().any(|&x| (x - 20.0).abs() <= 1.0));
        assert!(xs.iter().any(|&x| (x - 59.0).abs() <= 1.0));
    }

    #[test]
    fn tiny_and_border_touching_blobs_are_rejected() {
        let params = MarkerDetectorParams::default();
        assert!(find_candidates(&blob(200, 200, 50, 50, 1), &params).is_empty());
        assert!(find_candidates(&blob(100, 100, 0, 10, 30), &params).is_empty());
    }

    #[test]
    fn flat_vertices_are_removed() {
        let poly = vec![
            Point2::new(0.0, 0.0),
            Point2::new(5.0, 0.1),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        assert_eq!(drop_flat_vertices(poly, 1.0).len(), 4);
    }

    #[test]
    fn duplicates_keep_longer_contour() {
        let square = |o: f64, s: f64| {
            [
                Point2::new(o, o),
                Point2::new(o + s, o),
                Point2::new(o + s, o + s),
                Point2::new(o, o + s),
            ]
        };
        let cands = vec![
            Candidate {
                corners: square(10.0, 40.0),
                perimeter: 150,
            },
            Candidate {
                corners: square(11.0, 39.0),
                perimeter: 160,
            },
            Candidate {
                corners: square(100.0, 40.0),
                perimeter: 150,
            },
        ];
        let kept = suppress_duplicates(cands, 0.05);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].perimeter, 160);
    }
}
