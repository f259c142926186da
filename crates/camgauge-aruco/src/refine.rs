//! Sub-pixel marker corners from the four frame edges.
//!
//! Each side is sampled along its normal for the strongest intensity
//! derivative, a line is fitted through the edge points, and every corner
//! becomes the intersection of its two adjacent lines.

use camgauge_core::{sample_bilinear, GrayImageView};
use log::trace;
use nalgebra::{Point2, Vector2};

/// Edge samples per side.
const SAMPLES: usize = 24;
/// Fraction of each side skipped next to the corners.
const SIDE_MARGIN: f64 = 0.15;
/// Spacing of the normal search, pixels.
const STEP: f64 = 0.5;
/// Weakest derivative (gray levels per pixel) accepted as an edge.
const MIN_GRADIENT: f64 = 2.0;

/// Signed offset along `n` of the strongest edge near `p`, within
/// `±half_width` pixels; parabolic peak interpolation.
fn edge_offset(view: &GrayImageView<'_>, p: Point2<f64>, n: Vector2<f64>, half_width: f64) -> Option<f64> {
    let reach = half_width + 2.0 * STEP;
    let (lo, hi) = (p + n * -reach, p + n * reach);
    if !(view.contains(lo.x, lo.y) && view.contains(hi.x, hi.y)) {
        return None;
    }

    let count = (half_width / STEP).round() as i32;
    let derivative = |t: f64| {
        let a = p + n * (t + STEP);
        let b = p + n * (t - STEP);
        (sample_bilinear(view, a.x, a.y) - sample_bilinear(view, b.x, b.y)).abs() / (2.0 * STEP)
    };
    let values: Vec<f64> = (-count..=count).map(|i| derivative(i as f64 * STEP)).collect();
    let (peak, &strongest) = values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    if peak == 0 || peak + 1 == values.len() || strongest < MIN_GRADIENT {
        return None;
    }

    let (dm, d0, dp) = (values[peak - 1], strongest, values[peak + 1]);
    let den = dm - 2.0 * d0 + dp;
    let sub = if den.abs() < 1e-12 { 0.0 } else { 0.5 * (dm - dp) / den };
    Some((peak as f64 - count as f64 + sub) * STEP)
}

/// Total least squares line: centroid and unit direction.
fn fit_line(points: &[Point2<f64>]) -> (Point2<f64>, Vector2<f64>) {
    let n = points.len() as f64;
    let c = points.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for p in points {
        let d = p.coords - c;
        sxx += d.x * d.x;
        syy += d.y * d.y;
        sxy += d.x * d.y;
    }
    let angle = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    (Point2::from(c), Vector2::new(angle.cos(), angle.sin()))
}

fn intersect(a: (Point2<f64>, Vector2<f64>), b: (Point2<f64>, Vector2<f64>)) -> Option<Point2<f64>> {
    let (c1, d1) = a;
    let (c2, d2) = b;
    let det = d2.x * d1.y - d1.x * d2.y;
    if det.abs() < 1e-6 {
        return None;
    }
    let r = c2 - c1;
    let s = (d2.x * r.y - r.x * d2.y) / det;
    Some(c1 + d1 * s)
}

/// Refine the corners of a quad whose sides lie on intensity edges.
///
/// Corners whose side cannot be measured, or that would move further than
/// `half_width + 1` pixels, are returned unchanged.
pub fn refine_corners(view: &GrayImageView<'_>, quad: &[Point2<f64>; 4], half_width: f64) -> [Point2<f64>; 4] {
    let mut lines = Vec::with_capacity(4);
    for i in 0..4 {
        let (a, b) = (quad[i], quad[(i + 1) % 4]);
        let side = b - a;
        let length = side.norm();
        if length < 1e-9 {
            return *quad;
        }
        let e = side / length;
        let normal = Vector2::new(-e.y, e.x);

        let edge: Vec<Point2<f64>> = (0..SAMPLES)
            .filter_map(|k| {
                let t = SIDE_MARGIN + (1.0 - 2.0 * SIDE_MARGIN) * k as f64 / (SAMPLES - 1) as f64;
                let p = a + side * t;
                edge_offset(view, p, normal, half_width).map(|o| p + normal * o)
            })
            .collect();
        if edge.len() < SAMPLES / 2 {
            trace!("side {i}: {} edge points, corners kept", edge.len());
            return *quad;
        }
        lines.push(fit_line(&edge));
    }

    let mut out = *quad;
    for (i, corner) in out.iter_mut().enumerate() {
        if let Some(p) = intersect(lines[(i + 3) % 4], lines[i]) {
            if (p - *corner).norm() <= half_width + 1.0 {
                *corner = p;
            }
        }
    }
    out
}
