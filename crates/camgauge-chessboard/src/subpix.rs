//! Sub-pixel corner refinement.
//!
//! At a saddle point every image gradient inside a small window is
//! orthogonal to the vector from the corner to the sample, so the corner
//! is the least-squares solution of `Σ g gᵀ (q - c) = 0`. The solve is
//! iterated with the window re-centered on the estimate.

use crate::params::SubPixParams;
use camgauge_core::{sample_bilinear, GrayImageView};
use nalgebra::{Matrix2, Point2, Vector2};

/// Refine one corner; returns `start` unchanged when the window leaves the
/// image, the system is singular or the estimate drifts out of the window.
pub fn refine_corner(img: &GrayImageView<'_>, start: Point2<f64>, params: &SubPixParams) -> Point2<f64> {
    let hw = params.half_window.max(1) as i32;
    let margin = hw as f64 + 1.0;
    let sigma2 = 2.0 * (hw as f64).powi(2);

    let inside = |p: Point2<f64>| {
        p.x >= margin
            && p.y >= margin
            && p.x <= img.width as f64 - 1.0 - margin
            && p.y <= img.height as f64 - 1.0 - margin
    };
    if !inside(start) {
        return start;
    }

    let mut c = start;
    for _ in 0..params.max_iters.max(1) {
        let mut a = Matrix2::<f64>::zeros();
        let mut b = Vector2::<f64>::zeros();
        for dy in -hw..=hw {
            for dx in -hw..=hw {
                let (fx, fy) = (dx as f64, dy as f64);
                let q = Vector2::new(c.x + fx, c.y + fy);
                let gx = 0.5 * (sample_bilinear(img, q.x + 1.0, q.y) - sample_bilinear(img, q.x - 1.0, q.y));
                let gy = 0.5 * (sample_bilinear(img, q.x, q.y + 1.0) - sample_bilinear(img, q.x, q.y - 1.0));
                let w = (-(fx * fx + fy * fy) / sigma2).exp();
                let gg = Matrix2::new(gx * gx, gx * gy, gx * gy, gy * gy) * w;
                a += gg;
                b += gg * q;
            }
        }

        let Some(inv) = a.try_inverse() else {
            return start;
        };
        let next = Point2::from(inv * b);
        if !next.x.is_finite() || !next.y.is_finite() {
            return start;
        }
        let shift = (next - c).norm();
        c = next;
        if (c - start).norm() > hw as f64 || !inside(c) {
            return start;
        }
        if shift < params.epsilon {
            break;
        }
    }
    c
}

/// Refine every corner in place.
pub fn refine_corners(img: &GrayImageView<'_>, corners: &mut [Point2<f64>], params: &SubPixParams) {
    for p in corners.iter_mut() {
        *p = refine_corner(img, *p, params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camgauge_core::GrayImage;

    /// Anti-aliased X junction at `(cx, cy)`.
    fn saddle(width: usize, height: usize, cx: f64, cy: f64) -> GrayImage {
        let mut img = GrayImage::new(width, height);
        const SS: usize = 8;
        for y in 0..height {
            for x in 0..width {
                let mut acc = 0.0;
                for sy in 0..SS {
                    for sx in 0..SS {
                        let px = x as f64 - 0.5 + (sx as f64 + 0.5) / SS as f64;
                        let py = y as f64 - 0.5 + (sy as f64 + 0.5) / SS as f64;
                        let dark = (px < cx) != (py < cy);
                        acc += if dark { 20.0 } else { 230.0 };
                    }
                }
                img.data[y * width + x] = (acc / (SS * SS) as f64).round() as u8;
            }
        }
        img
    }

    #[test]
    fn converges_to_true_saddle() {
        let img = saddle(40, 40, 19.3, 20.6);
        let refined = refine_corner(&img.view(), Point2::new(18.0, 22.0), &SubPixParams::default());
        assert!((refined.x - 19.3).abs() < 0.1, "{refined:?}");
        assert!((refined.y - 20.6).abs() < 0.1, "{refined:?}");
    }

    #[test]
    fn border_corners_are_left_alone() {
        let img = saddle(40, 40, 3.0, 3.0);
        let start = Point2::new(3.0, 3.0);
        assert_eq!(refine_corner(&img.view(), start, &SubPixParams::default()), start);
    }

    #[test]
    fn flat_patch_keeps_start() {
        let img = GrayImage {
            width: 30,
            height: 30,
            data: vec![128; 900],
        };
        let start = Point2::new(15.0, 15.0);
        assert_eq!(refine_corner(&img.view(), start, &SubPixParams::default()), start);
    }
}
