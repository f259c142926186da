//! Bit sampling of a candidate quad.

use crate::threshold::{otsu_threshold_from_samples, std_dev};
use camgauge_core::{homography_from_4pt, sample_bilinear, GrayImageView, Homography};
use nalgebra::Point2;

/// Sub-samples per cell side.
const SUBDIV: usize = 3;

/// Raw reading of one candidate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkerObservation {
    /// Inner bits, row-major, black = 1, in the candidate's corner order.
    pub code: u64,
    /// Fraction of border cells read as black.
    pub border_score: f32,
}

/// Why a candidate produced no code.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DecodeReject {
    Degenerate,
    OutOfImage,
    LowContrast(f64),
    Border { errors: usize, allowed: usize },
}

/// Precomputed sample positions in canonical marker coordinates, one unit
/// per cell.
pub struct SampleGrid {
    cells: usize,
    bits: usize,
    border: usize,
    /// `(cell index, point)` pairs, `cell index = cy * cells + cx`.
    points: Vec<(usize, Point2<f64>)>,
}

impl SampleGrid {
    pub fn new(bits: usize, border: usize, margin_rate: f64) -> Option<Self> {
        if bits == 0 || bits * bits > 64 {
            return None;
        }
        let cells = bits + 2 * border;
        let margin = margin_rate.clamp(0.0, 0.45);
        let span = 1.0 - 2.0 * margin;
        let mut points = Vec::with_capacity(cells * cells * SUBDIV * SUBDIV);
        for cy in 0..cells {
            for cx in 0..cells {
                for sy in 0..SUBDIV {
                    for sx in 0..SUBDIV {
                        let u = cx as f64 + margin + (sx as f64 + 0.5) * span / SUBDIV as f64;
                        let v = cy as f64 + margin + (sy as f64 + 0.5) * span / SUBDIV as f64;
                        points.push((cy * cells + cx, Point2::new(u, v)));
                    }
                }
            }
        }
        Some(Self {
            cells,
            bits,
            border,
            points,
        })
    }

    /// Canonical corners TL, TR, BR, BL of the whole marker.
    fn canonical_corners(&self) -> [Point2<f64>; 4] {
        let s = self.cells as f64;
        [
            Point2::new(0.0, 0.0),
            Point2::new(s, 0.0),
            Point2::new(s, s),
            Point2::new(0.0, s),
        ]
    }

    /// Homography from canonical marker coordinates to the image quad.
    pub fn warp_to(&self, quad: &[Point2<f64>; 4]) -> Option<Homography> {
        homography_from_4pt(&self.canonical_corners(), quad)
    }

    /// Read the code of `quad` (corner order TL, TR, BR, BL as seen).
    pub fn read(
        &self,
        img: &GrayImageView<'_>,
        quad: &[Point2<f64>; 4],
        min_std_dev: f64,
        max_border_error_rate: f64,
    ) -> Result<MarkerObservation, DecodeReject> {
        let h = self.warp_to(quad).ok_or(DecodeReject::Degenerate)?;

        let mut raw = Vec::with_capacity(self.points.len());
        let mut sums = vec![0.0f64; self.cells * self.cells];
        for &(cell, p) in &self.points {
            let q = h.apply(p);
            if !img.contains(q.x, q.y) {
                return Err(DecodeReject::OutOfImage);
            }
            let v = sample_bilinear(img, q.x, q.y);
            sums[cell] += v;
            raw.push(v.round().clamp(0.0, 255.0) as u8);
        }

        let spread = std_dev(&raw);
        if spread < min_std_dev {
            return Err(DecodeReject::LowContrast(spread));
        }
        let thr = otsu_threshold_from_samples(&raw) as f64;
        let per_cell = (SUBDIV * SUBDIV) as f64;
        let is_black = |cell: usize| sums[cell] / per_cell <= thr;

        let cells = self.cells;
        let mut border_total = 0usize;
        let mut border_black = 0usize;
        let mut code = 0u64;
        for cy in 0..cells {
            for cx in 0..cells {
                let idx = cy * cells + cx;
                let in_border = cx < self.border
                    || cy < self.border
                    || cx >= cells - self.border
                    || cy >= cells - self.border;
                if in_border {
                    border_total += 1;
                    if is_black(idx) {
                        border_black += 1;
                    }
                } else if is_black(idx) {
                    let bit = (cy - self.border) * self.bits + (cx - self.border);
                    code |= 1u64 << bit;
                }
            }
        }

        let errors = border_total - border_black;
        let allowed = (max_border_error_rate * border_total as f64).floor() as usize;
        if errors > allowed {
            return Err(DecodeReject::Border { errors, allowed });
        }
        let border_score = if border_total == 0 {
            1.0
        } else {
            border_black as f32 / border_total as f32
        };
        Ok(MarkerObservation { code, border_score })
    }
}
