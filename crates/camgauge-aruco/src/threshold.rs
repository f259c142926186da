//! Thresholding for candidate search and bit decoding.

use camgauge_core::GrayImageView;
use image::{GrayImage, Luma};

/// Otsu threshold of a set of intensities.
///
/// Degenerate inputs (empty, constant or two-valued) fall back to the
/// midpoint of the observed range.
pub(crate) fn otsu_threshold_from_samples(samples: &[u8]) -> u8 {
    if samples.is_empty() {
        return 127;
    }
    let (min_v, max_v) = samples
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if min_v == max_v {
        return min_v;
    }

    let mut hist = [0u32; 256];
    for &v in samples {
        hist[v as usize] += 1;
    }
    if hist.iter().filter(|&&h| h > 0).count() <= 2 {
        return ((min_v as u16 + max_v as u16) / 2) as u8;
    }

    let total = samples.len() as f64;
    let sum_total: f64 = hist.iter().enumerate().map(|(i, &h)| i as f64 * h as f64).sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;
    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }
        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;
        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }
    best_t
}

/// Standard deviation of a set of intensities.
pub(crate) fn std_dev(samples: &[u8]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&v| v as f64).sum::<f64>() / n;
    (samples.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Summed-area table with a zero first row and column.
struct IntegralImage {
    stride: usize,
    sums: Vec<u64>,
}

impl IntegralImage {
    fn new(img: &GrayImageView<'_>) -> Self {
        let stride = img.width + 1;
        let mut sums = vec![0u64; stride * (img.height + 1)];
        for y in 0..img.height {
            let mut row = 0u64;
            for x in 0..img.width {
                row += img.data[y * img.width + x] as u64;
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self { stride, sums }
    }

    /// Sum over the half-open box `[x0, x1) × [y0, y1)`.
    #[inline]
    fn box_sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
        let s = self.stride;
        self.sums[y1 * s + x1] + self.sums[y0 * s + x0] - self.sums[y0 * s + x1] - self.sums[y1 * s + x0]
    }
}

/// Inverted mean adaptive threshold.
///
/// A pixel becomes foreground (255) when it is at least `constant` darker
/// than the mean of the `window × window` box around it (clipped at the image
/// border), so dark marker borders come out as foreground blobs.
pub fn adaptive_threshold_inv(img: &GrayImageView<'_>, window: u32, constant: f64) -> GrayImage {
    let integral = IntegralImage::new(img);
    let r = (window.max(3) / 2) as usize;
    let (w, h) = (img.width, img.height);
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let x0 = x.saturating_sub(r);
        let y0 = y.saturating_sub(r);
        let x1 = (x + r + 1).min(w);
        let y1 = (y + r + 1).min(h);
        let area = ((x1 - x0) * (y1 - y0)) as f64;
        let mean = integral.box_sum(x0, y0, x1, y1) as f64 / area;
        let v = img.data[y * w + x] as f64;
        Luma([if v <= mean - constant { 255 } else { 0 }])
    })
}
