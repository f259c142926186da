//! Whole-frame distortion correction.

use camgauge_core::{CameraError, CameraModel, Distortion, Intrinsics};
use image::{ImageBuffer, Pixel};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum UndistortError {
    /// Zero, non-finite or otherwise unusable camera matrix.
    #[error("cannot correct distortion: {0}")]
    InvalidIntrinsics(CameraError),
    #[error("distortion coefficients must be finite")]
    NonFiniteDistortion,
    #[error("point {0} could not be undistorted")]
    Diverged(usize),
}

fn camera(intrinsics: &Intrinsics, distortion: &Distortion) -> Result<CameraModel, UndistortError> {
    intrinsics.validate().map_err(UndistortError::InvalidIntrinsics)?;
    if distortion.coeffs().iter().any(|c| !c.is_finite()) {
        return Err(UndistortError::NonFiniteDistortion);
    }
    Ok(CameraModel::new(*intrinsics, *distortion))
}

/// Bilinear sample of all channels at `(x, y)`; `None` outside the image.
///
/// Integer coordinates reproduce the source pixel exactly.
fn sample<P>(src: &ImageBuffer<P, Vec<u8>>, x: f64, y: f64, out: &mut [u8]) -> bool
where
    P: Pixel<Subpixel = u8>,
{
    const EDGE_TOL: f64 = 1e-6;
    let (w, h) = src.dimensions();
    let (xmax, ymax) = ((w - 1) as f64, (h - 1) as f64);
    if !(x >= -EDGE_TOL && y >= -EDGE_TOL && x <= xmax + EDGE_TOL && y <= ymax + EDGE_TOL) {
        return false;
    }
    let x = x.clamp(0.0, xmax);
    let y = y.clamp(0.0, ymax);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;
    let p00 = src.get_pixel(x0, y0).channels();
    let p10 = src.get_pixel(x1, y0).channels();
    let p01 = src.get_pixel(x0, y1).channels();
    let p11 = src.get_pixel(x1, y1).channels();
    for (c, o) in out.iter_mut().enumerate() {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        *o = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    true
}

/// Output pixel `(x, y)` takes the source sample at `map(x, y)`; unmapped or
/// out-of-image pixels stay black.
fn remap<P, F>(src: &ImageBuffer<P, Vec<u8>>, map: F) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
    F: Fn(Point2<f64>) -> Option<Point2<f64>>,
{
    let (w, h) = src.dimensions();
    let mut out: ImageBuffer<P, Vec<u8>> = ImageBuffer::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }
    let channels = P::CHANNEL_COUNT as usize;
    let mut buf = vec![0u8; channels];
    for y in 0..h {
        for x in 0..w {
            let Some(s) = map(Point2::new(x as f64, y as f64)) else {
                continue;
            };
            if sample(src, s.x, s.y, &mut buf) {
                out.get_pixel_mut(x, y).channels_mut().copy_from_slice(&buf);
            }
        }
    }
    out
}

/// Remove lens distortion from `frame`.
///
/// Each output pixel is treated as an ideal pixel, pushed through the
/// distortion model and bilinearly sampled from `frame`. The output has the
/// same size and intrinsics as the input.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(width = frame.width(), height = frame.height()))
)]
pub fn undistort<P>(
    frame: &ImageBuffer<P, Vec<u8>>,
    intrinsics: &Intrinsics,
    distortion: &Distortion,
) -> Result<ImageBuffer<P, Vec<u8>>, UndistortError>
where
    P: Pixel<Subpixel = u8>,
{
    let camera = camera(intrinsics, distortion)?;
    Ok(remap(frame, |p| Some(camera.distort_pixel(p))))
}

/// Apply lens distortion to an ideal `frame`; the inverse of [`undistort`].
pub fn distort<P>(
    frame: &ImageBuffer<P, Vec<u8>>,
    intrinsics: &Intrinsics,
    distortion: &Distortion,
) -> Result<ImageBuffer<P, Vec<u8>>, UndistortError>
where
    P: Pixel<Subpixel = u8>,
{
    let camera = camera(intrinsics, distortion)?;
    Ok(remap(frame, |p| camera.undistort_pixel(p)))
}

/// Ideal pixel positions of observed (distorted) points.
pub fn undistort_points(
    points: &[Point2<f64>],
    intrinsics: &Intrinsics,
    distortion: &Distortion,
) -> Result<Vec<Point2<f64>>, UndistortError> {
    let camera = camera(intrinsics, distortion)?;
    points
        .iter()
        .enumerate()
        .map(|(i, p)| camera.undistort_pixel(*p).ok_or(UndistortError::Diverged(i)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camgauge_core::DistortionModel;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn sinusoid(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let v = 128.0
                + 60.0 * (x as f64 * std::f64::consts::TAU / 40.0).sin()
                + 50.0 * (y as f64 * std::f64::consts::TAU / 48.0).cos();
            Luma([v.round() as u8])
        })
    }

    fn lens() -> (Intrinsics, Distortion) {
        let mut d = Distortion::zero(DistortionModel::BrownConrady5);
        d.set_coeffs(&[-0.06, 0.01, 0.0005, -0.0003, 0.0]);
        (Intrinsics::new(300.0, 300.0, 160.0, 120.0), d)
    }

    #[test]
    fn identity_camera_is_pixel_identical() {
        let frame = RgbImage::from_fn(37, 23, |x, y| Rgb([(x * 7) as u8, (y * 11) as u8, (x ^ y) as u8]));
        let out = undistort(
            &frame,
            &Intrinsics::identity(),
            &Distortion::zero(DistortionModel::BrownConrady5),
        )
        .unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn zero_distortion_keeps_any_intrinsics() {
        let frame = sinusoid(64, 48);
        let k = Intrinsics::new(500.0, 480.0, 31.5, 24.0);
        let out = undistort(&frame, &k, &Distortion::default()).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn undistort_inverts_distort_in_interior() {
        let (k, d) = lens();
        let frame = sinusoid(320, 240);
        let distorted = distort(&frame, &k, &d).unwrap();
        assert_ne!(distorted, frame);
        let restored = undistort(&distorted, &k, &d).unwrap();

        let mut max_err = 0i32;
        let mut sum = 0i64;
        let mut n = 0i64;
        for y in 30..210 {
            for x in 30..290 {
                let e = (restored.get_pixel(x, y)[0] as i32 - frame.get_pixel(x, y)[0] as i32).abs();
                max_err = max_err.max(e);
                sum += e as i64;
                n += 1;
            }
        }
        assert!(max_err <= 4, "max error {max_err}");
        assert!((sum as f64 / n as f64) < 1.0);
    }

    #[test]
    fn pixels_outside_the_source_are_black() {
        let mut d = Distortion::zero(DistortionModel::BrownConrady5);
        d.k1 = 0.4;
        let frame = GrayImage::from_pixel(80, 60, Luma([200]));
        let k = Intrinsics::new(60.0, 60.0, 40.0, 30.0);
        let out = undistort(&frame, &k, &d).unwrap();
        // Corners map far outside the frame under strong pincushion.
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(40, 30)[0], 200);
    }

    #[test]
    fn invalid_intrinsics_are_rejected() {
        let frame = GrayImage::new(8, 8);
        let zero = Intrinsics::new(0.0, 0.0, 0.0, 0.0);
        assert!(matches!(
            undistort(&frame, &zero, &Distortion::default()),
            Err(UndistortError::InvalidIntrinsics(_))
        ));
        let mut d = Distortion::default();
        d.k2 = f64::NAN;
        assert_eq!(
            undistort(&frame, &Intrinsics::identity(), &d),
            Err(UndistortError::NonFiniteDistortion)
        );
    }

    #[test]
    fn points_round_trip_through_the_model() {
        let (k, d) = lens();
        let cam = CameraModel::new(k, d);
        let ideal = vec![Point2::new(20.0, 15.0), Point2::new(160.0, 120.0), Point2::new(300.0, 220.0)];
        let observed: Vec<Point2<f64>> = ideal.iter().map(|p| cam.distort_pixel(*p)).collect();
        let back = undistort_points(&observed, &k, &d).unwrap();
        for (a, b) in ideal.iter().zip(&back) {
            assert!((a - b).norm() < 1e-8);
        }
    }
}
