//! Minimal 8-bit grayscale buffers shared by the detectors.
//!
//! Detectors take a borrowed [`GrayImageView`] so that callers can hand over
//! any row-major buffer (an `image::GrayImage`, a camera buffer) without a copy.

/// Borrowed row-major grayscale image.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8],
}

/// Owned row-major grayscale image.
#[derive(Clone, Debug, PartialEq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

impl<'a> GrayImageView<'a> {
    /// Pixel at `(x, y)`, zero outside the image.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0;
        }
        self.data[y as usize * self.width + x as usize]
    }

    /// Pixel at `(x, y)` with coordinates clamped to the image border.
    #[inline]
    pub fn get_clamped(&self, x: i32, y: i32) -> u8 {
        let x = x.clamp(0, self.width as i32 - 1);
        let y = y.clamp(0, self.height as i32 - 1);
        self.data[y as usize * self.width + x as usize]
    }

    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x <= (self.width - 1) as f64 && y <= (self.height - 1) as f64
    }
}

/// Bilinear sample with pixel centers at integer coordinates.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f64, y: f64) -> f64 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = src.get(x0, y0) as f64;
    let p10 = src.get(x0 + 1, y0) as f64;
    let p01 = src.get(x0, y0 + 1) as f64;
    let p11 = src.get(x0 + 1, y0 + 1) as f64;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[inline]
pub fn sample_bilinear_u8(src: &GrayImageView<'_>, x: f64, y: f64) -> u8 {
    sample_bilinear(src, x, y).round().clamp(0.0, 255.0) as u8
}

/// Mean of the 3×3 neighborhood around `(x, y)`, `None` when it leaves the image.
pub fn sample_mean_3x3(img: &GrayImageView<'_>, x: f64, y: f64) -> Option<u8> {
    let ix = x.round() as i32;
    let iy = y.round() as i32;
    if ix < 1 || iy < 1 || ix + 1 >= img.width as i32 || iy + 1 >= img.height as i32 {
        return None;
    }

    let mut sum = 0u32;
    for dy in -1..=1 {
        for dx in -1..=1 {
            sum += img.get(ix + dx, iy + dy) as u32;
        }
    }
    Some((sum / 9) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_is_exact_on_pixel_centers_and_linear_between() {
        let img = GrayImage {
            width: 2,
            height: 2,
            data: vec![0, 100, 50, 150],
        };
        let v = img.view();
        assert_eq!(sample_bilinear(&v, 1.0, 0.0), 100.0);
        assert_eq!(sample_bilinear(&v, 0.5, 0.0), 50.0);
        assert_eq!(sample_bilinear(&v, 0.5, 0.5), 75.0);
    }

    #[test]
    fn mean_3x3_needs_full_neighborhood() {
        let img = GrayImage {
            width: 4,
            height: 4,
            data: vec![90; 16],
        };
        let v = img.view();
        assert_eq!(sample_mean_3x3(&v, 1.0, 2.0), Some(90));
        assert_eq!(sample_mean_3x3(&v, 0.0, 2.0), None);
        assert_eq!(sample_mean_3x3(&v, 3.0, 2.0), None);
    }
}
