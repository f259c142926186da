use crate::decode::SampleGrid;
use crate::dictionary::{Dictionary, DictionaryError};
use crate::matcher::Matcher;
use crate::params::MarkerDetectorParams;
use crate::quad::{find_candidates, suppress_duplicates, Candidate};
use crate::refine::refine_corners;
use crate::threshold::adaptive_threshold_inv;
use camgauge_core::GrayImageView;
use log::{debug, trace};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// One decoded marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerDetection {
    pub id: u32,
    /// The marker's own TL, TR, BR, BL corners in image pixels.
    pub corners: [Point2<f64>; 4],
    pub hamming: u8,
    /// Quarter turns between the dictionary code and the image reading.
    pub rotation: u8,
}

impl MarkerDetection {
    pub fn center(&self) -> Point2<f64> {
        let sum = self.corners.iter().fold(nalgebra::Vector2::zeros(), |acc, p| acc + p.coords);
        Point2::from(sum / 4.0)
    }
}

/// Marker detector bound to one dictionary.
pub struct MarkerDetector {
    dictionary: Dictionary,
    matcher: Matcher,
    grid: SampleGrid,
    params: MarkerDetectorParams,
}

impl MarkerDetector {
    pub fn new(dictionary: Dictionary, params: MarkerDetectorParams) -> Result<Self, DictionaryError> {
        let max_hamming =
            (dictionary.max_correction_bits as f64 * params.error_correction_rate.clamp(0.0, 1.0)).floor() as u8;
        let matcher = Matcher::new(&dictionary, max_hamming)?;
        let grid = SampleGrid::new(
            dictionary.marker_size,
            params.marker_border_bits,
            params.cell_margin_rate,
        )
        .ok_or(DictionaryError::InvalidMarkerSize(dictionary.marker_size))?;
        Ok(Self {
            dictionary,
            matcher,
            grid,
            params,
        })
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn params(&self) -> &MarkerDetectorParams {
        &self.params
    }

    /// Convex quads over all threshold windows, duplicates suppressed.
    pub fn candidates(&self, view: &GrayImageView<'_>) -> Vec<Candidate> {
        let mut all = Vec::new();
        for window in self.params.window_sizes() {
            let binary = adaptive_threshold_inv(view, window, self.params.adaptive_thresh_constant);
            let found = find_candidates(&binary, &self.params);
            trace!("window {window}: {} candidates", found.len());
            all.extend(found);
        }
        suppress_duplicates(all, self.params.min_marker_distance_rate)
    }

    /// Decode one candidate; `None` when it is not a dictionary marker.
    pub fn decode(&self, view: &GrayImageView<'_>, candidate: &Candidate) -> Option<MarkerDetection> {
        let obs = match self.grid.read(
            view,
            &candidate.corners,
            self.params.min_otsu_std_dev,
            self.params.max_erroneous_bits_in_border_rate,
        ) {
            Ok(obs) => obs,
            Err(reason) => {
                trace!("candidate rejected: {reason:?}");
                return None;
            }
        };
        let Some(m) = self.matcher.match_code(obs.code) else {
            trace!("code {:#x} not in {}", obs.code, self.dictionary.name);
            return None;
        };
        let r = m.rotation as usize;
        let q = candidate.corners;
        Some(MarkerDetection {
            id: m.id,
            corners: [q[r % 4], q[(r + 1) % 4], q[(r + 2) % 4], q[(r + 3) % 4]],
            hamming: m.hamming,
            rotation: m.rotation,
        })
    }

    /// Detect all markers in a grayscale image, sorted by id.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, img), fields(width = img.width(), height = img.height()))
    )]
    pub fn detect(&self, img: &::image::GrayImage) -> Vec<MarkerDetection> {
        let view = GrayImageView {
            width: img.width() as usize,
            height: img.height() as usize,
            data: img.as_raw(),
        };
        let candidates = self.candidates(&view);
        let mut out: Vec<MarkerDetection> = candidates
            .iter()
            .filter_map(|c| self.decode(&view, c))
            .collect();
        if self.params.corner_refinement {
            let half_width = self.params.corner_refinement_win_size.max(1) as f64;
            for det in &mut out {
                det.corners = refine_corners(&view, &det.corners, half_width);
            }
        }
        out.sort_by_key(|d| d.id);
        debug!("{} candidates, {} markers", candidates.len(), out.len());
        out
    }

    pub fn detect_rgb(&self, frame: &::image::RgbImage) -> Vec<MarkerDetection> {
        self.detect(&::image::imageops::grayscale(frame))
    }
}

/// One-shot detection.
pub fn detect_markers(
    img: &::image::GrayImage,
    dictionary: &Dictionary,
    params: &MarkerDetectorParams,
) -> Result<Vec<MarkerDetection>, DictionaryError> {
    Ok(MarkerDetector::new(dictionary.clone(), params.clone())?.detect(img))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::builtin_dictionary;
    use crate::render::render_marker;

    #[test]
    fn corners_follow_marker_orientation() {
        let dict = builtin_dictionary("GEN_4X4_50").unwrap();
        let detector = MarkerDetector::new(dict.clone(), MarkerDetectorParams::default()).unwrap();
        let img = render_marker(dict, 3, 12, 2).unwrap();
        let view = GrayImageView {
            width: img.width() as usize,
            height: img.height() as usize,
            data: img.as_raw(),
        };
        // Marker spans 6 cells starting 2 cells in: pixel edges 24 and 96.
        let (a, b) = (23.5, 95.5);
        let seen = [
            Point2::new(a, b),
            Point2::new(a, a),
            Point2::new(b, a),
            Point2::new(b, b),
        ];
        // Same square, corner list starting at the bottom-left corner.
        let det = detector
            .decode(&view, &Candidate { corners: seen, perimeter: 280 })
            .expect("decoded");
        assert_eq!(det.id, 3);
        assert_eq!(det.rotation, 1);
        assert_eq!(det.corners[0], Point2::new(a, a));
        assert_eq!(det.corners[2], Point2::new(b, b));
    }

    #[test]
    fn strict_matching_when_correction_rate_is_zero() {
        let dict = builtin_dictionary("GEN_6X6_250").unwrap();
        let params = MarkerDetectorParams {
            error_correction_rate: 0.0,
            ..Default::default()
        };
        let detector = MarkerDetector::new(dict.clone(), params).unwrap();
        assert_eq!(detector.matcher.max_hamming(), 0);
    }
}
