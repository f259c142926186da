use serde::{Deserialize, Serialize};

/// Marker detector settings.
///
/// Rates are relative to the larger image dimension (perimeters) or to the
/// candidate's contour length (approximation accuracy, corner distance,
/// duplicate suppression).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarkerDetectorParams {
    pub adaptive_thresh_win_size_min: u32,
    pub adaptive_thresh_win_size_max: u32,
    pub adaptive_thresh_win_size_step: u32,
    /// Darkness below the local mean required for foreground.
    pub adaptive_thresh_constant: f64,
    pub min_marker_perimeter_rate: f64,
    pub max_marker_perimeter_rate: f64,
    pub polygonal_approx_accuracy_rate: f64,
    pub min_corner_distance_rate: f64,
    /// Pixels.
    pub min_distance_to_border: u32,
    pub min_marker_distance_rate: f64,
    /// Width of the black frame in cells.
    pub marker_border_bits: usize,
    pub max_erroneous_bits_in_border_rate: f64,
    /// Candidates whose sampled intensities spread less than this (standard
    /// deviation, gray levels) carry no code.
    pub min_otsu_std_dev: f64,
    /// Fraction of each cell ignored at its edges when sampling.
    pub cell_margin_rate: f64,
    /// Fraction of the dictionary's correction capacity used while matching.
    pub error_correction_rate: f64,
    /// Move decoded corners onto the intersections of fitted frame edges.
    pub corner_refinement: bool,
    /// Half width of the edge search across each side, pixels.
    pub corner_refinement_win_size: u32,
}

impl Default for MarkerDetectorParams {
    fn default() -> Self {
        Self {
            adaptive_thresh_win_size_min: 3,
            adaptive_thresh_win_size_max: 23,
            adaptive_thresh_win_size_step: 10,
            adaptive_thresh_constant: 7.0,
            min_marker_perimeter_rate: 0.03,
            max_marker_perimeter_rate: 4.0,
            polygonal_approx_accuracy_rate: 0.03,
            min_corner_distance_rate: 0.05,
            min_distance_to_border: 3,
            min_marker_distance_rate: 0.05,
            marker_border_bits: 1,
            max_erroneous_bits_in_border_rate: 0.35,
            min_otsu_std_dev: 5.0,
            cell_margin_rate: 0.13,
            error_correction_rate: 0.6,
            corner_refinement: true,
            corner_refinement_win_size: 3,
        }
    }
}

impl MarkerDetectorParams {
    /// Threshold window sizes in use, odd and at least 3.
    pub fn window_sizes(&self) -> Vec<u32> {
        let min = self.adaptive_thresh_win_size_min.max(3);
        let max = self.adaptive_thresh_win_size_max.max(min);
        let step = self.adaptive_thresh_win_size_step.max(1);
        (min..=max)
            .step_by(step as usize)
            .map(|w| if w % 2 == 0 { w + 1 } else { w })
            .collect()
    }
}
