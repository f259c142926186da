use serde::{Deserialize, Serialize};

/// Board geometry: number of *internal* corners along each axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChessboardSpec {
    /// Internal corners per row (`W`).
    pub cols: u32,
    /// Internal corners per column (`H`).
    pub rows: u32,
}

impl ChessboardSpec {
    pub fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }

    #[inline]
    pub fn corner_count(&self) -> usize {
        self.cols as usize * self.rows as usize
    }
}

/// Neighbor search used to build the corner graph.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GridGraphParams {
    pub min_spacing_pix: f32,
    pub max_spacing_pix: f32,
    pub k_neighbors: usize,
    /// Candidates farther than this multiple of the node's nearest-neighbor
    /// distance are ignored.
    pub max_spacing_ratio: f32,
    /// Max deviation, in cells, of a neighbor offset from an integer grid step.
    pub step_tolerance: f32,
    /// Additionally require ChESS orientations consistent with a grid edge.
    pub check_orientation: bool,
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 4.0,
            max_spacing_pix: 400.0,
            k_neighbors: 8,
            max_spacing_ratio: 1.6,
            step_tolerance: 0.3,
            check_orientation: false,
            orientation_tolerance_deg: 22.5,
        }
    }
}

/// Gradient-orthogonality corner refinement.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubPixParams {
    /// Half size of the search window; 5 gives the usual 11×11 window.
    pub half_window: u32,
    pub max_iters: usize,
    /// Stop once an update moves the corner less than this many pixels.
    pub epsilon: f64,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iters: 30,
            epsilon: 0.001,
        }
    }
}

/// Parameters of the chessboard detector.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChessboardParams {
    /// Minimal ChESS response to keep a corner.
    pub min_strength: f32,
    pub graph: GridGraphParams,
    /// Sub-pixel refinement; `None` keeps the ChESS positions.
    pub subpix: Option<SubPixParams>,
    /// Seeds tried before giving up on a frame.
    pub max_seeds: usize,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            min_strength: 0.0,
            graph: GridGraphParams::default(),
            subpix: Some(SubPixParams::default()),
            max_seeds: 16,
        }
    }
}
