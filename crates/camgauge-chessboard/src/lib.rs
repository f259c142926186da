//! Chessboard detector built on top of ChESS corners.
//!
//! Pipeline:
//! 1. ChESS saddle points (`chess-corners`), filtered by response.
//! 2. A k-d tree neighbor graph over the corners.
//! 3. BFS labeling with a locally propagated grid basis, so perspective and
//!    lens distortion are tolerated.
//! 4. A component covering exactly `cols × rows` cells (either orientation)
//!    is accepted and re-labeled so rows run along image `+x`.
//! 5. Gradient-orthogonality sub-pixel refinement.

mod corner;
mod detector;
mod geom;
mod gridgraph;
mod params;
mod subpix;

pub use corner::Corner;
pub use detector::{
    default_chess_config, detect_corners, object_points, ChessboardDetection, ChessboardDetector,
    ChessboardError,
};
pub use gridgraph::{label_from_seed, GridGraph, GridLabeling, LabeledGrid, NodeNeighbor};
pub use params::{ChessboardParams, ChessboardSpec, GridGraphParams, SubPixParams};
pub use subpix::{refine_corner, refine_corners};

pub use chess_corners::ChessConfig;
