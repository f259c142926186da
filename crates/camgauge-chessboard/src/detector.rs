use crate::corner::Corner;
use crate::gridgraph::{label_from_seed, GridGraph, LabeledGrid};
use crate::params::{ChessboardParams, ChessboardSpec};
use crate::subpix::refine_corners;
use camgauge_core::{CorrespondenceSet, GrayImageView};
use chess_corners::{find_chess_corners_image, ChessConfig};
use log::{debug, trace};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChessboardError {
    #[error("chessboard needs at least 2x2 internal corners, got {cols}x{rows}")]
    InvalidSpec { cols: u32, rows: u32 },
}

/// A found board: `cols × rows` corners in row-major order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChessboardDetection {
    pub spec: ChessboardSpec,
    /// `corners[j * cols + i]` is internal corner `(i, j)`.
    pub corners: Vec<Point2<f64>>,
}

impl ChessboardDetection {
    /// Pair the detected corners with board coordinates for `square_size`.
    pub fn correspondences(&self, square_size: f64) -> CorrespondenceSet {
        CorrespondenceSet {
            image_points: self.corners.clone(),
            object_points: object_points(self.spec, square_size),
        }
    }
}

/// Board coordinates `(i * s, j * s, 0)` in detection order.
pub fn object_points(spec: ChessboardSpec, square_size: f64) -> Vec<Point3<f64>> {
    (0..spec.rows)
        .flat_map(|j| {
            (0..spec.cols).map(move |i| Point3::new(i as f64 * square_size, j as f64 * square_size, 0.0))
        })
        .collect()
}

/// ChESS settings used when the caller does not provide any.
pub fn default_chess_config() -> ChessConfig {
    let mut cfg = ChessConfig::single_scale();
    cfg.params.threshold_rel = 0.2;
    cfg.params.nms_radius = 2;
    cfg
}

/// Raw ChESS corners of a grayscale image.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, cfg), fields(width = img.width(), height = img.height()))
)]
pub fn detect_corners(img: &::image::GrayImage, cfg: &ChessConfig) -> Vec<Corner> {
    find_chess_corners_image(img, cfg)
        .iter()
        .map(Corner::from)
        .collect()
}

fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Chessboard detector for a fixed board size.
pub struct ChessboardDetector {
    spec: ChessboardSpec,
    params: ChessboardParams,
    chess: ChessConfig,
}

impl ChessboardDetector {
    pub fn new(spec: ChessboardSpec, params: ChessboardParams) -> Result<Self, ChessboardError> {
        if spec.cols < 2 || spec.rows < 2 {
            return Err(ChessboardError::InvalidSpec {
                cols: spec.cols,
                rows: spec.rows,
            });
        }
        Ok(Self {
            spec,
            params,
            chess: default_chess_config(),
        })
    }

    pub fn with_chess_config(mut self, chess: ChessConfig) -> Self {
        self.chess = chess;
        self
    }

    pub fn spec(&self) -> ChessboardSpec {
        self.spec
    }

    pub fn params(&self) -> &ChessboardParams {
        &self.params
    }

    /// Assemble the board from pre-computed corners, without refinement.
    ///
    /// Returns `None` unless some connected component labels exactly
    /// `cols × rows` distinct grid cells.
    pub fn detect_from_corners(&self, corners: &[Corner]) -> Option<ChessboardDetection> {
        let strong: Vec<Corner> = corners
            .iter()
            .copied()
            .filter(|c| c.strength >= self.params.min_strength)
            .collect();
        let need = self.spec.corner_count();
        if strong.len() < need {
            debug!("{} corners after strength filter, need {}", strong.len(), need);
            return None;
        }

        let graph = GridGraph::new(&strong, &self.params.graph);
        let mut seeds: Vec<usize> = (0..strong.len()).collect();
        seeds.sort_by(|&a, &b| {
            graph.neighbors[b]
                .len()
                .cmp(&graph.neighbors[a].len())
                .then(strong[b].strength.total_cmp(&strong[a].strength))
        });

        let mut covered = vec![false; strong.len()];
        let mut attempts = 0;
        for seed in seeds {
            if covered[seed] {
                continue;
            }
            if attempts >= self.params.max_seeds {
                break;
            }
            attempts += 1;

            let Some(labeling) = label_from_seed(&graph, seed, &self.params.graph) else {
                continue;
            };
            if labeling.conflicts == 0 {
                for node in labeling.nodes() {
                    covered[node] = true;
                }
            }
            trace!(
                "seed {seed}: {} labels, {} conflicts",
                labeling.labels.len(),
                labeling.conflicts
            );
            if labeling.labels.len() != need {
                continue;
            }
            let grid = LabeledGrid::from_labeling(&labeling).and_then(|g| {
                g.canonicalize(&strong, self.spec.cols as usize, self.spec.rows as usize)
            });
            if let Some(grid) = grid {
                let corners = grid
                    .nodes
                    .iter()
                    .map(|&n| {
                        let p = strong[n].position;
                        Point2::new(p.x as f64, p.y as f64)
                    })
                    .collect();
                return Some(ChessboardDetection {
                    spec: self.spec,
                    corners,
                });
            }
        }
        debug!(
            "no {}x{} component among {} corners",
            self.spec.cols,
            self.spec.rows,
            strong.len()
        );
        None
    }

    /// Full pipeline on a grayscale image: ChESS corners, grid assembly,
    /// sub-pixel refinement.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, img),
            fields(width = img.width(), height = img.height(), cols = self.spec.cols, rows = self.spec.rows)
        )
    )]
    pub fn detect_gray(&self, img: &::image::GrayImage) -> Option<ChessboardDetection> {
        let corners = detect_corners(img, &self.chess);
        debug!("{} ChESS corners", corners.len());
        let mut detection = self.detect_from_corners(&corners)?;
        if let Some(subpix) = &self.params.subpix {
            refine_corners(&gray_view(img), &mut detection.corners, subpix);
        }
        Some(detection)
    }

    /// Detect on a color frame.
    pub fn detect(&self, frame: &::image::RgbImage) -> Option<ChessboardDetection> {
        self.detect_gray(&::image::imageops::grayscale(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_corners(cols: usize, rows: usize) -> Vec<Corner> {
        // Mild projective warp of a regular grid.
        let mut out = Vec::new();
        for j in 0..rows {
            for i in 0..cols {
                let (x, y) = (i as f32 * 30.0, j as f32 * 30.0);
                let w = 1.0 + 0.0008 * x + 0.0004 * y;
                out.push(Corner::new((60.0 + 0.9 * x + 0.1 * y) / w, (40.0 - 0.1 * x + y) / w));
            }
        }
        out
    }

    #[test]
    fn rejects_too_small_spec() {
        let err = ChessboardDetector::new(ChessboardSpec::new(1, 5), ChessboardParams::default());
        assert!(matches!(err, Err(ChessboardError::InvalidSpec { cols: 1, rows: 5 })));
    }

    #[test]
    fn finds_board_in_either_orientation() {
        let corners = synthetic_corners(7, 5);
        for spec in [ChessboardSpec::new(7, 5), ChessboardSpec::new(5, 7)] {
            let det = ChessboardDetector::new(spec, ChessboardParams::default()).unwrap();
            let found = det.detect_from_corners(&corners);
            if spec.cols == 7 {
                let found = found.expect("7x5 board");
                assert_eq!(found.corners.len(), 35);
                // Row direction follows image +x.
                assert!(found.corners[1].x > found.corners[0].x);
            } else {
                // The only 5-wide labelings have rows running along image y.
                let found = found.expect("5x7 labeling");
                assert_eq!(found.corners.len(), 35);
            }
        }
    }

    #[test]
    fn wrong_size_or_missing_corner_is_not_found() {
        let mut corners = synthetic_corners(7, 5);
        let det = ChessboardDetector::new(ChessboardSpec::new(6, 5), ChessboardParams::default()).unwrap();
        assert!(det.detect_from_corners(&corners).is_none());

        corners.remove(17);
        let det = ChessboardDetector::new(ChessboardSpec::new(7, 5), ChessboardParams::default()).unwrap();
        assert!(det.detect_from_corners(&corners).is_none());
    }

    #[test]
    fn object_points_are_row_major() {
        let pts = object_points(ChessboardSpec::new(3, 2), 0.01);
        assert_eq!(pts.len(), 6);
        assert_eq!(pts[1], Point3::new(0.01, 0.0, 0.0));
        assert_eq!(pts[3], Point3::new(0.0, 0.01, 0.0));
        assert!(pts.iter().all(|p| p.z == 0.0));
    }
}
