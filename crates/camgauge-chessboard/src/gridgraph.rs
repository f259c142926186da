//! Corner graph and BFS grid labeling.
//!
//! Each corner keeps its nearby corners as candidate neighbors. Labeling
//! walks the graph from a seed, expressing every candidate offset in a local
//! grid basis that is re-estimated from the actual edges as the walk moves,
//! so moderate perspective and lens distortion do not break the walk.

use crate::corner::Corner;
use crate::geom::is_grid_edge;
use crate::params::GridGraphParams;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;
use std::collections::{HashMap, VecDeque};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeNeighbor {
    pub index: usize,
    /// `position[index] - position[node]`.
    pub offset: Vector2<f32>,
    pub distance: f32,
}

/// Candidate neighbors per corner, each list sorted by distance.
#[derive(Debug, Default)]
pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams) -> Self {
        if corners.is_empty() {
            return Self::default();
        }
        let coords = corners
            .iter()
            .map(|c| [c.position.x, c.position.y])
            .collect::<Vec<_>>();
        let tree: KdTree<f32, 2> = (&coords).into();
        let tol = params.orientation_tolerance_deg.to_radians();

        let neighbors = corners
            .iter()
            .enumerate()
            .map(|(i, corner)| {
                let query = [corner.position.x, corner.position.y];
                let mut found: Vec<NodeNeighbor> = tree
                    .nearest_n::<SquaredEuclidean>(&query, params.k_neighbors + 1)
                    .into_iter()
                    .filter_map(|nn| {
                        let index = nn.item as usize;
                        if index == i {
                            return None;
                        }
                        let offset = corners[index].position - corner.position;
                        let distance = nn.distance.sqrt();
                        if distance < params.min_spacing_pix || distance > params.max_spacing_pix {
                            return None;
                        }
                        if params.check_orientation
                            && !is_grid_edge(
                                corner.orientation,
                                corners[index].orientation,
                                offset.y.atan2(offset.x),
                                tol,
                            )
                        {
                            return None;
                        }
                        Some(NodeNeighbor {
                            index,
                            offset,
                            distance,
                        })
                    })
                    .collect();
                found.sort_by(|a, b| a.distance.total_cmp(&b.distance));
                if let Some(nearest) = found.first().map(|n| n.distance) {
                    found.retain(|n| n.distance <= nearest * params.max_spacing_ratio);
                }
                found
            })
            .collect();

        Self { neighbors }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Two non-collinear, non-diagonal edges at `node` to start a walk from.
    pub fn seed_basis(&self, node: usize) -> Option<(Vector2<f32>, Vector2<f32>)> {
        let list = self.neighbors.get(node)?;
        let e1 = list.first()?.offset;
        let n1 = e1.norm();
        let e2 = list.iter().skip(1).map(|n| n.offset).find(|d| {
            let cos = e1.dot(d) / (n1 * d.norm());
            cos.abs() < 0.5
        })?;
        Some((e1, e2))
    }
}

#[inline]
fn cross(a: &Vector2<f32>, b: &Vector2<f32>) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Integer grid labels of one walked component.
#[derive(Debug, Default)]
pub struct GridLabeling {
    pub labels: HashMap<(i32, i32), usize>,
    /// Edges whose implied label disagreed with an existing one.
    pub conflicts: usize,
}

impl GridLabeling {
    pub fn nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.labels.values().copied()
    }
}

/// Breadth-first labeling from `seed` with local basis propagation.
///
/// The seed gets `(0, 0)`; a neighbor whose offset is within
/// `step_tolerance` of a unit step along one basis vector gets the adjacent
/// label and inherits a basis updated with the measured edge.
pub fn label_from_seed(
    graph: &GridGraph,
    seed: usize,
    params: &GridGraphParams,
) -> Option<GridLabeling> {
    let (e1, e2) = graph.seed_basis(seed)?;
    let mut out = GridLabeling::default();
    let mut node_label: Vec<Option<(i32, i32)>> = vec![None; graph.len()];
    let mut queue = VecDeque::new();

    node_label[seed] = Some((0, 0));
    out.labels.insert((0, 0), seed);
    queue.push_back((seed, 0i32, 0i32, e1, e2));

    while let Some((node, i, j, e1, e2)) = queue.pop_front() {
        let det = cross(&e1, &e2);
        if det.abs() < 1e-6 {
            continue;
        }
        for nb in &graph.neighbors[node] {
            let d = nb.offset;
            let a = cross(&d, &e2) / det;
            let b = cross(&e1, &d) / det;
            let (ra, rb) = (a.round(), b.round());
            if (a - ra).abs() > params.step_tolerance || (b - rb).abs() > params.step_tolerance {
                continue;
            }
            let step = (ra as i32, rb as i32);
            if !matches!(step, (1, 0) | (-1, 0) | (0, 1) | (0, -1)) {
                continue;
            }
            let label = (i + step.0, j + step.1);

            match node_label[nb.index] {
                Some(existing) => {
                    if existing != label {
                        out.conflicts += 1;
                    }
                }
                None => {
                    if out.labels.contains_key(&label) {
                        out.conflicts += 1;
                        continue;
                    }
                    node_label[nb.index] = Some(label);
                    out.labels.insert(label, nb.index);
                    let (ne1, ne2) = if step.0 != 0 {
                        (d * step.0 as f32, e2)
                    } else {
                        (e1, d * step.1 as f32)
                    };
                    queue.push_back((nb.index, label.0, label.1, ne1, ne2));
                }
            }
        }
    }

    Some(out)
}

/// A fully populated `width × height` label rectangle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabeledGrid {
    pub width: usize,
    pub height: usize,
    /// Corner indices, row-major (`j * width + i`).
    pub nodes: Vec<usize>,
}

impl LabeledGrid {
    /// Pack a labeling into a rectangle; `None` unless every cell of the
    /// bounding box is occupied.
    pub fn from_labeling(labeling: &GridLabeling) -> Option<Self> {
        let min_i = labeling.labels.keys().map(|k| k.0).min()?;
        let max_i = labeling.labels.keys().map(|k| k.0).max()?;
        let min_j = labeling.labels.keys().map(|k| k.1).min()?;
        let max_j = labeling.labels.keys().map(|k| k.1).max()?;
        let width = (max_i - min_i + 1) as usize;
        let height = (max_j - min_j + 1) as usize;
        if width * height != labeling.labels.len() {
            return None;
        }
        let mut nodes = vec![0usize; width * height];
        for (&(i, j), &node) in &labeling.labels {
            nodes[(j - min_j) as usize * width + (i - min_i) as usize] = node;
        }
        Some(Self {
            width,
            height,
            nodes,
        })
    }

    #[inline]
    pub fn at(&self, i: usize, j: usize) -> usize {
        self.nodes[j * self.width + i]
    }

    /// Mean image displacement of `+i` and `+j` steps.
    pub fn axis_directions(&self, corners: &[Corner]) -> (Vector2<f32>, Vector2<f32>) {
        let mut ui = Vector2::zeros();
        let mut uj = Vector2::zeros();
        for j in 0..self.height {
            for i in 0..self.width {
                let p = corners[self.at(i, j)].position;
                if i + 1 < self.width {
                    ui += corners[self.at(i + 1, j)].position - p;
                }
                if j + 1 < self.height {
                    uj += corners[self.at(i, j + 1)].position - p;
                }
            }
        }
        (ui, uj)
    }

    /// Mirror the `j` axis.
    pub fn flip_rows(&self) -> Self {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for j in (0..self.height).rev() {
            nodes.extend_from_slice(&self.nodes[j * self.width..(j + 1) * self.width]);
        }
        Self {
            width: self.width,
            height: self.height,
            nodes,
        }
    }

    /// Quarter turn: old `(i, j)` becomes `(height - 1 - j, i)`, so the new
    /// `+i` is the old `-j` and the new `+j` the old `+i`.
    pub fn rotate90(&self) -> Self {
        let new_width = self.height;
        let mut nodes = vec![0usize; self.nodes.len()];
        for j in 0..self.height {
            for i in 0..self.width {
                let ni = self.height - 1 - j;
                let nj = i;
                nodes[nj * new_width + ni] = self.at(i, j);
            }
        }
        Self {
            width: new_width,
            height: self.width,
            nodes,
        }
    }

    /// Re-label to `cols × rows` with a right-handed basis (`+i × +j > 0` in
    /// image coordinates) and `+i` as close as possible to image `+x`.
    pub fn canonicalize(&self, corners: &[Corner], cols: usize, rows: usize) -> Option<Self> {
        let (ui, uj) = self.axis_directions(corners);
        let (mut grid, ui, uj) = if cross(&ui, &uj) < 0.0 {
            (self.flip_rows(), ui, -uj)
        } else {
            (self.clone(), ui, uj)
        };

        let directions = [ui, -uj, -ui, uj];
        let mut best: Option<(usize, f32)> = None;
        for (k, dir) in directions.iter().enumerate() {
            let (w, h) = if k % 2 == 0 {
                (grid.width, grid.height)
            } else {
                (grid.height, grid.width)
            };
            if (w, h) != (cols, rows) {
                continue;
            }
            let score = dir.x / dir.norm().max(1e-6);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((k, score));
            }
        }
        let (turns, _) = best?;
        for _ in 0..turns {
            grid = grid.rotate90();
        }
        Some(grid)
    }
}
