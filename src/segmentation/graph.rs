use super::class_model::ClassModel;
use super::types::{ClassId, Roi};
use super::weights::EdgeWeights;
use crate::solver::{MinCutSolver, NodeId};

/// Observer receiving the percentage of rows emitted so far
pub type Progress<'a> = &'a mut dyn FnMut(usize);

/// Counts of what was handed to the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphStats {
    pub nodes: usize,
    pub pairwise_edges: usize,
    pub terminal_edges: usize,
}

/// Grid graph for one ROI, node ids in row-major order
#[derive(Debug, Clone, Copy)]
pub struct NodeGrid {
    pub first: NodeId,
    pub width: usize,
}

impl NodeGrid {
    pub fn node(&self, row: usize, col: usize) -> NodeId {
        self.first + row * self.width + col
    }
}

/// Emit the ROI grid graph into `solver`
///
/// Every pixel gets one node, an undirected edge to its right and lower
/// neighbours and one terminal link pair. Seeds are hard constraints: object
/// seeds get an infinite source link, background seeds an infinite sink link.
/// Negative weights are clamped to zero since flow capacities must be
/// non-negative.
pub fn build_graph<S: MinCutSolver>(
    solver: &mut S,
    weights: &EdgeWeights<'_>,
    classes: &ClassModel,
    roi: Roi,
    mut progress: Option<Progress<'_>>,
) -> (NodeGrid, GraphStats) {
    let _span = tracing::debug_span!("build_graph").entered();

    let (height, width) = weights.dim();
    let grid = NodeGrid {
        first: solver.add_nodes(height * width),
        width,
    };
    let mut stats = GraphStats {
        nodes: height * width,
        pairwise_edges: 0,
        terminal_edges: 0,
    };

    for i in 0..height {
        if let Some(report) = progress.as_mut() {
            report(i * 100 / height);
        }

        for j in 0..width {
            let node = grid.node(i, j);

            if i + 1 < height {
                let w = weights.pairwise((i, j), (i + 1, j)).max(0.0);
                solver.add_edge(node, grid.node(i + 1, j), w, w);
                stats.pairwise_edges += 1;
            }

            if j + 1 < width {
                let w = weights.pairwise((i, j), (i, j + 1)).max(0.0);
                solver.add_edge(node, grid.node(i, j + 1), w, w);
                stats.pairwise_edges += 1;
            }

            let coord = (roi.y + i, roi.x + j);
            let (source, sink) = if classes.is_seed(ClassId::Object, coord) {
                (f64::INFINITY, 0.0)
            } else if classes.is_seed(ClassId::Background, coord) {
                (0.0, f64::INFINITY)
            } else {
                weights.terminals((i, j))
            };
            solver.add_terminal_edge(node, source.max(0.0), sink.max(0.0));
            stats.terminal_edges += 1;
        }
    }

    if let Some(report) = progress.as_mut() {
        report(100);
    }

    tracing::debug!(
        "Graph built: {} nodes, {} pairwise edges, {} terminal pairs",
        stats.nodes,
        stats.pairwise_edges,
        stats.terminal_edges
    );

    (grid, stats)
}
