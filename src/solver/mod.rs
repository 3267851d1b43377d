mod petgraph_solver;

pub use petgraph_solver::PetgraphSolver;

/// Node handle inside a solver problem
pub type NodeId = usize;

/// Terminal side a node ends up on after the cut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Reachable from the source in the residual graph (object side)
    Source,
    /// Everything else (background side)
    Sink,
}

/// Trait for s-t minimum cut solvers
///
/// The graph builder only relies on these five operations, so any solver
/// that returns a globally minimal cut can be plugged in. Capacities may be
/// `f64::INFINITY` for hard constraints.
pub trait MinCutSolver {
    /// Allocate `count` consecutive nodes and return the id of the first one
    fn add_nodes(&mut self, count: usize) -> NodeId;

    /// Add an edge between two nodes with capacity `forward` (a -> b) and `backward` (b -> a)
    fn add_edge(&mut self, a: NodeId, b: NodeId, forward: f64, backward: f64);

    /// Add the source and sink links of a node
    fn add_terminal_edge(&mut self, node: NodeId, source: f64, sink: f64);

    /// Compute the maximum flow, which equals the minimum cut value
    fn maxflow(&mut self) -> f64;

    /// Side of the cut `node` belongs to; only valid after `maxflow`
    fn segment(&self, node: NodeId) -> Segment;
}
