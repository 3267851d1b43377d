use super::{MinCutSolver, NodeId, Segment};
use petgraph::algo::ford_fulkerson;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::VecDeque;

/// Fixed-point scale used to turn capacities into exact integers
const CAPACITY_SCALE: f64 = 1e6;

/// Min-cut solver backed by petgraph's Ford-Fulkerson (Edmonds-Karp)
///
/// Capacities are collected first and the flow network is only materialised in
/// `maxflow`. Infinite capacities are replaced by a bound larger than the sum
/// of every finite capacity, which can never be cut by a minimal cut.
#[derive(Debug, Default)]
pub struct PetgraphSolver {
    arcs: Vec<(NodeId, NodeId, f64)>,
    terminals: Vec<(f64, f64)>,
    partition: Vec<Segment>,
}

impl MinCutSolver for PetgraphSolver {
    fn add_nodes(&mut self, count: usize) -> NodeId {
        let first = self.terminals.len();
        self.terminals.resize(first + count, (0.0, 0.0));
        first
    }

    fn add_edge(&mut self, a: NodeId, b: NodeId, forward: f64, backward: f64) {
        self.arcs.push((a, b, forward));
        self.arcs.push((b, a, backward));
    }

    fn add_terminal_edge(&mut self, node: NodeId, source: f64, sink: f64) {
        let (s, t) = &mut self.terminals[node];
        *s += source;
        *t += sink;
    }

    fn maxflow(&mut self) -> f64 {
        let _span = tracing::debug_span!("maxflow").entered();

        // Subtracting the smaller terminal capacity from both links shifts the
        // cut value by a constant without changing the partition.
        let mut offset = 0.0f64;
        let terminals: Vec<(f64, f64)> = self
            .terminals
            .iter()
            .map(|&(s, t)| {
                let (s, t) = (non_negative(s), non_negative(t));
                let m = s.min(t);
                if m.is_infinite() {
                    (0.0, 0.0)
                } else {
                    offset += m;
                    (s - m, t - m)
                }
            })
            .collect();

        let finite_total = self
            .arcs
            .iter()
            .map(|&(_, _, c)| c)
            .chain(terminals.iter().flat_map(|&(s, t)| [s, t]))
            .filter(|c| c.is_finite())
            .fold(0u64, |acc, c| acc.saturating_add(to_fixed(c)));
        let bound = finite_total.saturating_add(1);
        let capacity = |c: f64| {
            if c.is_infinite() && c > 0.0 {
                bound
            } else {
                to_fixed(c).min(bound)
            }
        };

        let n = terminals.len();
        let mut graph = DiGraph::<(), u64>::with_capacity(n + 2, self.arcs.len() + 2 * n);
        for _ in 0..n + 2 {
            graph.add_node(());
        }
        let source = NodeIndex::new(n);
        let sink = NodeIndex::new(n + 1);

        for &(a, b, c) in &self.arcs {
            let c = capacity(c);
            if c > 0 {
                graph.add_edge(NodeIndex::new(a), NodeIndex::new(b), c);
            }
        }
        for (node, &(s, t)) in terminals.iter().enumerate() {
            let (s, t) = (capacity(s), capacity(t));
            if s > 0 {
                graph.add_edge(source, NodeIndex::new(node), s);
            }
            if t > 0 {
                graph.add_edge(NodeIndex::new(node), sink, t);
            }
        }

        tracing::debug!(
            "Flow network: {} nodes, {} arcs",
            graph.node_count(),
            graph.edge_count()
        );

        let (flow, flows) = ford_fulkerson(&graph, source, sink);

        // Residual reachability from the source defines the source side.
        let mut visited = vec![false; n + 2];
        let mut queue = VecDeque::from([source]);
        visited[source.index()] = true;
        while let Some(u) = queue.pop_front() {
            let forward = graph
                .edges_directed(u, Direction::Outgoing)
                .filter(|e| flows[e.id().index()] < *e.weight())
                .map(|e| e.target());
            let backward = graph
                .edges_directed(u, Direction::Incoming)
                .filter(|e| flows[e.id().index()] > 0)
                .map(|e| e.source());
            let next: Vec<NodeIndex> = forward.chain(backward).collect();
            for v in next {
                if !visited[v.index()] {
                    visited[v.index()] = true;
                    queue.push_back(v);
                }
            }
        }

        self.partition = visited[..n]
            .iter()
            .map(|&reached| if reached { Segment::Source } else { Segment::Sink })
            .collect();

        if flow >= bound {
            f64::INFINITY
        } else {
            offset + flow as f64 / CAPACITY_SCALE
        }
    }

    fn segment(&self, node: NodeId) -> Segment {
        self.partition.get(node).copied().unwrap_or(Segment::Sink)
    }
}

fn non_negative(c: f64) -> f64 {
    if c > 0.0 {
        c
    } else {
        0.0
    }
}

fn to_fixed(c: f64) -> u64 {
    if c > 0.0 {
        (c * CAPACITY_SCALE).round() as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_node_cut_follows_cheaper_links() {
        let mut solver = PetgraphSolver::default();
        let first = solver.add_nodes(2);
        let (a, b) = (first, first + 1);

        solver.add_edge(a, b, 1.0, 1.0);
        solver.add_terminal_edge(a, 5.0, 0.0);
        solver.add_terminal_edge(b, 0.0, 5.0);

        let flow = solver.maxflow();
        assert!((flow - 1.0).abs() < 1e-6);
        assert_eq!(solver.segment(a), Segment::Source);
        assert_eq!(solver.segment(b), Segment::Sink);
    }

    #[test]
    fn strong_edge_keeps_pair_together() {
        let mut solver = PetgraphSolver::default();
        let first = solver.add_nodes(2);
        let (a, b) = (first, first + 1);

        solver.add_edge(a, b, 10.0, 10.0);
        solver.add_terminal_edge(a, 3.0, 0.0);
        solver.add_terminal_edge(b, 0.0, 2.0);

        let flow = solver.maxflow();
        assert!((flow - 2.0).abs() < 1e-6);
        assert_eq!(solver.segment(a), Segment::Source);
        assert_eq!(solver.segment(b), Segment::Source);
    }

    #[test]
    fn infinite_links_are_never_cut() {
        let mut solver = PetgraphSolver::default();
        let first = solver.add_nodes(3);

        solver.add_edge(first, first + 1, 0.5, 0.5);
        solver.add_edge(first + 1, first + 2, 0.1, 0.1);
        solver.add_terminal_edge(first, f64::INFINITY, 0.0);
        solver.add_terminal_edge(first + 1, 0.0, 0.3);
        solver.add_terminal_edge(first + 2, 0.0, f64::INFINITY);

        let flow = solver.maxflow();
        assert!(flow.is_finite());
        assert!((flow - 0.4).abs() < 1e-6);
        assert_eq!(solver.segment(first), Segment::Source);
        assert_eq!(solver.segment(first + 1), Segment::Source);
        assert_eq!(solver.segment(first + 2), Segment::Sink);
    }

    #[test]
    fn directed_capacities_match_reference_network() {
        // CLRS flow network, source = node 0 and sink = node 5
        let mut solver = PetgraphSolver::default();
        let first = solver.add_nodes(4);
        let (v1, v2, v3, v4) = (first, first + 1, first + 2, first + 3);

        solver.add_terminal_edge(v1, 16.0, 0.0);
        solver.add_terminal_edge(v2, 13.0, 0.0);
        solver.add_edge(v1, v2, 10.0, 0.0);
        solver.add_edge(v1, v3, 12.0, 0.0);
        solver.add_edge(v2, v4, 14.0, 0.0);
        solver.add_edge(v3, v2, 9.0, 0.0);
        solver.add_terminal_edge(v3, 0.0, 20.0);
        solver.add_edge(v4, v3, 7.0, 0.0);
        solver.add_terminal_edge(v4, 0.0, 4.0);

        let flow = solver.maxflow();
        assert!((flow - 23.0).abs() < 1e-6);
    }

    #[test]
    fn nodes_without_links_fall_to_sink_side() {
        let mut solver = PetgraphSolver::default();
        let first = solver.add_nodes(1);
        assert_eq!(solver.maxflow(), 0.0);
        assert_eq!(solver.segment(first), Segment::Sink);
    }
}
