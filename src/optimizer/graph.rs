//! Transformer graph and Dijkstra-based electrical-distance ranking (C5).

use petgraph::algo::dijkstra;
use petgraph::graph::{DiGraph, NodeIndex};

/// Edge payload: which transformer this edge represents and its weight.
/// Weights are currently always 1 (see the module-level note in
/// [`crate::optimizer`]); the field stays `u32` so non-uniform weighting
/// (e.g. by voltage-level change) can be added without touching callers.
#[derive(Debug, Clone, Copy)]
pub struct TransformerEdge {
    pub transformer_index: usize,
    pub weight: u32,
}

/// Directed graph over electrical nodes, edge per regulated transformer
/// pointing from its source-side node to its tap-side node.
pub struct TransformerGraph {
    graph: DiGraph<(), TransformerEdge>,
    nodes: Vec<NodeIndex>,
    sources: Vec<NodeIndex>,
    tap_side_node: Vec<NodeIndex>,
}

impl TransformerGraph {
    pub fn new(n_vertices: usize) -> Self {
        let mut graph = DiGraph::new();
        let nodes = (0..n_vertices).map(|_| graph.add_node(())).collect();
        Self {
            graph,
            nodes,
            sources: Vec::new(),
            tap_side_node: Vec::new(),
        }
    }

    pub fn mark_source(&mut self, vertex: usize) {
        self.sources.push(self.nodes[vertex]);
    }

    /// Registers transformer `transformer_index`, source-side `from` and
    /// tap-side `to`, in that insertion order (transformer indices must be
    /// added 0, 1, 2, ... so `tap_side_node[i]` lines up with `i`).
    pub fn add_transformer(&mut self, transformer_index: usize, from: usize, to: usize) {
        debug_assert_eq!(transformer_index, self.tap_side_node.len());
        self.graph.add_edge(
            self.nodes[from],
            self.nodes[to],
            TransformerEdge {
                transformer_index,
                weight: 1,
            },
        );
        self.tap_side_node.push(self.nodes[to]);
    }

    /// Runs Dijkstra from every source vertex, keeping the minimum distance
    /// per vertex, then groups transformers by their tap side's distance.
    /// Transformers whose tap side is unreachable from any source form a
    /// trailing "infinity" group.
    pub fn rank(&self) -> Vec<Vec<usize>> {
        let mut min_dist = vec![None; self.nodes.len()];
        for &src in &self.sources {
            let distances = dijkstra(&self.graph, src, None, |e| e.weight().weight);
            for (node, d) in distances {
                let slot = &mut min_dist[node.index()];
                match slot {
                    Some(cur) if *cur <= d => {}
                    _ => *slot = Some(d),
                }
            }
        }

        let mut by_transformer: Vec<(usize, u32)> = self
            .tap_side_node
            .iter()
            .enumerate()
            .map(|(idx, node)| (idx, min_dist[node.index()].unwrap_or(u32::MAX)))
            .collect();
        by_transformer.sort_by_key(|&(_, d)| d);

        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut last_distance = None;
        for (idx, d) in by_transformer {
            if last_distance != Some(d) {
                groups.push(Vec::new());
                last_distance = Some(d);
            }
            groups.last_mut().unwrap().push(idx);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_transformers_rank_by_hop_count() {
        // source(0) -> 1 -> T1 -> 2 -> T2 -> 3 (load)
        let mut g = TransformerGraph::new(4);
        g.mark_source(0);
        g.add_transformer(0, 0, 1);
        g.add_transformer(1, 1, 2);
        let groups = g.rank();
        assert_eq!(groups, vec![vec![0], vec![1]]);
    }

    #[test]
    fn disconnected_tap_side_ranks_last() {
        let mut g = TransformerGraph::new(4);
        g.mark_source(0);
        g.add_transformer(0, 0, 1);
        // vertex 3 is never reached from the source.
        g.add_transformer(1, 2, 3);
        let groups = g.rank();
        assert_eq!(groups, vec![vec![0], vec![1]]);
    }

    #[test]
    fn ranking_is_monotonic_across_groups() {
        let mut g = TransformerGraph::new(4);
        g.mark_source(0);
        g.add_transformer(0, 0, 1);
        g.add_transformer(1, 1, 2);
        g.add_transformer(2, 2, 3);
        let groups = g.rank();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups, vec![vec![0], vec![1], vec![2]]);
    }
}
