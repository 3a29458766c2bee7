//! Louvain algorithm for community detection.
//!
//! Louvain is a multi-level, greedy modularity optimization algorithm:
//!
//! 1. **Local moving**: start with each node in its own community and
//!    repeatedly move nodes to the neighboring community with the highest
//!    modularity gain until no move improves.
//! 2. **Aggregation**: build a meta-graph where communities become single
//!    nodes; internal edges become self-loops.
//! 3. **Iterate** on the meta-graph until modularity stops improving.
//!
//! Node order and tie-breaking are fixed (ascending ids), so the result is a
//! pure function of the input graph. Expansion results are cached by cluster
//! id and must come out identical on every recomputation.

use std::collections::{BTreeMap, HashMap};

use petgraph::graph::UnGraph;
use petgraph::visit::EdgeRef;

use super::traits::CommunityDetection;
use crate::error::{Error, Result};

type WeightedEdges = Vec<(usize, usize, f64)>;

/// Louvain community detection algorithm.
#[derive(Debug, Clone)]
pub struct Louvain {
    /// Resolution parameter (gamma).
    resolution: f64,
    /// Maximum sweeps over all nodes per level.
    max_iter: usize,
    /// Maximum levels of aggregation.
    max_levels: usize,
    /// Minimum modularity improvement to continue.
    min_modularity_gain: f64,
}

impl Louvain {
    /// Create a new Louvain detector with default settings.
    pub fn new() -> Self {
        Self {
            resolution: 1.0,
            max_iter: 100,
            max_levels: 10,
            min_modularity_gain: 1e-7,
        }
    }

    /// Detector whose resolution grows with the subgraph size.
    ///
    /// γ = 1 up to 50 nodes, then `1 + 0.25·ln(n / 50)`.
    pub fn for_subgraph_size(n: usize) -> Self {
        let scale = (n as f64 / 50.0).ln().max(0.0);
        Self::new().with_resolution(1.0 + 0.25 * scale)
    }

    /// Set resolution parameter.
    ///
    /// Higher values produce smaller communities.
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set maximum iterations per level.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set maximum aggregation levels.
    pub fn with_max_levels(mut self, levels: usize) -> Self {
        self.max_levels = levels;
        self
    }

    /// Modularity of `communities` on a weighted graph with self-loops.
    pub fn modularity(
        &self,
        n: usize,
        edges: &[(usize, usize, f64)],
        self_loops: &[f64],
        communities: &[usize],
    ) -> f64 {
        let m = total_weight(edges, self_loops);
        if m == 0.0 {
            return 0.0;
        }
        let degrees = weighted_degrees(n, edges, self_loops);

        let mut community_degree: HashMap<usize, f64> = HashMap::new();
        let mut internal: HashMap<usize, f64> = HashMap::new();
        for (node, &c) in communities.iter().enumerate() {
            *community_degree.entry(c).or_insert(0.0) += degrees[node];
            *internal.entry(c).or_insert(0.0) += self_loops.get(node).copied().unwrap_or(0.0);
        }
        for &(i, j, w) in edges {
            if communities[i] == communities[j] {
                *internal.entry(communities[i]).or_insert(0.0) += w;
            }
        }

        community_degree
            .iter()
            .map(|(c, &tot)| {
                let inside = internal.get(c).copied().unwrap_or(0.0);
                inside / m - self.resolution * (tot / (2.0 * m)).powi(2)
            })
            .sum()
    }

    /// Run Louvain on `n` nodes and undirected weighted edges `(i, j, w)`.
    pub fn detect_weighted(&self, n: usize, edges: &[(usize, usize, f64)]) -> Result<Vec<usize>> {
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        if let Some(&(i, j, _)) = edges.iter().find(|&&(i, j, _)| i >= n || j >= n) {
            return Err(Error::ShapeMismatch {
                expected: format!("endpoints < {n}"),
                actual: format!("edge ({i}, {j})"),
            });
        }

        let mut self_loops = vec![0.0; n];
        let mut current_edges: WeightedEdges = Vec::with_capacity(edges.len());
        for &(i, j, w) in edges {
            if i == j {
                self_loops[i] += w;
            } else {
                current_edges.push((i, j, w));
            }
        }
        if current_edges.is_empty() {
            return Ok((0..n).collect());
        }

        // membership[v] = node of the current level that original node v belongs to
        let mut membership: Vec<usize> = (0..n).collect();
        let mut current_n = n;
        let mut current_loops = self_loops;
        let mut prev_modularity = f64::NEG_INFINITY;

        for _level in 0..self.max_levels {
            let (partition, improved) =
                self.local_moving(current_n, &current_edges, &current_loops);
            if !improved {
                break;
            }

            let q = self.modularity(current_n, &current_edges, &current_loops, &partition);
            if q - prev_modularity < self.min_modularity_gain {
                break;
            }
            prev_modularity = q;

            let (renumbered, n_next) = renumber(&partition);
            for slot in membership.iter_mut() {
                *slot = renumbered[*slot];
            }
            if n_next == current_n {
                break;
            }

            let (next_edges, next_loops) =
                aggregate(n_next, &current_edges, &current_loops, &renumbered);
            current_n = n_next;
            current_edges = next_edges;
            current_loops = next_loops;
        }

        Ok(renumber(&membership).0)
    }

    /// Phase 1: local moving. Returns (community per node, whether anything moved).
    fn local_moving(
        &self,
        n: usize,
        edges: &[(usize, usize, f64)],
        self_loops: &[f64],
    ) -> (Vec<usize>, bool) {
        let m = total_weight(edges, self_loops);
        if m == 0.0 {
            return ((0..n).collect(), false);
        }

        let mut adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for &(i, j, w) in edges {
            adj[i].push((j, w));
            adj[j].push((i, w));
        }
        let degrees = weighted_degrees(n, edges, self_loops);

        let mut communities: Vec<usize> = (0..n).collect();
        let mut community_degrees = degrees.clone();
        let mut any_moved = false;

        for _iter in 0..self.max_iter {
            let mut moved = false;

            for node in 0..n {
                let current = communities[node];
                let ki = degrees[node];
                community_degrees[current] -= ki;

                // Ordered map keeps tie-breaking deterministic.
                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                for &(neighbor, w) in &adj[node] {
                    *links.entry(communities[neighbor]).or_insert(0.0) += w;
                }

                let gain_of = |comm: usize, ki_in: f64| {
                    ki_in / m - self.resolution * community_degrees[comm] * ki / (2.0 * m * m)
                };
                let stay = links.get(&current).map_or(0.0, |&w| gain_of(current, w)).max(0.0);

                let mut best = current;
                let mut best_gain = stay;
                for (&comm, &ki_in) in &links {
                    let gain = gain_of(comm, ki_in);
                    if gain > best_gain + 1e-12 {
                        best_gain = gain;
                        best = comm;
                    }
                }

                communities[node] = best;
                community_degrees[best] += ki;
                if best != current {
                    moved = true;
                    any_moved = true;
                }
            }

            if !moved {
                break;
            }
        }

        (communities, any_moved)
    }
}

impl Default for Louvain {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunityDetection for Louvain {
    fn detect<N, E>(&self, graph: &UnGraph<N, E>) -> Result<Vec<usize>> {
        let edges: WeightedEdges = graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index(), 1.0))
            .collect();
        self.detect_weighted(graph.node_count(), &edges)
    }

    fn resolution(&self) -> f64 {
        self.resolution
    }
}

fn total_weight(edges: &[(usize, usize, f64)], self_loops: &[f64]) -> f64 {
    edges.iter().map(|(_, _, w)| w).sum::<f64>() + self_loops.iter().sum::<f64>()
}

fn weighted_degrees(n: usize, edges: &[(usize, usize, f64)], self_loops: &[f64]) -> Vec<f64> {
    let mut degrees = vec![0.0; n];
    for &(i, j, w) in edges {
        degrees[i] += w;
        degrees[j] += w;
    }
    for (i, &sl) in self_loops.iter().enumerate() {
        degrees[i] += 2.0 * sl;
    }
    degrees
}

/// Contiguous labels in order of first appearance, and how many there are.
fn renumber(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut map: HashMap<usize, usize> = HashMap::new();
    let out = labels
        .iter()
        .map(|&l| {
            let next = map.len();
            *map.entry(l).or_insert(next)
        })
        .collect();
    (out, map.len())
}

/// Phase 2: contract each community into one node.
fn aggregate(
    n_next: usize,
    edges: &[(usize, usize, f64)],
    self_loops: &[f64],
    community: &[usize],
) -> (WeightedEdges, Vec<f64>) {
    let mut loops = vec![0.0; n_next];
    for (node, &sl) in self_loops.iter().enumerate() {
        loops[community[node]] += sl;
    }

    let mut between: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for &(i, j, w) in edges {
        let (ci, cj) = (community[i], community[j]);
        if ci == cj {
            loops[ci] += w;
        } else {
            *between.entry((ci.min(cj), ci.max(cj))).or_insert(0.0) += w;
        }
    }

    let next_edges = between.into_iter().map(|((i, j), w)| (i, j, w)).collect();
    (next_edges, loops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use petgraph::graph::UnGraph;

    fn two_triangles() -> UnGraph<(), ()> {
        let mut graph = UnGraph::<(), ()>::new_undirected();
        let a: Vec<_> = (0..3).map(|_| graph.add_node(())).collect();
        let b: Vec<_> = (0..3).map(|_| graph.add_node(())).collect();
        for clique in [&a, &b] {
            graph.add_edge(clique[0], clique[1], ());
            graph.add_edge(clique[1], clique[2], ());
            graph.add_edge(clique[0], clique[2], ());
        }
        // Bridge
        graph.add_edge(a[2], b[0], ());
        graph
    }

    #[test]
    fn test_louvain_triangle() {
        let mut graph = UnGraph::<(), ()>::new_undirected();
        let n0 = graph.add_node(());
        let n1 = graph.add_node(());
        let n2 = graph.add_node(());
        graph.add_edge(n0, n1, ());
        graph.add_edge(n1, n2, ());
        graph.add_edge(n0, n2, ());

        let communities = Louvain::new().detect(&graph).unwrap();
        assert_eq!(communities, vec![0, 0, 0]);
    }

    #[test]
    fn test_louvain_two_cliques() {
        let communities = Louvain::new().detect(&two_triangles()).unwrap();

        assert_eq!(communities.len(), 6);
        assert_eq!(communities[0], communities[1]);
        assert_eq!(communities[1], communities[2]);
        assert_eq!(communities[3], communities[4]);
        assert_eq!(communities[4], communities[5]);
        assert_ne!(communities[0], communities[3]);
        // Contiguous, first-appearance order.
        assert_eq!(communities[0], 0);
    }

    #[test]
    fn test_louvain_is_deterministic() {
        let graph = two_triangles();
        let louvain = Louvain::for_subgraph_size(6);
        assert_eq!(louvain.detect(&graph).unwrap(), louvain.detect(&graph).unwrap());
    }

    #[test]
    fn test_louvain_empty_graph() {
        let graph = UnGraph::<(), ()>::new_undirected();
        assert_eq!(Louvain::new().detect(&graph), Err(Error::EmptyInput));
    }

    #[test]
    fn test_louvain_disconnected() {
        let mut graph = UnGraph::<(), ()>::new_undirected();
        graph.add_node(());
        graph.add_node(());

        let communities = Louvain::new().detect(&graph).unwrap();
        assert_eq!(communities, vec![0, 1]);
    }

    #[test]
    fn test_modularity_of_good_split_is_positive() {
        let louvain = Louvain::new();
        let edges = vec![
            (0, 1, 1.0),
            (1, 2, 1.0),
            (0, 2, 1.0),
            (3, 4, 1.0),
            (4, 5, 1.0),
            (3, 5, 1.0),
            (2, 3, 1.0),
        ];
        let loops = vec![0.0; 6];
        let good = louvain.modularity(6, &edges, &loops, &[0, 0, 0, 1, 1, 1]);
        let all = louvain.modularity(6, &edges, &loops, &[0; 6]);
        assert!(good > 0.3);
        assert!(all.abs() < 1e-12);
    }

    #[test]
    fn test_resolution_scales_with_size() {
        assert_eq!(Louvain::for_subgraph_size(10).resolution(), 1.0);
        assert!(Louvain::for_subgraph_size(500).resolution() > 1.5);
    }
}
