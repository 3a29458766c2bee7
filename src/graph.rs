//! Sparse directed follow graph over accounts.
//!
//! Stored as CSR with sorted out-lists so that `has_edge` is a binary search.
//! Expansion strategies only ever look at the subgraph induced by one
//! cluster's members, which [`Adjacency::induced`] extracts with local indices.

use std::collections::HashMap;

use petgraph::graph::{NodeIndex, UnGraph};

use crate::error::{Error, Result};

/// Directed adjacency over `n` accounts.
#[derive(Debug, Clone, Default)]
pub struct Adjacency {
    offsets: Vec<usize>,
    targets: Vec<u32>,
    in_degree: Vec<u32>,
}

impl Adjacency {
    /// Build from directed `(source, target)` pairs.
    ///
    /// Duplicates and self-loops are dropped.
    pub fn from_edges(n: usize, edges: &[(usize, usize)]) -> Result<Self> {
        let mut out: Vec<Vec<u32>> = vec![Vec::new(); n];
        for &(u, v) in edges {
            if u >= n || v >= n {
                return Err(Error::ShapeMismatch {
                    expected: format!("endpoints < {n}"),
                    actual: format!("edge ({u}, {v})"),
                });
            }
            if u != v {
                out[u].push(v as u32);
            }
        }

        let mut offsets = Vec::with_capacity(n + 1);
        let mut targets = Vec::with_capacity(edges.len());
        let mut in_degree = vec![0u32; n];
        offsets.push(0);
        for list in &mut out {
            list.sort_unstable();
            list.dedup();
            for &v in list.iter() {
                in_degree[v as usize] += 1;
            }
            targets.extend_from_slice(list);
            offsets.push(targets.len());
        }

        Ok(Self {
            offsets,
            targets,
            in_degree,
        })
    }

    /// Number of accounts.
    pub fn n_nodes(&self) -> usize {
        self.in_degree.len()
    }

    /// Number of directed edges.
    pub fn n_edges(&self) -> usize {
        self.targets.len()
    }

    /// Accounts that `u` follows, sorted.
    pub fn out_neighbors(&self, u: usize) -> &[u32] {
        &self.targets[self.offsets[u]..self.offsets[u + 1]]
    }

    /// Whether `u -> v` exists.
    pub fn has_edge(&self, u: usize, v: usize) -> bool {
        self.out_neighbors(u).binary_search(&(v as u32)).is_ok()
    }

    /// Out-degree of `u`.
    pub fn out_degree(&self, u: usize) -> usize {
        self.offsets[u + 1] - self.offsets[u]
    }

    /// In-degree (follower count within the graph) of `u`.
    pub fn in_degree(&self, u: usize) -> usize {
        self.in_degree[u] as usize
    }

    /// In-degree plus out-degree of `u`.
    pub fn degree(&self, u: usize) -> usize {
        self.in_degree(u) + self.out_degree(u)
    }

    /// All directed edges.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.n_nodes())
            .flat_map(move |u| self.out_neighbors(u).iter().map(move |&v| (u, v as usize)))
    }

    /// Subgraph induced by `members` (global account indices).
    pub fn induced(&self, members: &[u32]) -> InducedSubgraph {
        let local: HashMap<u32, usize> = members.iter().enumerate().map(|(i, &m)| (m, i)).collect();
        let mut edges = Vec::new();
        for (i, &m) in members.iter().enumerate() {
            for v in self.out_neighbors(m as usize) {
                if let Some(&j) = local.get(v) {
                    edges.push((i, j));
                }
            }
        }
        InducedSubgraph {
            members: members.to_vec(),
            edges,
        }
    }
}

/// Directed subgraph over a member list, using local indices `0..members.len()`.
#[derive(Debug, Clone, Default)]
pub struct InducedSubgraph {
    members: Vec<u32>,
    edges: Vec<(usize, usize)>,
}

impl InducedSubgraph {
    /// Build directly from local edges (used by tests and callers without a full graph).
    pub fn new(members: Vec<u32>, edges: Vec<(usize, usize)>) -> Self {
        Self { members, edges }
    }

    /// Global account index of each local node.
    pub fn members(&self) -> &[u32] {
        &self.members
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the subgraph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Directed local edges.
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// In-cluster in-degree of every local node.
    pub fn in_degrees(&self) -> Vec<usize> {
        let mut deg = vec![0; self.len()];
        for &(_, v) in &self.edges {
            deg[v] += 1;
        }
        deg
    }

    /// In-cluster total degree (in + out) of every local node.
    pub fn degrees(&self) -> Vec<usize> {
        let mut deg = vec![0; self.len()];
        for &(u, v) in &self.edges {
            deg[u] += 1;
            deg[v] += 1;
        }
        deg
    }

    /// Undirected pairs `(i, j)`, `i < j`, where both directions exist.
    pub fn mutual_pairs(&self) -> Vec<(usize, usize)> {
        let mut seen: HashMap<(usize, usize), u8> = HashMap::new();
        for &(u, v) in &self.edges {
            let key = if u < v { (u, v) } else { (v, u) };
            let bit = if u < v { 1 } else { 2 };
            *seen.entry(key).or_insert(0) |= bit;
        }
        let mut pairs: Vec<_> = seen
            .into_iter()
            .filter(|&(_, bits)| bits == 3)
            .map(|(pair, _)| pair)
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Fraction of directed edges whose reverse edge also exists.
    pub fn reciprocity(&self) -> f64 {
        if self.edges.is_empty() {
            return 0.0;
        }
        2.0 * self.mutual_pairs().len() as f64 / self.edges.len() as f64
    }

    /// Undirected unweighted view for community detection.
    pub fn to_undirected(&self) -> UnGraph<(), ()> {
        let mut graph = UnGraph::<(), ()>::with_capacity(self.len(), self.edges.len());
        for _ in 0..self.len() {
            graph.add_node(());
        }
        let mut pairs: Vec<(usize, usize)> = self
            .edges
            .iter()
            .map(|&(u, v)| if u < v { (u, v) } else { (v, u) })
            .collect();
        pairs.sort_unstable();
        pairs.dedup();
        for (u, v) in pairs {
            graph.add_edge(NodeIndex::new(u), NodeIndex::new(v), ());
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Adjacency {
        // 0 <-> 1, 1 -> 2, 2 -> 3, 3 -> 2, dup and self-loop dropped
        Adjacency::from_edges(4, &[(0, 1), (1, 0), (1, 2), (2, 3), (3, 2), (1, 2), (3, 3)]).unwrap()
    }

    #[test]
    fn test_csr_basics() {
        let adj = sample();
        assert_eq!(adj.n_nodes(), 4);
        assert_eq!(adj.n_edges(), 5);
        assert_eq!(adj.out_neighbors(1), &[0, 2]);
        assert!(adj.has_edge(2, 3));
        assert!(!adj.has_edge(0, 2));
        assert_eq!(adj.in_degree(2), 2);
        assert_eq!(adj.out_degree(3), 1);
        assert_eq!(adj.degree(2), adj.in_degree(2) + adj.out_degree(2));
        assert_eq!(adj.edges().count(), 5);
    }

    #[test]
    fn test_out_of_range_edge_rejected() {
        assert!(Adjacency::from_edges(2, &[(0, 2)]).is_err());
    }

    #[test]
    fn test_induced_subgraph() {
        let adj = sample();
        let sub = adj.induced(&[2, 1, 3]);
        // local: 2->0, 1->1, 3->2
        let mut edges = sub.edges().to_vec();
        edges.sort_unstable();
        assert_eq!(edges, vec![(0, 2), (1, 0), (2, 0)]);
        assert_eq!(sub.mutual_pairs(), vec![(0, 2)]);
        assert!((sub.reciprocity() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(sub.degrees(), vec![3, 1, 2]);
        assert_eq!(sub.in_degrees(), vec![2, 0, 1]);
    }

    #[test]
    fn test_to_undirected_dedups_mutual_edges() {
        let sub = sample().induced(&[0, 1, 2, 3]);
        let graph = sub.to_undirected();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 3);
    }
}
