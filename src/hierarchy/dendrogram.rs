//! Dendrogram built from an upstream linkage matrix.
//!
//! A dendrogram represents the nested structure of clusters produced
//! by agglomerative (bottom-up) clustering over micro-clusters.

use crate::error::{Error, Result};

/// A dendrogram representing hierarchical cluster merges.
///
/// Leaves are `0..n_items`; merge `i` creates node `n_items + i`.
#[derive(Debug, Clone)]
pub struct Dendrogram {
    /// Merge history in linkage order.
    merges: Vec<Merge>,
    /// Number of original items (micro-clusters).
    n_items: usize,
}

/// A single merge operation in the dendrogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    /// First cluster being merged (index).
    pub cluster_a: usize,
    /// Second cluster being merged (index).
    pub cluster_b: usize,
    /// Distance/dissimilarity at which merge occurred.
    pub distance: f64,
    /// Size of resulting cluster.
    pub size: usize,
}

impl Dendrogram {
    /// Build from a scipy-style linkage matrix: one `[a, b, distance, size]` row per merge.
    ///
    /// Fails when the row count is not `n_items - 1`, or when a row references a
    /// node that does not exist yet or has already been merged.
    pub fn from_linkage(linkage: &[[f64; 4]], n_items: usize) -> Result<Self> {
        if n_items == 0 {
            return Err(Error::EmptyInput);
        }
        let expected = n_items - 1;
        if linkage.len() != expected {
            return Err(Error::LinkageMismatch {
                rows: linkage.len(),
                expected,
                n_micro: n_items,
            });
        }

        let mut merged = vec![false; 2 * n_items - 1];
        let mut dendro = Self {
            merges: Vec::with_capacity(expected),
            n_items,
        };

        for (row, &[a, b, distance, size]) in linkage.iter().enumerate() {
            let created = n_items + row;
            let (a, b) = (Self::node_ref(a, row)?, Self::node_ref(b, row)?);
            for child in [a, b] {
                if child >= created {
                    return Err(Error::InvalidLinkage {
                        row,
                        message: format!("references node {child} before it exists"),
                    });
                }
                if merged[child] {
                    return Err(Error::InvalidLinkage {
                        row,
                        message: format!("node {child} merged twice"),
                    });
                }
            }
            if a == b {
                return Err(Error::InvalidLinkage {
                    row,
                    message: format!("merges node {a} with itself"),
                });
            }
            merged[a] = true;
            merged[b] = true;
            dendro.add_merge(a, b, distance, size.max(0.0) as usize);
        }

        Ok(dendro)
    }

    fn node_ref(value: f64, row: usize) -> Result<usize> {
        if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
            return Err(Error::InvalidLinkage {
                row,
                message: format!("non-integral node reference {value}"),
            });
        }
        Ok(value as usize)
    }

    fn add_merge(&mut self, cluster_a: usize, cluster_b: usize, distance: f64, size: usize) {
        self.merges.push(Merge {
            cluster_a,
            cluster_b,
            distance,
            size,
        });
    }

    /// Get cluster assignments for k clusters.
    ///
    /// Applies the first `n_items - k` merges in linkage order, so exactly
    /// `k` groups remain (`k` is clamped to `1..=n_items`). Labels are
    /// contiguous and numbered by first appearance over the items.
    pub fn cut_to_k(&self, k: usize) -> Vec<usize> {
        let k = k.clamp(1, self.n_items);
        let n_merges = self.n_items - k;

        // root[node] = merge node that currently absorbs it
        let mut root: Vec<usize> = (0..self.n_items + n_merges).collect();
        for (i, merge) in self.merges.iter().take(n_merges).enumerate() {
            let new_node = self.n_items + i;
            root[merge.cluster_a] = new_node;
            root[merge.cluster_b] = new_node;
        }

        let mut relabel = vec![usize::MAX; root.len()];
        let mut next = 0;
        (0..self.n_items)
            .map(|item| {
                let mut node = item;
                while root[node] != node {
                    node = root[node];
                }
                if relabel[node] == usize::MAX {
                    relabel[node] = next;
                    next += 1;
                }
                relabel[node]
            })
            .collect()
    }

    /// Number of original items.
    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Number of merges recorded.
    pub fn n_merges(&self) -> usize {
        self.merges.len()
    }

    /// Iterate over merges.
    pub fn merges(&self) -> impl Iterator<Item = &Merge> {
        self.merges.iter()
    }

    /// Get the merge distances (for visualization).
    pub fn distances(&self) -> Vec<f64> {
        self.merges.iter().map(|m| m.distance).collect()
    }
}
