//! Read-only traversal over a loaded dendrogram.
//!
//! Children, parents and subtree sizes are precomputed once at load time
//! (O(N)), so every query afterwards is a lookup or a walk along a single
//! root-to-leaf path.

use std::collections::{BTreeMap, HashMap};

use super::Dendrogram;
use crate::error::{Error, Result};

const NO_PARENT: u32 = u32::MAX;

/// Immutable index over a binary merge tree.
///
/// Node indices `< n_leaves` are leaves (micro-clusters); the rest are merges.
/// Out-of-range indices are programmer errors and panic.
#[derive(Debug, Clone)]
pub struct DendrogramIndex {
    n_leaves: usize,
    /// `children[i]` for merge node `n_leaves + i`.
    children: Vec<[u32; 2]>,
    parents: Vec<u32>,
    sizes: Vec<u32>,
    heights: Vec<f64>,
}

/// Per-request memo for [`DendrogramIndex::subtree_leaves_memo`].
pub type LeafMemo = HashMap<usize, Vec<usize>>;

impl DendrogramIndex {
    /// Index a dendrogram.
    pub fn new(dendro: &Dendrogram) -> Self {
        let n_leaves = dendro.n_items();
        let n_nodes = n_leaves + dendro.n_merges();
        let mut children = Vec::with_capacity(dendro.n_merges());
        let mut parents = vec![NO_PARENT; n_nodes];
        let mut sizes = vec![1u32; n_nodes];
        let mut heights = vec![0.0; n_nodes];

        for (i, merge) in dendro.merges().enumerate() {
            let node = n_leaves + i;
            let (a, b) = (merge.cluster_a, merge.cluster_b);
            children.push([a as u32, b as u32]);
            parents[a] = node as u32;
            parents[b] = node as u32;
            sizes[node] = sizes[a] + sizes[b];
            heights[node] = merge.distance;
        }

        Self {
            n_leaves,
            children,
            parents,
            sizes,
            heights,
        }
    }

    /// Number of leaves (micro-clusters).
    pub fn n_leaves(&self) -> usize {
        self.n_leaves
    }

    /// Total node count, `2N - 1` for a complete tree.
    pub fn n_nodes(&self) -> usize {
        self.parents.len()
    }

    /// The root node.
    pub fn root(&self) -> usize {
        self.n_nodes() - 1
    }

    fn check(&self, node: usize) {
        assert!(
            node < self.n_nodes(),
            "dendrogram node {node} out of range (n_nodes = {})",
            self.n_nodes()
        );
    }

    /// Whether `node` is a leaf.
    pub fn is_leaf(&self, node: usize) -> bool {
        self.check(node);
        node < self.n_leaves
    }

    /// The two children of `node`, or `None` for a leaf.
    pub fn children(&self, node: usize) -> Option<(usize, usize)> {
        self.check(node);
        if node < self.n_leaves {
            return None;
        }
        let [a, b] = self.children[node - self.n_leaves];
        Some((a as usize, b as usize))
    }

    /// The node whose children include `node`, or `None` for the root.
    pub fn parent(&self, node: usize) -> Option<usize> {
        self.check(node);
        match self.parents[node] {
            NO_PARENT => None,
            p => Some(p as usize),
        }
    }

    /// Merge height of `node` (0 for leaves).
    pub fn height(&self, node: usize) -> f64 {
        self.check(node);
        self.heights[node]
    }

    /// Leaf count under `node`.
    ///
    /// Sizes are memoized for every node at load time.
    pub fn subtree_size(&self, node: usize) -> usize {
        self.check(node);
        self.sizes[node] as usize
    }

    /// All leaves under `node`, in left-to-right order.
    pub fn subtree_leaves(&self, node: usize) -> Vec<usize> {
        self.check(node);
        let mut leaves = Vec::with_capacity(self.subtree_size(node));
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            match self.children(current) {
                Some((a, b)) => {
                    stack.push(b);
                    stack.push(a);
                }
                None => leaves.push(current),
            }
        }
        leaves
    }

    /// Like [`subtree_leaves`](Self::subtree_leaves), reusing results cached in `memo`.
    pub fn subtree_leaves_memo<'m>(&self, node: usize, memo: &'m mut LeafMemo) -> &'m [usize] {
        memo.entry(node).or_insert_with(|| self.subtree_leaves(node))
    }

    /// True if `node`'s leaf set is contained in `ancestor`'s (a node is its own descendant).
    pub fn is_descendant(&self, node: usize, ancestor: usize) -> bool {
        self.check(node);
        self.check(ancestor);
        if self.sizes[node] > self.sizes[ancestor] {
            return false;
        }
        let mut current = node;
        loop {
            if current == ancestor {
                return true;
            }
            match self.parent(current) {
                Some(p) if self.sizes[p] <= self.sizes[ancestor] => current = p,
                _ => return false,
            }
        }
    }

    /// Path from `leaf` up to the root, starting with `leaf`.
    pub fn ancestors(&self, leaf: usize) -> Vec<usize> {
        let mut path = vec![leaf];
        let mut current = leaf;
        while let Some(p) = self.parent(current) {
            path.push(p);
            current = p;
        }
        path
    }

    /// For a flat clustering of the leaves, the node whose leaf set is exactly each label's.
    ///
    /// `labels[leaf]` is the group of each leaf. Fails with
    /// [`Error::NotATreeCut`] when some group is not a subtree.
    pub fn cluster_leaders(&self, labels: &[usize]) -> Result<BTreeMap<usize, usize>> {
        if labels.len() != self.n_leaves {
            return Err(Error::ShapeMismatch {
                expected: format!("{} labels", self.n_leaves),
                actual: format!("{} labels", labels.len()),
            });
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (leaf, &label) in labels.iter().enumerate() {
            groups.entry(label).or_default().push(leaf);
        }

        let mut leaders = BTreeMap::new();
        for (label, leaves) in groups {
            let target = leaves.len();
            // Highest ancestor of the first leaf that is not larger than the group.
            let mut node = leaves[0];
            while let Some(p) = self.parent(node) {
                if self.subtree_size(p) > target {
                    break;
                }
                node = p;
            }
            let exact = self.subtree_size(node) == target
                && leaves.iter().all(|&leaf| self.is_descendant(leaf, node));
            if !exact {
                return Err(Error::NotATreeCut { label });
            }
            leaders.insert(label, node);
        }
        Ok(leaders)
    }
}
