//! Upstream data loaded once per process.
//!
//! A [`Snapshot`] bundles the dendrogram, micro-cluster centroids, the
//! account→micro-cluster assignment, the follow graph and the optional
//! per-account annotations (tags, soft memberships, Louvain communities).
//! Everything is validated at construction and read-only afterwards, so one
//! `Arc<Snapshot>` is shared by all requests and the precompute worker.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::graph::Adjacency;
use crate::hierarchy::{Dendrogram, DendrogramIndex};

/// A dendrogram leaf: the smallest clustering unit, aggregating many accounts.
#[derive(Debug, Clone, PartialEq)]
pub struct MicroCluster {
    /// Leaf index in the dendrogram.
    pub index: usize,
    /// Embedding centroid.
    pub centroid: Vec<f32>,
    /// Member account indices, sorted.
    pub members: Vec<u32>,
}

/// Raw arrays produced by the upstream clustering pipeline.
#[derive(Debug, Clone, Default)]
pub struct SnapshotInput {
    /// Linkage rows `[a, b, distance, size]`, `n_micro - 1` of them.
    pub linkage: Vec<[f64; 4]>,
    /// Centroid per micro-cluster.
    pub centroids: Vec<Vec<f32>>,
    /// Micro-cluster index per account.
    pub assignment: Vec<usize>,
    /// External node id per account.
    pub node_ids: Vec<String>,
    /// Directed follow edges between account indices.
    pub edges: Vec<(usize, usize)>,
}

/// Immutable view of the upstream data.
#[derive(Debug, Clone)]
pub struct Snapshot {
    dendrogram: Dendrogram,
    index: DendrogramIndex,
    micro: Vec<MicroCluster>,
    node_ids: Vec<String>,
    handles: Vec<String>,
    by_node_id: HashMap<String, u32>,
    micro_of: Vec<u32>,
    member_counts: Vec<usize>,
    adjacency: Adjacency,
    tags: Option<Vec<Vec<String>>>,
    soft_membership: Option<Vec<Vec<f64>>>,
    communities: Option<Vec<usize>>,
}

impl Snapshot {
    /// Validate and index the upstream arrays.
    pub fn new(input: SnapshotInput) -> Result<Self> {
        let n_micro = input.centroids.len();
        let dendro = Dendrogram::from_linkage(&input.linkage, n_micro)?;
        let index = DendrogramIndex::new(&dendro);

        let dim = input.centroids[0].len();
        if let Some(bad) = input.centroids.iter().find(|c| c.len() != dim) {
            return Err(Error::ShapeMismatch {
                expected: format!("centroids of dimension {dim}"),
                actual: format!("centroid of dimension {}", bad.len()),
            });
        }

        let n_accounts = input.assignment.len();
        if input.node_ids.len() != n_accounts {
            return Err(Error::ShapeMismatch {
                expected: format!("{n_accounts} node ids"),
                actual: format!("{} node ids", input.node_ids.len()),
            });
        }

        let mut members: Vec<Vec<u32>> = vec![Vec::new(); n_micro];
        for (account, &m) in input.assignment.iter().enumerate() {
            if m >= n_micro {
                return Err(Error::ShapeMismatch {
                    expected: format!("micro-cluster index < {n_micro}"),
                    actual: format!("account {account} assigned to {m}"),
                });
            }
            members[m].push(account as u32);
        }

        let micro: Vec<MicroCluster> = input
            .centroids
            .into_iter()
            .zip(members)
            .enumerate()
            .map(|(index, (centroid, members))| MicroCluster {
                index,
                centroid,
                members,
            })
            .collect();

        let mut member_counts = vec![0usize; index.n_nodes()];
        for node in 0..index.n_nodes() {
            member_counts[node] = match index.children(node) {
                None => micro[node].members.len(),
                // Children always have smaller indices than their parent.
                Some((a, b)) => member_counts[a] + member_counts[b],
            };
        }

        let adjacency = Adjacency::from_edges(n_accounts, &input.edges)?;
        let by_node_id = input
            .node_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i as u32))
            .collect();

        Ok(Self {
            dendrogram: dendro,
            index,
            micro,
            handles: input.node_ids.clone(),
            node_ids: input.node_ids,
            by_node_id,
            micro_of: input.assignment.iter().map(|&m| m as u32).collect(),
            member_counts,
            adjacency,
            tags: None,
            soft_membership: None,
            communities: None,
        })
    }

    fn check_accounts(&self, what: &str, len: usize) -> Result<()> {
        if len != self.n_accounts() {
            return Err(Error::ShapeMismatch {
                expected: format!("{} {what}", self.n_accounts()),
                actual: format!("{len} {what}"),
            });
        }
        Ok(())
    }

    /// Attach display handles (defaults to the node ids).
    pub fn with_handles(mut self, handles: Vec<String>) -> Result<Self> {
        self.check_accounts("handles", handles.len())?;
        self.handles = handles;
        Ok(self)
    }

    /// Attach a tag set per account.
    pub fn with_tags(mut self, mut tags: Vec<Vec<String>>) -> Result<Self> {
        self.check_accounts("tag sets", tags.len())?;
        for set in &mut tags {
            set.sort_unstable();
            set.dedup();
        }
        self.tags = Some(tags);
        Ok(self)
    }

    /// Attach a soft cluster-membership distribution per account.
    pub fn with_soft_membership(mut self, distributions: Vec<Vec<f64>>) -> Result<Self> {
        self.check_accounts("membership distributions", distributions.len())?;
        self.soft_membership = Some(distributions);
        Ok(self)
    }

    /// Attach a whole-graph Louvain community per account.
    pub fn with_communities(mut self, communities: Vec<usize>) -> Result<Self> {
        self.check_accounts("community labels", communities.len())?;
        self.communities = Some(communities);
        Ok(self)
    }

    /// The merge tree as loaded.
    pub fn dendrogram(&self) -> &Dendrogram {
        &self.dendrogram
    }

    /// The dendrogram index.
    pub fn index(&self) -> &DendrogramIndex {
        &self.index
    }

    /// The follow graph.
    pub fn adjacency(&self) -> &Adjacency {
        &self.adjacency
    }

    /// Number of micro-clusters (dendrogram leaves).
    pub fn n_micro(&self) -> usize {
        self.micro.len()
    }

    /// Number of accounts.
    pub fn n_accounts(&self) -> usize {
        self.micro_of.len()
    }

    /// Micro-cluster `leaf`.
    pub fn micro(&self, leaf: usize) -> &MicroCluster {
        &self.micro[leaf]
    }

    /// Micro-cluster of `account`.
    pub fn micro_of(&self, account: usize) -> usize {
        self.micro_of[account] as usize
    }

    /// External node id of `account`.
    pub fn node_id(&self, account: usize) -> &str {
        &self.node_ids[account]
    }

    /// Display handle of `account`.
    pub fn handle(&self, account: usize) -> &str {
        &self.handles[account]
    }

    /// Account index of an external node id.
    pub fn account_index(&self, node_id: &str) -> Option<usize> {
        self.by_node_id.get(node_id).map(|&i| i as usize)
    }

    /// Tags of `account`, if tags were loaded.
    pub fn tags_of(&self, account: usize) -> Option<&[String]> {
        self.tags.as_ref().map(|t| t[account].as_slice())
    }

    /// Whether any tags were loaded.
    pub fn has_tags(&self) -> bool {
        self.tags.is_some()
    }

    /// Soft membership of `account`, if loaded.
    pub fn soft_membership_of(&self, account: usize) -> Option<&[f64]> {
        self.soft_membership.as_ref().map(|s| s[account].as_slice())
    }

    /// Whether soft memberships were loaded.
    pub fn has_soft_membership(&self) -> bool {
        self.soft_membership.is_some()
    }

    /// Whole-graph community of `account`, if loaded.
    pub fn community_of(&self, account: usize) -> Option<usize> {
        self.communities.as_ref().map(|c| c[account])
    }

    /// Number of accounts under dendrogram node `node`.
    pub fn member_count(&self, node: usize) -> usize {
        self.member_counts[node]
    }

    /// Sorted account indices under dendrogram node `node`.
    pub fn node_members(&self, node: usize) -> Vec<u32> {
        let mut members: Vec<u32> = self
            .index
            .subtree_leaves(node)
            .into_iter()
            .flat_map(|leaf| self.micro[leaf].members.iter().copied())
            .collect();
        members.sort_unstable();
        members
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Four micro-clusters, 4 = {0, 1}, 5 = {2, 3}, 6 = {4, 5}; two accounts per leaf.
    pub(crate) fn four_leaf_input() -> SnapshotInput {
        SnapshotInput {
            linkage: vec![[0.0, 1.0, 0.5, 2.0], [2.0, 3.0, 0.7, 2.0], [4.0, 5.0, 1.0, 4.0]],
            centroids: vec![
                vec![0.0, 0.0],
                vec![0.0, 1.0],
                vec![5.0, 0.0],
                vec![5.0, 1.0],
            ],
            assignment: vec![0, 0, 1, 1, 2, 2, 3, 3],
            node_ids: (0..8).map(|i| format!("acct{i}")).collect(),
            edges: vec![(0, 1), (1, 0), (2, 3), (0, 2), (4, 5), (5, 6), (6, 7), (7, 4), (1, 6)],
        }
    }

    pub(crate) fn four_leaf_snapshot() -> Snapshot {
        Snapshot::new(four_leaf_input()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_snapshot_indexes_members() {
        let snap = four_leaf_snapshot();
        assert_eq!(snap.n_micro(), 4);
        assert_eq!(snap.n_accounts(), 8);
        assert_eq!(snap.micro(2).members, vec![4, 5]);
        assert_eq!(snap.member_count(4), 4);
        assert_eq!(snap.member_count(6), 8);
        assert_eq!(snap.node_members(5), vec![4, 5, 6, 7]);
        assert_eq!(snap.account_index("acct3"), Some(3));
        assert_eq!(snap.micro_of(3), 1);
        assert_eq!(snap.account_index("nobody"), None);
    }

    #[test]
    fn test_linkage_mismatch_is_fatal() {
        let mut input = four_leaf_input();
        input.linkage.pop();
        assert!(matches!(
            Snapshot::new(input),
            Err(Error::LinkageMismatch { rows: 2, expected: 3, .. })
        ));
    }

    #[test]
    fn test_annotation_lengths_checked() {
        let snap = four_leaf_snapshot();
        assert!(snap.clone().with_tags(vec![Vec::new(); 3]).is_err());
        assert!(snap.clone().with_communities(vec![0; 8]).is_ok());
        let tagged = snap
            .with_tags(vec![vec!["b".into(), "a".into(), "a".into()]; 8])
            .unwrap();
        assert_eq!(tagged.tags_of(0).unwrap(), &["a".to_string(), "b".to_string()]);
    }
}
