//! Aggregated follow edges between visible clusters.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::id::ClusterId;
use crate::snapshot::Snapshot;

const UNASSIGNED: u32 = u32::MAX;

/// All follow edges between two visible clusters, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterEdge {
    /// Earlier cluster in display order.
    pub source: ClusterId,
    /// Later cluster in display order.
    pub target: ClusterId,
    /// Number of follow edges.
    pub count: usize,
    /// Community-adjusted weight.
    pub weight: f64,
}

/// Multiplier for one follow edge under Louvain fusion.
///
/// Edges inside one whole-graph community count `1 + w`, edges across
/// communities `max(0, 1 - w)`. Without community data every edge counts 1.
pub fn fusion_factor(same_community: Option<bool>, louvain_weight: f64) -> f64 {
    match same_community {
        Some(true) => 1.0 + louvain_weight,
        Some(false) => (1.0 - louvain_weight).max(0.0),
        None => 1.0,
    }
}

/// Aggregate edges whose endpoints fall in different clusters.
///
/// `members[i]` are the accounts of the `i`-th visible cluster and `ids[i]`
/// its id. Accounts in no cluster are skipped.
pub fn inter_cluster_edges(
    snapshot: &Snapshot,
    ids: &[ClusterId],
    members: &[Vec<u32>],
    louvain_weight: f64,
) -> Vec<ClusterEdge> {
    let mut owner = vec![UNASSIGNED; snapshot.n_accounts()];
    for (cluster, accounts) in members.iter().enumerate() {
        for &a in accounts {
            owner[a as usize] = cluster as u32;
        }
    }

    let mut totals: BTreeMap<(u32, u32), (usize, f64)> = BTreeMap::new();
    for (u, v) in snapshot.adjacency().edges() {
        let (cu, cv) = (owner[u], owner[v]);
        if cu == cv || cu == UNASSIGNED || cv == UNASSIGNED {
            continue;
        }
        let same = match (snapshot.community_of(u), snapshot.community_of(v)) {
            (Some(a), Some(b)) => Some(a == b),
            _ => None,
        };
        let entry = totals.entry((cu.min(cv), cu.max(cv))).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += fusion_factor(same, louvain_weight);
    }

    totals
        .into_iter()
        .map(|((a, b), (count, weight))| ClusterEdge {
            source: ids[a as usize].clone(),
            target: ids[b as usize].clone(),
            count,
            weight,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::fixtures::four_leaf_snapshot;

    #[test]
    fn test_fusion_factor() {
        assert_eq!(fusion_factor(Some(true), 0.5), 1.5);
        assert_eq!(fusion_factor(Some(false), 0.5), 0.5);
        assert_eq!(fusion_factor(Some(false), 1.0), 0.0);
        assert_eq!(fusion_factor(None, 1.0), 1.0);
    }

    #[test]
    fn test_edges_between_halves() {
        let snap = four_leaf_snapshot();
        let ids = vec![ClusterId::node(4), ClusterId::node(5)];
        let members = vec![snap.node_members(4), snap.node_members(5)];
        let edges = inter_cluster_edges(&snap, &ids, &members, 0.0);
        // 0->1, 1->0, 2->3, 0->2 stay in d_4; 4..7 stay in d_5; 1->6 crosses.
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source, ClusterId::node(4));
        assert_eq!(edges[0].target, ClusterId::node(5));
        assert_eq!(edges[0].count, 1);
        assert_eq!(edges[0].weight, 1.0);
    }

    #[test]
    fn test_louvain_fusion_weights() {
        let snap = four_leaf_snapshot()
            .with_communities(vec![0, 0, 0, 0, 1, 1, 0, 1])
            .unwrap();
        let ids: Vec<_> = (0..4).map(ClusterId::node).collect();
        let members: Vec<_> = (0..4).map(|leaf| snap.micro(leaf).members.clone()).collect();
        let edges = inter_cluster_edges(&snap, &ids, &members, 0.5);

        let find = |a: usize, b: usize| {
            edges
                .iter()
                .find(|e| e.source == ClusterId::node(a) && e.target == ClusterId::node(b))
                .unwrap()
        };
        // 0->2: leaf 0 to leaf 1, same community.
        assert_eq!(find(0, 1).count, 1);
        assert_eq!(find(0, 1).weight, 1.5);
        // 1->6: same community.
        assert_eq!(find(0, 3).weight, 1.5);
        // 5->6 crosses communities, 7->4 does not.
        assert_eq!(find(2, 3).count, 2);
        assert_eq!(find(2, 3).weight, 0.5 + 1.5);
    }
}
