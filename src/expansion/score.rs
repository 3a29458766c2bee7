//! Structure scores for candidate partitions.
//!
//! Each component lies in `[0, 1]`, higher meaning "more useful to render":
//!
//! | Component | Formula |
//! |-----------|---------|
//! | size entropy | H({|C_i|}) / log2(k) |
//! | collapse | 1 − max|C_i| / Σ|C_i| |
//! | fragmentation | 1 − #singletons / Σ|C_i| |
//! | edge separation | intra / (intra + inter) edges, 0.5 without edges |
//! | tag coherence | size-weighted mean dominant-tag purity, 0.5 without tags |
//!
//! The total is the weighted sum with weights normalized to 1. Degenerate
//! partitions get fixed totals: 0 for no clusters, [`SINGLE_CLUSTER_SCORE`]
//! for one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::context::EvaluationContext;
use super::Partition;

/// Total assigned to a partition with exactly one cluster.
pub const SINGLE_CLUSTER_SCORE: f64 = 0.2;

const NEUTRAL: f64 = 0.5;

/// Relative weight of each score component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Weight of [`ScoreBreakdown::size_entropy`].
    pub size_entropy: f64,
    /// Weight of [`ScoreBreakdown::collapse`].
    pub collapse: f64,
    /// Weight of [`ScoreBreakdown::fragmentation`].
    pub fragmentation: f64,
    /// Weight of [`ScoreBreakdown::edge_separation`].
    pub edge_separation: f64,
    /// Weight of [`ScoreBreakdown::tag_coherence`].
    pub tag_coherence: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self::uniform()
    }
}

impl ScoreWeights {
    /// Equal weight on every component.
    pub fn uniform() -> Self {
        Self {
            size_entropy: 0.2,
            collapse: 0.2,
            fragmentation: 0.2,
            edge_separation: 0.2,
            tag_coherence: 0.2,
        }
    }

    fn as_array(&self) -> [f64; 5] {
        [
            self.size_entropy,
            self.collapse,
            self.fragmentation,
            self.edge_separation,
            self.tag_coherence,
        ]
    }

    /// Weights scaled to sum to 1.
    ///
    /// Negative or non-finite weights count as 0; if nothing is left the
    /// weights fall back to uniform.
    pub fn normalized(&self) -> Self {
        let clean = self.as_array().map(|w| if w.is_finite() && w > 0.0 { w } else { 0.0 });
        let sum: f64 = clean.iter().sum();
        if sum <= 0.0 {
            return Self::uniform();
        }
        let [size_entropy, collapse, fragmentation, edge_separation, tag_coherence] =
            clean.map(|w| w / sum);
        Self {
            size_entropy,
            collapse,
            fragmentation,
            edge_separation,
            tag_coherence,
        }
    }
}

/// Per-component scores of one partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    /// Normalized Shannon entropy of cluster sizes.
    pub size_entropy: f64,
    /// One minus the share of the largest cluster.
    pub collapse: f64,
    /// One minus the share of singleton clusters.
    pub fragmentation: f64,
    /// Share of induced edges that stay within a cluster.
    pub edge_separation: f64,
    /// Mean dominant-tag purity.
    pub tag_coherence: f64,
    /// Weighted total.
    pub total: f64,
    /// Why the total was fixed rather than weighted, for degenerate partitions.
    pub reason: Option<String>,
    /// Number of clusters.
    pub n_clusters: usize,
}

impl ScoreBreakdown {
    /// Recompute `total` under different weights.
    pub fn reweight(&mut self, weights: &ScoreWeights) {
        self.total = match self.n_clusters {
            0 => 0.0,
            1 => SINGLE_CLUSTER_SCORE,
            _ => {
                let w = weights.normalized();
                w.size_entropy * self.size_entropy
                    + w.collapse * self.collapse
                    + w.fragmentation * self.fragmentation
                    + w.edge_separation * self.edge_separation
                    + w.tag_coherence * self.tag_coherence
            }
        };
    }
}

/// Shannon entropy of sizes normalized by `log2(k)`; exactly 1 for equal sizes.
pub fn size_entropy(sizes: &[usize]) -> f64 {
    let k = sizes.len();
    if k <= 1 {
        return 0.0;
    }
    if sizes.iter().all(|&s| s == sizes[0]) {
        return 1.0;
    }
    let total: usize = sizes.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let h: f64 = sizes
        .iter()
        .filter(|&&s| s > 0)
        .map(|&s| {
            let p = s as f64 / total as f64;
            -p * p.log2()
        })
        .sum();
    (h / (k as f64).log2()).clamp(0.0, 1.0)
}

/// Score `partition` of the members of `ctx`.
pub fn score_partition(
    partition: &Partition,
    ctx: &EvaluationContext,
    weights: &ScoreWeights,
) -> ScoreBreakdown {
    let sizes: Vec<usize> = partition.groups.iter().map(|g| g.members.len()).collect();
    let k = sizes.len();
    let total_members: usize = sizes.iter().sum();

    let (collapse, fragmentation) = if total_members == 0 {
        (0.0, 0.0)
    } else {
        let largest = sizes.iter().copied().max().unwrap_or(0);
        let singletons = sizes.iter().filter(|&&s| s == 1).count();
        (
            1.0 - largest as f64 / total_members as f64,
            1.0 - singletons as f64 / total_members as f64,
        )
    };

    let mut breakdown = ScoreBreakdown {
        size_entropy: size_entropy(&sizes),
        collapse,
        fragmentation,
        edge_separation: edge_separation(partition, ctx),
        tag_coherence: tag_coherence(partition, ctx),
        total: 0.0,
        reason: match k {
            0 => Some("empty partition".to_string()),
            1 => Some("single cluster: partition reveals no structure".to_string()),
            _ => None,
        },
        n_clusters: k,
    };
    breakdown.reweight(weights);
    breakdown
}

fn group_of(partition: &Partition) -> HashMap<u32, usize> {
    partition
        .groups
        .iter()
        .enumerate()
        .flat_map(|(g, group)| group.members.iter().map(move |&m| (m, g)))
        .collect()
}

fn edge_separation(partition: &Partition, ctx: &EvaluationContext) -> f64 {
    let edges = ctx.subgraph().edges();
    if edges.is_empty() {
        return NEUTRAL;
    }
    let members = ctx.subgraph().members();
    let groups = group_of(partition);
    let (mut intra, mut inter) = (0usize, 0usize);
    for &(u, v) in edges {
        match (groups.get(&members[u]), groups.get(&members[v])) {
            (Some(a), Some(b)) if a == b => intra += 1,
            (Some(_), Some(_)) => inter += 1,
            _ => {}
        }
    }
    if intra + inter == 0 {
        return NEUTRAL;
    }
    intra as f64 / (intra + inter) as f64
}

fn tag_coherence(partition: &Partition, ctx: &EvaluationContext) -> f64 {
    if !ctx.has_tags() {
        return NEUTRAL;
    }
    let mut weighted = 0.0;
    let mut weight = 0.0;
    for group in &partition.groups {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut tagged = 0usize;
        for &m in &group.members {
            let tags = ctx.tags_of_account(m);
            if tags.is_empty() {
                continue;
            }
            tagged += 1;
            for tag in tags {
                *counts.entry(tag.as_str()).or_insert(0) += 1;
            }
        }
        if tagged == 0 {
            continue;
        }
        let dominant = counts.values().copied().max().unwrap_or(0);
        let w = group.members.len() as f64;
        weighted += w * dominant as f64 / tagged as f64;
        weight += w;
    }
    if weight == 0.0 {
        NEUTRAL
    } else {
        weighted / weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::Group;
    use crate::graph::InducedSubgraph;

    fn partition(groups: &[&[u32]]) -> Partition {
        Partition {
            groups: groups.iter().map(|g| Group::new(g.to_vec())).collect(),
        }
    }

    fn ctx(n: u32, edges: Vec<(usize, usize)>) -> EvaluationContext {
        EvaluationContext::new(InducedSubgraph::new((0..n).collect(), edges))
    }

    #[test]
    fn test_equal_sizes_have_entropy_one() {
        for k in 2..12 {
            assert_eq!(size_entropy(&vec![7; k]), 1.0);
        }
        assert_eq!(size_entropy(&[5]), 0.0);
        assert_eq!(size_entropy(&[]), 0.0);
        assert!(size_entropy(&[9, 1]) < 0.5);
    }

    #[test]
    fn test_single_cluster_fixed_score() {
        let ctx = ctx(4, vec![(0, 1)]);
        let score = score_partition(&partition(&[&[0, 1, 2, 3]]), &ctx, &ScoreWeights::default());
        assert_eq!(score.total, SINGLE_CLUSTER_SCORE);
        assert!(score.reason.is_some());

        let mut reweighted = score.clone();
        reweighted.reweight(&ScoreWeights {
            size_entropy: 9.0,
            ..ScoreWeights::default()
        });
        assert_eq!(reweighted.total, SINGLE_CLUSTER_SCORE);
    }

    #[test]
    fn test_empty_partition_scores_zero() {
        let score = score_partition(&partition(&[]), &ctx(0, vec![]), &ScoreWeights::default());
        assert_eq!(score.total, 0.0);
    }

    #[test]
    fn test_components() {
        // Two dense pairs joined by one edge.
        let ctx = ctx(4, vec![(0, 1), (1, 0), (2, 3), (3, 2), (1, 2)]);
        let weights = ScoreWeights::default();
        let score = score_partition(&partition(&[&[0, 1], &[2, 3]]), &ctx, &weights);
        assert_eq!(score.size_entropy, 1.0);
        assert!((score.collapse - 0.5).abs() < 1e-12);
        assert_eq!(score.fragmentation, 1.0);
        assert!((score.edge_separation - 0.8).abs() < 1e-12);
        assert_eq!(score.tag_coherence, 0.5);
        assert!((score.total - (1.0 + 0.5 + 1.0 + 0.8 + 0.5) / 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_edges_is_neutral() {
        let weights = ScoreWeights::default();
        let score = score_partition(&partition(&[&[0], &[1]]), &ctx(2, vec![]), &weights);
        assert_eq!(score.edge_separation, 0.5);
        assert_eq!(score.fragmentation, 0.0);
    }

    #[test]
    fn test_tag_coherence() {
        let tags = vec![
            vec!["rust".to_string()],
            vec!["rust".to_string()],
            vec!["go".to_string()],
            vec![],
        ];
        let ctx = ctx(4, vec![]).with_tags(tags);
        let pure = score_partition(&partition(&[&[0, 1], &[2, 3]]), &ctx, &ScoreWeights::default());
        assert_eq!(pure.tag_coherence, 1.0);
        let mixed =
            score_partition(&partition(&[&[0, 2], &[1, 3]]), &ctx, &ScoreWeights::default());
        // group {0,2}: purity 0.5 (weight 2); group {1,3}: purity 1.0 (weight 2)
        assert!((mixed.tag_coherence - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_weights_normalize() {
        let w = ScoreWeights {
            size_entropy: 2.0,
            collapse: 2.0,
            fragmentation: 0.0,
            edge_separation: -1.0,
            tag_coherence: f64::NAN,
        }
        .normalized();
        assert_eq!(w.size_entropy, 0.5);
        assert_eq!(w.edge_separation, 0.0);
        assert_eq!(w.tag_coherence, 0.0);

        let zero = ScoreWeights {
            size_entropy: 0.0,
            collapse: 0.0,
            fragmentation: 0.0,
            edge_separation: 0.0,
            tag_coherence: 0.0,
        };
        assert_eq!(zero.normalized(), ScoreWeights::uniform());
    }
}
