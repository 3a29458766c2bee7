//! Candidate decompositions of a cluster.
//!
//! Each strategy is offered only when the cluster shows the structure it
//! exploits (enough tags, skewed degrees, reciprocal ties...), and produces a
//! [`Partition`] of the members. Scoring happens elsewhere; strategies only
//! propose.

use core::fmt;
use std::collections::{BTreeMap, HashMap};

use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};

use super::context::EvaluationContext;
use super::{Group, Partition};
use crate::community::{CommunityDetection, Louvain};
use crate::error::{Error, Result};

/// Thresholds controlling when each strategy is offered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// `individuals` is offered up to this many members.
    pub individuals_max: usize,
    /// `sample_individuals` is offered above this many members.
    pub sample_min: usize,
    /// Singletons kept by `sample_individuals`.
    pub sample_top_k: usize,
    /// Minimum tag entropy (bits) for `tag_split`.
    pub tag_entropy_min: f64,
    /// Tags that get their own group in `tag_split`.
    pub max_dominant_tags: usize,
    /// Minimum degree coefficient of variation for `core_periphery`.
    pub degree_cv_min: f64,
    /// `core_periphery` is offered above this many members.
    pub core_periphery_min: usize,
    /// Minimum reciprocal-edge ratio for `mutual_components`.
    pub reciprocity_min: f64,
    /// `mutual_components` and `louvain` are offered above this many members.
    pub graph_strategy_min: usize,
    /// Minimum share of bridge members for `bridge_extraction`.
    pub bridge_ratio_min: f64,
    /// Normalized membership entropy at which a member counts as a bridge.
    pub bridge_entropy_min: f64,
    /// Bridges shown as singletons; the rest stay in the remainder.
    pub max_bridge_singletons: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            individuals_max: 20,
            sample_min: 15,
            sample_top_k: 10,
            tag_entropy_min: 1.5,
            max_dominant_tags: 8,
            degree_cv_min: 0.5,
            core_periphery_min: 10,
            reciprocity_min: 0.1,
            graph_strategy_min: 5,
            bridge_ratio_min: 0.1,
            bridge_entropy_min: 0.6,
            max_bridge_singletons: 15,
        }
    }
}

/// The closed set of expansion strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// One singleton per member.
    Individuals,
    /// Top members by in-cluster degree as singletons, plus one overflow group.
    SampleIndividuals,
    /// One group per dominant tag, plus untagged.
    TagSplit,
    /// Above-mean vs below-mean degree.
    CorePeriphery,
    /// Connected components of the reciprocal-edge subgraph.
    MutualComponents,
    /// High-entropy (ambiguous) members as singletons, plus the remainder.
    BridgeExtraction,
    /// Louvain communities of the induced subgraph.
    Louvain,
}

impl StrategyKind {
    /// Every strategy, in tie-breaking order.
    pub const ALL: [StrategyKind; 7] = [
        StrategyKind::Individuals,
        StrategyKind::SampleIndividuals,
        StrategyKind::TagSplit,
        StrategyKind::CorePeriphery,
        StrategyKind::MutualComponents,
        StrategyKind::BridgeExtraction,
        StrategyKind::Louvain,
    ];

    /// Stable snake_case name.
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Individuals => "individuals",
            StrategyKind::SampleIndividuals => "sample_individuals",
            StrategyKind::TagSplit => "tag_split",
            StrategyKind::CorePeriphery => "core_periphery",
            StrategyKind::MutualComponents => "mutual_components",
            StrategyKind::BridgeExtraction => "bridge_extraction",
            StrategyKind::Louvain => "louvain",
        }
    }

    /// Whether this strategy applies to the cluster in `ctx`.
    pub fn offered(&self, ctx: &EvaluationContext, config: &EvaluatorConfig) -> bool {
        let n = ctx.len();
        if n == 0 {
            return false;
        }
        match self {
            StrategyKind::Individuals => n <= config.individuals_max,
            StrategyKind::SampleIndividuals => n > config.sample_min,
            StrategyKind::TagSplit => {
                let counts = tag_counts(ctx);
                counts.len() >= 2 && entropy_bits(counts.values().copied()) > config.tag_entropy_min
            }
            StrategyKind::CorePeriphery => {
                n > config.core_periphery_min
                    && degree_cv(&ctx.subgraph().degrees()) > config.degree_cv_min
            }
            StrategyKind::MutualComponents => {
                n > config.graph_strategy_min
                    && ctx.subgraph().reciprocity() > config.reciprocity_min
            }
            StrategyKind::BridgeExtraction => {
                ctx.has_soft_membership()
                    && bridges(ctx, config).len() as f64 / n as f64 > config.bridge_ratio_min
            }
            StrategyKind::Louvain => {
                n > config.graph_strategy_min && !ctx.subgraph().edges().is_empty()
            }
        }
    }

    /// Partition the members of `ctx`.
    pub fn partition(
        &self,
        ctx: &EvaluationContext,
        config: &EvaluatorConfig,
    ) -> Result<Partition> {
        let partition = match self {
            StrategyKind::Individuals => individuals(ctx),
            StrategyKind::SampleIndividuals => sample_individuals(ctx, config),
            StrategyKind::TagSplit => tag_split(ctx, config),
            StrategyKind::CorePeriphery => core_periphery(ctx),
            StrategyKind::MutualComponents => mutual_components(ctx),
            StrategyKind::BridgeExtraction => bridge_extraction(ctx, config),
            StrategyKind::Louvain => louvain(ctx)?,
        };
        partition.validate(ctx.subgraph().members())?;
        Ok(partition)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn singleton(ctx: &EvaluationContext, i: usize) -> Group {
    Group::labeled(vec![ctx.account(i)], ctx.handle(i))
}

fn individuals(ctx: &EvaluationContext) -> Partition {
    Partition::new((0..ctx.len()).map(|i| singleton(ctx, i)).collect())
}

fn sample_individuals(ctx: &EvaluationContext, config: &EvaluatorConfig) -> Partition {
    let n = ctx.len();
    let in_degree = ctx.subgraph().in_degrees();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| in_degree[b].cmp(&in_degree[a]).then(a.cmp(&b)));

    let k = config.sample_top_k.min(n.saturating_sub(1));
    let mut groups: Vec<Group> = order[..k].iter().map(|&i| singleton(ctx, i)).collect();
    let rest: Vec<u32> = order[k..].iter().map(|&i| ctx.account(i)).collect();
    if !rest.is_empty() {
        let label = format!("{} others", rest.len());
        groups.push(Group::labeled(rest, label));
    }
    Partition::new(groups)
}

fn tag_counts(ctx: &EvaluationContext) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for i in 0..ctx.len() {
        for tag in ctx.tags(i) {
            *counts.entry(tag.as_str()).or_insert(0) += 1;
        }
    }
    counts
}

/// Shannon entropy, in bits, of a frequency distribution.
pub(crate) fn entropy_bits(counts: impl Iterator<Item = usize> + Clone) -> f64 {
    let total: usize = counts.clone().sum();
    if total == 0 {
        return 0.0;
    }
    counts
        .filter(|&c| c > 0)
        .map(|c| {
            let p = c as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

fn tag_split(ctx: &EvaluationContext, config: &EvaluatorConfig) -> Partition {
    let counts = tag_counts(ctx);
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    ranked.truncate(config.max_dominant_tags);
    let rank: HashMap<&str, usize> = ranked.iter().enumerate().map(|(r, (t, _))| (*t, r)).collect();

    let mut by_tag: Vec<Vec<u32>> = vec![Vec::new(); ranked.len()];
    let mut untagged = Vec::new();
    for i in 0..ctx.len() {
        let best = ctx.tags(i).iter().filter_map(|t| rank.get(t.as_str()).copied()).min();
        match best {
            Some(r) => by_tag[r].push(ctx.account(i)),
            None => untagged.push(ctx.account(i)),
        }
    }

    let mut groups: Vec<Group> = by_tag
        .into_iter()
        .zip(ranked)
        .filter(|(members, _)| !members.is_empty())
        .map(|(members, (tag, _))| Group::labeled(members, tag))
        .collect();
    if !untagged.is_empty() {
        groups.push(Group::labeled(untagged, "untagged"));
    }
    Partition::new(groups)
}

/// Coefficient of variation (population std / mean); 0 when the mean is 0.
pub(crate) fn degree_cv(degrees: &[usize]) -> f64 {
    if degrees.is_empty() {
        return 0.0;
    }
    let n = degrees.len() as f64;
    let mean = degrees.iter().sum::<usize>() as f64 / n;
    if mean == 0.0 {
        return 0.0;
    }
    let var = degrees.iter().map(|&d| (d as f64 - mean).powi(2)).sum::<f64>() / n;
    var.sqrt() / mean
}

fn core_periphery(ctx: &EvaluationContext) -> Partition {
    let degrees = ctx.subgraph().degrees();
    let mean = degrees.iter().sum::<usize>() as f64 / degrees.len().max(1) as f64;
    let (mut core, mut periphery) = (Vec::new(), Vec::new());
    for (i, &d) in degrees.iter().enumerate() {
        if d as f64 > mean {
            core.push(ctx.account(i));
        } else {
            periphery.push(ctx.account(i));
        }
    }
    let groups = [(core, "core"), (periphery, "periphery")]
        .into_iter()
        .filter(|(members, _)| !members.is_empty())
        .map(|(members, label)| Group::labeled(members, label))
        .collect();
    Partition::new(groups)
}

fn mutual_components(ctx: &EvaluationContext) -> Partition {
    let n = ctx.len();
    let mut uf = UnionFind::<usize>::new(n);
    for (u, v) in ctx.subgraph().mutual_pairs() {
        uf.union(u, v);
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..n {
        components.entry(uf.find(i)).or_default().push(i);
    }
    let mut comps: Vec<Vec<usize>> = components.into_values().collect();
    comps.sort_by_key(|c| c[0]);

    let mut groups = Vec::new();
    let mut isolated = Vec::new();
    for comp in comps {
        if comp.len() == 1 {
            isolated.push(ctx.account(comp[0]));
        } else {
            let label = format!("mutuals of {}", ctx.handle(comp[0]));
            groups.push(Group::labeled(comp.into_iter().map(|i| ctx.account(i)).collect(), label));
        }
    }
    if !isolated.is_empty() {
        groups.push(Group::labeled(isolated, "no mutual ties"));
    }
    Partition::new(groups)
}

/// Entropy of a distribution normalized by `log2(len)`; 0 for fewer than two outcomes.
pub(crate) fn normalized_entropy(distribution: &[f64]) -> f64 {
    let positive: Vec<f64> = distribution
        .iter()
        .copied()
        .filter(|p| p.is_finite() && *p > 0.0)
        .collect();
    let total: f64 = positive.iter().sum();
    if distribution.len() < 2 || total <= 0.0 {
        return 0.0;
    }
    let h: f64 = positive
        .iter()
        .map(|p| {
            let q = p / total;
            -q * q.log2()
        })
        .sum();
    (h / (distribution.len() as f64).log2()).clamp(0.0, 1.0)
}

/// Local indices of ambiguous members, most ambiguous first.
fn bridges(ctx: &EvaluationContext, config: &EvaluatorConfig) -> Vec<usize> {
    let mut scored: Vec<(usize, f64)> = (0..ctx.len())
        .filter_map(|i| {
            let h = normalized_entropy(ctx.soft_membership(i)?);
            (h >= config.bridge_entropy_min).then_some((i, h))
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.into_iter().map(|(i, _)| i).collect()
}

fn bridge_extraction(ctx: &EvaluationContext, config: &EvaluatorConfig) -> Partition {
    let mut shown = bridges(ctx, config);
    shown.truncate(config.max_bridge_singletons);
    let mut is_shown = vec![false; ctx.len()];
    for &i in &shown {
        is_shown[i] = true;
    }

    let mut groups: Vec<Group> = shown.iter().map(|&i| singleton(ctx, i)).collect();
    let remainder: Vec<u32> = (0..ctx.len())
        .filter(|&i| !is_shown[i])
        .map(|i| ctx.account(i))
        .collect();
    if !remainder.is_empty() {
        groups.push(Group::labeled(remainder, "remainder"));
    }
    Partition::new(groups)
}

fn louvain(ctx: &EvaluationContext) -> Result<Partition> {
    let graph = ctx.subgraph().to_undirected();
    let labels = Louvain::for_subgraph_size(ctx.len()).detect(&graph)?;
    let n_groups = labels.iter().copied().max().map_or(0, |m| m + 1);
    if n_groups == 0 {
        return Err(Error::EmptyInput);
    }
    let mut groups: Vec<Vec<u32>> = vec![Vec::new(); n_groups];
    for (i, &label) in labels.iter().enumerate() {
        groups[label].push(ctx.account(i));
    }
    Ok(Partition::new(groups.into_iter().map(Group::new).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InducedSubgraph;

    fn ring(n: usize) -> Vec<(usize, usize)> {
        (0..n).map(|i| (i, (i + 1) % n)).collect()
    }

    fn ctx(n: usize, edges: Vec<(usize, usize)>) -> EvaluationContext {
        EvaluationContext::new(InducedSubgraph::new((100..100 + n as u32).collect(), edges))
    }

    fn sizes(p: &Partition) -> Vec<usize> {
        p.groups.iter().map(|g| g.members.len()).collect()
    }

    #[test]
    fn test_individuals_offer_window() {
        let cfg = EvaluatorConfig::default();
        assert!(StrategyKind::Individuals.offered(&ctx(20, vec![]), &cfg));
        assert!(!StrategyKind::Individuals.offered(&ctx(21, vec![]), &cfg));
        let p = StrategyKind::Individuals.partition(&ctx(3, vec![]), &cfg).unwrap();
        assert_eq!(sizes(&p), vec![1, 1, 1]);
        assert_eq!(p.groups[0].members, vec![100]);
    }

    #[test]
    fn test_sample_individuals_keeps_top_degree() {
        let cfg = EvaluatorConfig::default();
        // Everyone follows local node 5.
        let edges: Vec<_> = (0..20).filter(|&i| i != 5).map(|i| (i, 5)).collect();
        let c = ctx(20, edges);
        assert!(StrategyKind::SampleIndividuals.offered(&c, &cfg));
        assert!(!StrategyKind::SampleIndividuals.offered(&ctx(15, vec![]), &cfg));
        let p = StrategyKind::SampleIndividuals.partition(&c, &cfg).unwrap();
        assert_eq!(p.groups.len(), 11);
        assert_eq!(p.groups[0].members, vec![105]);
        assert_eq!(p.groups[10].members.len(), 10);
        assert_eq!(p.groups[10].label.as_deref(), Some("10 others"));
    }

    #[test]
    fn test_tag_split() {
        let cfg = EvaluatorConfig::default();
        let names = ["a", "b", "c", "d"];
        let tags: Vec<Vec<String>> = (0..12)
            .map(|i| if i < 8 { vec![names[i % 4].to_string()] } else { vec![] })
            .collect();
        let c = ctx(12, vec![]).with_tags(tags);
        // Four equally frequent tags: 2 bits of entropy.
        assert!(StrategyKind::TagSplit.offered(&c, &cfg));
        let p = StrategyKind::TagSplit.partition(&c, &cfg).unwrap();
        assert_eq!(sizes(&p), vec![2, 2, 2, 2, 4]);
        assert_eq!(p.groups[4].label.as_deref(), Some("untagged"));

        let two_tags: Vec<Vec<String>> = (0..12).map(|i| vec![names[i % 2].to_string()]).collect();
        assert!(!StrategyKind::TagSplit.offered(&ctx(12, vec![]).with_tags(two_tags), &cfg));
    }

    #[test]
    fn test_core_periphery() {
        let cfg = EvaluatorConfig::default();
        // Star: hub 0 <-> everyone.
        let mut edges = Vec::new();
        for i in 1..12 {
            edges.push((0, i));
            edges.push((i, 0));
        }
        let c = ctx(12, edges);
        assert!(degree_cv(&c.subgraph().degrees()) > 0.5);
        assert!(StrategyKind::CorePeriphery.offered(&c, &cfg));
        let p = StrategyKind::CorePeriphery.partition(&c, &cfg).unwrap();
        assert_eq!(sizes(&p), vec![1, 11]);
        assert!(!StrategyKind::CorePeriphery.offered(&ctx(12, ring(12)), &cfg));
    }

    #[test]
    fn test_mutual_components() {
        let cfg = EvaluatorConfig::default();
        let edges = vec![(0, 1), (1, 0), (1, 2), (2, 1), (3, 4), (4, 3), (5, 0)];
        let c = ctx(6, edges);
        assert!(StrategyKind::MutualComponents.offered(&c, &cfg));
        let p = StrategyKind::MutualComponents.partition(&c, &cfg).unwrap();
        assert_eq!(sizes(&p), vec![3, 2, 1]);
        assert_eq!(p.groups[2].label.as_deref(), Some("no mutual ties"));
    }

    #[test]
    fn test_bridge_extraction() {
        let cfg = EvaluatorConfig::default();
        let soft: Vec<Vec<f64>> = (0..10)
            .map(|i| if i < 3 { vec![0.5, 0.5] } else { vec![1.0, 0.0] })
            .collect();
        let c = ctx(10, vec![]).with_soft_membership(soft);
        assert!(StrategyKind::BridgeExtraction.offered(&c, &cfg));
        let p = StrategyKind::BridgeExtraction.partition(&c, &cfg).unwrap();
        assert_eq!(sizes(&p), vec![1, 1, 1, 7]);
        assert!(!StrategyKind::BridgeExtraction.offered(&ctx(10, vec![]), &cfg));
    }

    #[test]
    fn test_louvain_strategy() {
        let cfg = EvaluatorConfig::default();
        let mut edges = Vec::new();
        for clique in [[0, 1, 2], [3, 4, 5]] {
            for &a in &clique {
                for &b in &clique {
                    if a != b {
                        edges.push((a, b));
                    }
                }
            }
        }
        edges.push((2, 3));
        let c = ctx(6, edges);
        assert!(StrategyKind::Louvain.offered(&c, &cfg));
        let p = StrategyKind::Louvain.partition(&c, &cfg).unwrap();
        assert_eq!(sizes(&p), vec![3, 3]);
        assert!(!StrategyKind::Louvain.offered(&ctx(6, vec![]), &cfg));
    }

    #[test]
    fn test_entropy_helpers() {
        assert!((entropy_bits([1usize, 1, 1, 1].into_iter()) - 2.0).abs() < 1e-12);
        assert_eq!(normalized_entropy(&[1.0]), 0.0);
        assert!((normalized_entropy(&[0.25, 0.25, 0.25, 0.25]) - 1.0).abs() < 1e-12);
        assert_eq!(normalized_entropy(&[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_names_are_snake_case() {
        assert_eq!(StrategyKind::SampleIndividuals.to_string(), "sample_individuals");
        let json = serde_json::to_string(&StrategyKind::CorePeriphery).unwrap();
        assert_eq!(json, "\"core_periphery\"");
    }
}
