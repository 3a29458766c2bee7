//! Run every offered strategy and rank the results.

use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use serde::Serialize;

use super::context::EvaluationContext;
use super::score::{score_partition, ScoreBreakdown, ScoreWeights};
use super::strategy::{EvaluatorConfig, StrategyKind};
use super::Partition;

/// One candidate decomposition with its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredStrategy {
    /// Which strategy produced it.
    pub kind: StrategyKind,
    /// The proposed groups.
    pub partition: Partition,
    /// Component and total scores.
    pub score: ScoreBreakdown,
    /// Wall time spent partitioning and scoring.
    pub execution_ms: f64,
}

impl ScoredStrategy {
    /// Number of groups in the partition.
    pub fn n_clusters(&self) -> usize {
        self.partition.groups.len()
    }
}

/// Sort best-first: total descending, then strategy order.
pub fn rank(strategies: &mut [ScoredStrategy]) {
    strategies.sort_by(|a, b| b.score.total.total_cmp(&a.score.total).then(a.kind.cmp(&b.kind)));
}

/// Recompute totals under `weights` and re-sort.
pub fn rerank(strategies: &mut [ScoredStrategy], weights: &ScoreWeights) {
    for s in strategies.iter_mut() {
        s.score.reweight(weights);
    }
    rank(strategies);
}

/// Evaluates the closed set of strategies against a cluster.
#[derive(Debug, Clone, Default)]
pub struct ExpansionEvaluator {
    config: EvaluatorConfig,
    weights: ScoreWeights,
}

impl ExpansionEvaluator {
    /// Evaluator with default thresholds and uniform weights.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set offer thresholds.
    pub fn with_config(mut self, config: EvaluatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set score weights.
    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Offer thresholds in use.
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Score weights in use.
    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Run one strategy; `None` when it is not offered or fails.
    fn run(&self, kind: StrategyKind, ctx: &EvaluationContext) -> Option<ScoredStrategy> {
        if !kind.offered(ctx, &self.config) {
            return None;
        }
        let start = Instant::now();
        match kind.partition(ctx, &self.config) {
            Ok(partition) => {
                let score = score_partition(&partition, ctx, &self.weights);
                let execution_ms = start.elapsed().as_secs_f64() * 1000.0;
                log::debug!(
                    "strategy {kind}: {} groups, total {:.3} in {execution_ms:.2}ms",
                    partition.groups.len(),
                    score.total
                );
                Some(ScoredStrategy {
                    kind,
                    partition,
                    score,
                    execution_ms,
                })
            }
            Err(e) => {
                log::warn!("strategy {kind} failed on {} members: {e}", ctx.len());
                None
            }
        }
    }

    /// Ranked list of every strategy that was offered and succeeded.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> Vec<ScoredStrategy> {
        #[cfg(feature = "parallel")]
        let mut scored: Vec<ScoredStrategy> = StrategyKind::ALL
            .par_iter()
            .filter_map(|&kind| self.run(kind, ctx))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let mut scored: Vec<ScoredStrategy> = StrategyKind::ALL
            .iter()
            .filter_map(|&kind| self.run(kind, ctx))
            .collect();

        rank(&mut scored);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::score::SINGLE_CLUSTER_SCORE;
    use crate::graph::InducedSubgraph;

    fn two_cliques(size: usize) -> EvaluationContext {
        let mut edges = Vec::new();
        for offset in [0, size] {
            for a in offset..offset + size {
                for b in offset..offset + size {
                    if a != b {
                        edges.push((a, b));
                    }
                }
            }
        }
        edges.push((0, size));
        edges.push((size, 0));
        EvaluationContext::new(InducedSubgraph::new((0..2 * size as u32).collect(), edges))
    }

    #[test]
    fn test_ranked_best_first() {
        let ranked = ExpansionEvaluator::new().evaluate(&two_cliques(6));
        assert!(!ranked.is_empty());
        for pair in ranked.windows(2) {
            assert!(pair[0].score.total >= pair[1].score.total);
        }
        let kinds: Vec<_> = ranked.iter().map(|s| s.kind).collect();
        assert!(kinds.contains(&StrategyKind::Louvain));
        assert!(kinds.contains(&StrategyKind::Individuals));
        assert!(!kinds.contains(&StrategyKind::TagSplit));
    }

    #[test]
    fn test_scores_in_unit_interval() {
        for s in ExpansionEvaluator::new().evaluate(&two_cliques(8)) {
            match s.n_clusters() {
                1 => assert_eq!(s.score.total, SINGLE_CLUSTER_SCORE),
                _ => assert!((0.0..=1.0).contains(&s.score.total), "{:?}", s.score),
            }
        }
    }

    #[test]
    fn test_louvain_wins_on_clear_communities() {
        let ranked = ExpansionEvaluator::new().evaluate(&two_cliques(12));
        assert_eq!(ranked[0].kind, StrategyKind::Louvain);
        assert_eq!(ranked[0].n_clusters(), 2);
    }

    #[test]
    fn test_empty_context_yields_nothing() {
        assert!(ExpansionEvaluator::new().evaluate(&EvaluationContext::default()).is_empty());
    }

    #[test]
    fn test_rerank_changes_order() {
        let mut ranked = ExpansionEvaluator::new().evaluate(&two_cliques(6));
        rerank(
            &mut ranked,
            &ScoreWeights {
                size_entropy: 0.0,
                collapse: 1.0,
                fragmentation: 0.0,
                edge_separation: 0.0,
                tag_coherence: 0.0,
            },
        );
        // Pure collapse weighting favours singletons.
        assert_eq!(ranked[0].kind, StrategyKind::Individuals);
    }
}
