//! Structure detection for a single cluster.
//!
//! A dendrogram only knows one way to split a node: into its two children.
//! Social clusters often have more meaningful decompositions (a few hubs and
//! their audience, tag communities, reciprocal friend groups). When a large
//! cluster is expanded, every applicable strategy proposes a partition of its
//! members and each proposal is scored:
//!
//! ```text
//! members ──► induced subgraph ──► [strategy offered?] ──► partition ──► score
//!                                    individuals                        │
//!                                    sample_individuals                 ▼
//!                                    tag_split                     ranked list
//!                                    core_periphery
//!                                    mutual_components
//!                                    bridge_extraction
//!                                    louvain
//! ```
//!
//! A failing strategy is logged and left out of the ranking; it never
//! prevents the others from being scored.

mod context;
mod evaluator;
pub mod score;
mod strategy;

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{Error, Result};

pub use context::EvaluationContext;
pub use evaluator::{rank, rerank, ExpansionEvaluator, ScoredStrategy};
pub use score::{ScoreBreakdown, ScoreWeights};
pub use strategy::{EvaluatorConfig, StrategyKind};

/// One proposed sub-cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    /// Member account indices.
    pub members: Vec<u32>,
    /// Human-readable name suggested by the strategy.
    pub label: Option<String>,
}

impl Group {
    /// Unlabeled group.
    pub fn new(members: Vec<u32>) -> Self {
        Self { members, label: None }
    }

    /// Group with a strategy-provided label.
    pub fn labeled(members: Vec<u32>, label: impl Into<String>) -> Self {
        Self {
            members,
            label: Some(label.into()),
        }
    }
}

/// A partition of a cluster's members into groups.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Partition {
    /// Non-empty, disjoint groups covering every member.
    pub groups: Vec<Group>,
}

impl Partition {
    /// Wrap groups.
    pub fn new(groups: Vec<Group>) -> Self {
        Self { groups }
    }

    /// Check that the groups are non-empty and cover `members` exactly once.
    pub fn validate(&self, members: &[u32]) -> Result<()> {
        if self.groups.iter().any(|g| g.members.is_empty()) {
            return Err(Error::Other("partition contains an empty group".into()));
        }
        let expected: HashSet<u32> = members.iter().copied().collect();
        let mut seen = HashSet::with_capacity(members.len());
        for &m in self.groups.iter().flat_map(|g| &g.members) {
            if !expected.contains(&m) {
                return Err(Error::Other(format!("partition contains non-member {m}")));
            }
            if !seen.insert(m) {
                return Err(Error::Other(format!("member {m} assigned twice")));
            }
        }
        if seen.len() != expected.len() {
            return Err(Error::Other(format!(
                "partition covers {} of {} members",
                seen.len(),
                expected.len()
            )));
        }
        Ok(())
    }
}
