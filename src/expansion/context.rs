//! Inputs to one strategy evaluation.

use std::collections::HashMap;

use crate::graph::InducedSubgraph;
use crate::snapshot::Snapshot;

/// Everything a strategy may look at for one cluster: its induced subgraph
/// plus optional per-member annotations, all indexed by local position.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    subgraph: InducedSubgraph,
    local: HashMap<u32, usize>,
    handles: Vec<String>,
    tags: Option<Vec<Vec<String>>>,
    soft_membership: Option<Vec<Vec<f64>>>,
}

impl EvaluationContext {
    /// Context over a subgraph without annotations. Handles default to account indices.
    pub fn new(subgraph: InducedSubgraph) -> Self {
        let local = subgraph.members().iter().enumerate().map(|(i, &m)| (m, i)).collect();
        let handles = subgraph.members().iter().map(|m| m.to_string()).collect();
        Self {
            subgraph,
            local,
            handles,
            tags: None,
            soft_membership: None,
        }
    }

    /// Gather the members' subgraph and annotations from a snapshot.
    pub fn from_snapshot(snapshot: &Snapshot, members: &[u32]) -> Self {
        let mut ctx = Self::new(snapshot.adjacency().induced(members));
        ctx.handles = members.iter().map(|&m| snapshot.handle(m as usize).to_string()).collect();
        if snapshot.has_tags() {
            ctx.tags = Some(
                members
                    .iter()
                    .map(|&m| snapshot.tags_of(m as usize).unwrap_or_default().to_vec())
                    .collect(),
            );
        }
        if snapshot.has_soft_membership() {
            ctx.soft_membership = Some(
                members
                    .iter()
                    .map(|&m| snapshot.soft_membership_of(m as usize).unwrap_or_default().to_vec())
                    .collect(),
            );
        }
        ctx
    }

    /// Replace display handles (one per member).
    pub fn with_handles(mut self, handles: Vec<String>) -> Self {
        self.handles = handles;
        self
    }

    /// Attach tag sets (one per member).
    pub fn with_tags(mut self, tags: Vec<Vec<String>>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Attach soft membership distributions (one per member).
    pub fn with_soft_membership(mut self, distributions: Vec<Vec<f64>>) -> Self {
        self.soft_membership = Some(distributions);
        self
    }

    /// The induced subgraph.
    pub fn subgraph(&self) -> &InducedSubgraph {
        &self.subgraph
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.subgraph.len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.subgraph.is_empty()
    }

    /// Global account index of local member `i`.
    pub fn account(&self, i: usize) -> u32 {
        self.subgraph.members()[i]
    }

    /// Handle of local member `i`.
    pub fn handle(&self, i: usize) -> &str {
        &self.handles[i]
    }

    /// Whether tags were provided.
    pub fn has_tags(&self) -> bool {
        self.tags.is_some()
    }

    /// Tags of local member `i` (empty without tags).
    pub fn tags(&self, i: usize) -> &[String] {
        match &self.tags {
            Some(t) => t[i].as_slice(),
            None => &[],
        }
    }

    /// Tags of a member given by global account index.
    pub fn tags_of_account(&self, account: u32) -> &[String] {
        match self.local.get(&account) {
            Some(&i) => self.tags(i),
            None => &[],
        }
    }

    /// Soft membership of local member `i`, if provided.
    pub fn soft_membership(&self, i: usize) -> Option<&[f64]> {
        self.soft_membership.as_ref().map(|s| s[i].as_slice())
    }

    /// Whether soft memberships were provided.
    pub fn has_soft_membership(&self) -> bool {
        self.soft_membership.is_some()
    }
}
