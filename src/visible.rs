//! Budget-constrained navigation over the dendrogram.
//!
//! A request starts from a flat cut of the tree and then edits it:
//!
//! ```text
//! base cut ──► focus ──► expand (caller order) ──► collapse
//! ```
//!
//! The visible entries always partition the accounts: every account appears
//! in exactly one entry. Entries are dendrogram nodes or virtual clusters
//! (groups of a strategy partition). The number of entries never exceeds the
//! budget; an edit that would break the budget is cut short or skipped.
//!
//! Stale ids are expected (an earlier edit in the same request may already
//! have consumed them) and are logged and reported, never fatal.

use std::collections::HashMap;

use serde::Serialize;

use crate::cache::StrategyCache;
use crate::config::{ExpandPolicy, ViewRequest};
use crate::expansion::{
    rerank, ExpansionEvaluator, Partition, ScoreWeights, ScoredStrategy, StrategyKind,
};
use crate::hierarchy::LeafMemo;
use crate::id::ClusterId;
use crate::snapshot::Snapshot;

/// A group produced by an expansion strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualCluster {
    /// `<parent>_local_<n>`.
    pub id: ClusterId,
    /// Member accounts, sorted.
    pub members: Vec<u32>,
    /// Label suggested by the strategy.
    pub label: Option<String>,
    /// Strategy that produced the group.
    pub strategy: StrategyKind,
}

/// One rendered cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum VisibleEntry {
    /// A dendrogram node.
    Node(usize),
    /// A strategy group.
    Virtual(VirtualCluster),
}

impl VisibleEntry {
    /// Opaque id of the entry.
    pub fn id(&self) -> ClusterId {
        match self {
            VisibleEntry::Node(n) => ClusterId::node(*n),
            VisibleEntry::Virtual(v) => v.id.clone(),
        }
    }

    /// The dendrogram node, for tree entries.
    pub fn node(&self) -> Option<usize> {
        match self {
            VisibleEntry::Node(n) => Some(*n),
            VisibleEntry::Virtual(_) => None,
        }
    }

    /// The dendrogram node this entry was derived from.
    pub fn root_node(&self) -> usize {
        match self {
            VisibleEntry::Node(n) => *n,
            VisibleEntry::Virtual(v) => v.id.root_node(),
        }
    }

    /// Member accounts, sorted.
    pub fn members(&self, snapshot: &Snapshot) -> Vec<u32> {
        match self {
            VisibleEntry::Node(n) => snapshot.node_members(*n),
            VisibleEntry::Virtual(v) => v.members.clone(),
        }
    }

    /// Number of member accounts.
    pub fn member_count(&self, snapshot: &Snapshot) -> usize {
        match self {
            VisibleEntry::Node(n) => snapshot.member_count(*n),
            VisibleEntry::Virtual(v) => v.members.len(),
        }
    }

    fn matches(&self, id: &ClusterId) -> bool {
        match (self, id) {
            (VisibleEntry::Node(n), ClusterId::Dendrogram(m)) => *n == *m as usize,
            (VisibleEntry::Virtual(v), ClusterId::Virtual { .. }) => v.id == *id,
            _ => false,
        }
    }
}

/// Result of a focus request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FocusOutcome {
    /// Requested account node id.
    pub target: String,
    /// Micro-cluster of the account, when it exists.
    pub leaf: Option<usize>,
    /// Whether the micro-cluster is visible on its own.
    pub success: bool,
    /// Splits performed.
    pub steps: usize,
}

/// The rendered clusters of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleSet {
    /// Entries in display order.
    pub entries: Vec<VisibleEntry>,
    /// Budget the set was built under.
    pub budget: usize,
    /// Focus result, if focus was requested.
    pub focus: Option<FocusOutcome>,
    /// Expand/collapse ids that had no effect.
    pub ignored_ids: Vec<ClusterId>,
}

impl VisibleSet {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is visible.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unused budget.
    pub fn remaining(&self) -> usize {
        self.budget.saturating_sub(self.entries.len())
    }

    /// Ids of the entries in display order.
    pub fn ids(&self) -> Vec<ClusterId> {
        self.entries.iter().map(VisibleEntry::id).collect()
    }

    /// Dendrogram nodes among the entries, sorted.
    pub fn nodes(&self) -> Vec<usize> {
        let mut nodes: Vec<usize> = self.entries.iter().filter_map(VisibleEntry::node).collect();
        nodes.sort_unstable();
        nodes
    }

    /// Whether `id` is visible.
    pub fn contains(&self, id: &ClusterId) -> bool {
        self.entries.iter().any(|e| e.matches(id))
    }

    /// Entries worth evaluating ahead of a click, with their members.
    pub fn expandable(
        &self,
        snapshot: &Snapshot,
        policy: &ExpandPolicy,
    ) -> Vec<(ClusterId, Vec<u32>)> {
        self.entries
            .iter()
            .filter(|e| match e {
                VisibleEntry::Node(n) => {
                    !snapshot.index().is_leaf(*n)
                        && snapshot.member_count(*n) >= policy.strategy_min_members
                }
                VisibleEntry::Virtual(v) => v.members.len() >= policy.virtual_min_members,
            })
            .map(|e| (e.id(), e.members(snapshot)))
            .collect()
    }
}

/// Builds a [`VisibleSet`] from a request.
pub struct VisibleSetBuilder<'a> {
    snapshot: &'a Snapshot,
    evaluator: &'a ExpansionEvaluator,
    cache: &'a dyn StrategyCache,
    policy: ExpandPolicy,
}

impl<'a> VisibleSetBuilder<'a> {
    /// Builder over a snapshot, evaluating strategies through `cache`.
    pub fn new(
        snapshot: &'a Snapshot,
        evaluator: &'a ExpansionEvaluator,
        cache: &'a dyn StrategyCache,
    ) -> Self {
        Self {
            snapshot,
            evaluator,
            cache,
            policy: ExpandPolicy::default(),
        }
    }

    /// Override split thresholds.
    pub fn with_policy(mut self, policy: ExpandPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Split thresholds in use.
    pub fn policy(&self) -> &ExpandPolicy {
        &self.policy
    }

    /// Run base cut, focus, expansions and collapses.
    pub fn build(&self, request: &ViewRequest) -> VisibleSet {
        let budget = request.budget.max(1);
        let mut frontier = Frontier {
            entries: self.base_cut(request.base_granularity, budget),
            budget,
            ignored: Vec::new(),
            materialized: HashMap::new(),
            memo: LeafMemo::new(),
        };

        let focus = request
            .focus_leaf
            .as_deref()
            .map(|target| self.focus(&mut frontier, target));

        for id in &request.expanded {
            self.expand(&mut frontier, id, request.expand_depth, &request.weights);
        }
        for id in &request.collapsed {
            self.collapse(&mut frontier, id);
        }

        debug_assert!(frontier.entries.len() <= budget);
        VisibleSet {
            entries: frontier.entries,
            budget,
            focus,
            ignored_ids: frontier.ignored,
        }
    }

    fn base_cut(&self, granularity: usize, budget: usize) -> Vec<VisibleEntry> {
        let index = self.snapshot.index();
        let k = granularity.min(index.n_leaves()).min(budget).max(1);
        let labels = self.snapshot.dendrogram().cut_to_k(k);
        match index.cluster_leaders(&labels) {
            Ok(leaders) => leaders.into_values().map(VisibleEntry::Node).collect(),
            Err(e) => {
                // A maxclust cut of the same tree is always a tree cut.
                log::warn!("base cut at k={k} is not a tree cut ({e}), showing the root");
                vec![VisibleEntry::Node(index.root())]
            }
        }
    }

    fn focus(&self, frontier: &mut Frontier, target: &str) -> FocusOutcome {
        let index = self.snapshot.index();
        let mut outcome = FocusOutcome {
            target: target.to_string(),
            leaf: None,
            success: false,
            steps: 0,
        };
        let Some(account) = self.snapshot.account_index(target) else {
            log::warn!("focus target {target} is not a known account");
            return outcome;
        };
        let leaf = self.snapshot.micro_of(account);
        outcome.leaf = Some(leaf);

        let Some(mut pos) = frontier
            .entries
            .iter()
            .position(|e| matches!(e, VisibleEntry::Node(n) if index.is_descendant(leaf, *n)))
        else {
            log::warn!("focus target {target} is not under any visible dendrogram node");
            return outcome;
        };

        loop {
            let VisibleEntry::Node(node) = frontier.entries[pos] else {
                break;
            };
            let Some((a, b)) = index.children(node) else {
                outcome.success = true;
                break;
            };
            if frontier.entries.len() + 1 > frontier.budget {
                log::debug!(
                    "focus on {target} stopped at d_{node}: budget {} reached",
                    frontier.budget
                );
                break;
            }
            frontier
                .entries
                .splice(pos..=pos, [VisibleEntry::Node(a), VisibleEntry::Node(b)]);
            if !index.is_descendant(leaf, a) {
                pos += 1;
            }
            outcome.steps += 1;
        }

        log::debug!(
            "focus on {target} (leaf {leaf}): success={} after {} steps",
            outcome.success,
            outcome.steps
        );
        outcome
    }

    fn expand(
        &self,
        frontier: &mut Frontier,
        id: &ClusterId,
        expand_depth: f64,
        weights: &ScoreWeights,
    ) {
        let Some(pos) = frontier.position(id) else {
            log::warn!("cannot expand {id}: not visible");
            frontier.ignored.push(id.clone());
            return;
        };
        // Children the budget allows in place of this entry.
        let cap = frontier.budget - (frontier.entries.len() - 1);

        let replacement = match frontier.entries[pos].clone() {
            VisibleEntry::Node(node) => {
                if self.snapshot.index().is_leaf(node) {
                    log::debug!("{id} is a leaf, nothing to expand");
                    return;
                }
                if cap < 2 {
                    log::warn!("cannot expand {id}: budget {} exhausted", frontier.budget);
                    frontier.ignored.push(id.clone());
                    return;
                }
                self.expand_node(frontier, node, cap, expand_depth, weights)
            }
            VisibleEntry::Virtual(vc) => {
                if vc.members.len() < self.policy.virtual_min_members {
                    log::debug!("{id} has {} members, too small to split again", vc.members.len());
                    return;
                }
                if cap < 2 {
                    log::warn!("cannot expand {id}: budget {} exhausted", frontier.budget);
                    frontier.ignored.push(id.clone());
                    return;
                }
                match self.best_partition(&vc.id, &vc.members, cap, weights) {
                    Some(best) => {
                        let children = virtual_children(&vc.id, best);
                        frontier.materialized.insert(vc.id.clone(), vc);
                        children
                    }
                    None => {
                        log::debug!("no top strategy splits {id} into 2..={cap} groups");
                        return;
                    }
                }
            }
        };

        log::debug!("expanded {id} into {} clusters", replacement.len());
        frontier.entries.splice(pos..=pos, replacement);
    }

    fn expand_node(
        &self,
        frontier: &mut Frontier,
        node: usize,
        cap: usize,
        expand_depth: f64,
        weights: &ScoreWeights,
    ) -> Vec<VisibleEntry> {
        let index = self.snapshot.index();
        let id = ClusterId::node(node);

        if self.snapshot.member_count(node) >= self.policy.strategy_min_members {
            let members = frontier.node_members(self.snapshot, node);
            if let Some(best) = self.best_partition(&id, &members, cap, weights) {
                log::debug!("{id}: using {} with {} groups", best.kind, best.n_clusters());
                return virtual_children(&id, best);
            }
        }

        let target = self.policy.target_children(index.subtree_size(node), expand_depth).min(cap);
        let mut parts = vec![node];
        while parts.len() < target {
            let largest = parts
                .iter()
                .enumerate()
                .filter(|(_, &n)| !index.is_leaf(n))
                .max_by(|(i, &x), (j, &y)| {
                    index.subtree_size(x).cmp(&index.subtree_size(y)).then(j.cmp(i))
                });
            let Some((i, &split)) = largest else {
                break;
            };
            let Some((a, b)) = index.children(split) else {
                break;
            };
            parts.splice(i..=i, [a, b]);
        }
        parts.into_iter().map(VisibleEntry::Node).collect()
    }

    /// Top-ranked strategy among those the budget allows, if it splits at all.
    fn best_partition(
        &self,
        id: &ClusterId,
        members: &[u32],
        cap: usize,
        weights: &ScoreWeights,
    ) -> Option<ScoredStrategy> {
        let cached = self.cache.compute_and_cache(id, members, self.snapshot, self.evaluator);
        let mut ranked = cached.to_vec();
        rerank(&mut ranked, weights);
        let top = ranked.into_iter().find(|s| s.n_clusters() <= cap)?;
        if top.n_clusters() < 2 {
            log::debug!("{id}: top strategy {} keeps one group", top.kind);
            return None;
        }
        Some(top)
    }

    fn collapse(&self, frontier: &mut Frontier, id: &ClusterId) {
        let index = self.snapshot.index();
        let (covered, replacement): (Vec<usize>, VisibleEntry) = match id {
            ClusterId::Dendrogram(a) => {
                let a = *a as usize;
                if a >= index.n_nodes() {
                    log::warn!("cannot collapse {id}: unknown node");
                    frontier.ignored.push(id.clone());
                    return;
                }
                let covered = frontier
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| index.is_descendant(e.root_node(), a))
                    .map(|(i, _)| i)
                    .collect();
                (covered, VisibleEntry::Node(a))
            }
            ClusterId::Virtual { .. } => {
                let Some(vc) = frontier.materialized.get(id) else {
                    if !frontier.entries.iter().any(|e| e.matches(id)) {
                        log::warn!("cannot collapse {id}: not expanded in this request");
                        frontier.ignored.push(id.clone());
                    }
                    return;
                };
                let covered = frontier
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| {
                        matches!(e, VisibleEntry::Virtual(v) if v.id != *id && v.id.is_within(id))
                    })
                    .map(|(i, _)| i)
                    .collect();
                (covered, VisibleEntry::Virtual(vc.clone()))
            }
        };

        match covered.as_slice() {
            [] => {
                log::warn!("cannot collapse {id}: nothing visible beneath it");
                frontier.ignored.push(id.clone());
            }
            [only] if frontier.entries[*only] == replacement => {
                log::debug!("{id} already collapsed");
            }
            _ => {
                let first = covered[0];
                for &i in covered.iter().rev() {
                    frontier.entries.remove(i);
                }
                frontier.entries.insert(first, replacement);
                log::debug!("collapsed {} clusters into {id}", covered.len());
            }
        }
    }
}

fn virtual_children(parent: &ClusterId, strategy: ScoredStrategy) -> Vec<VisibleEntry> {
    let kind = strategy.kind;
    let Partition { groups } = strategy.partition;
    groups
        .into_iter()
        .enumerate()
        .map(|(i, group)| {
            let mut members = group.members;
            members.sort_unstable();
            VisibleEntry::Virtual(VirtualCluster {
                id: parent.child(i),
                members,
                label: group.label,
                strategy: kind,
            })
        })
        .collect()
}

/// Mutable state of one build.
struct Frontier {
    entries: Vec<VisibleEntry>,
    budget: usize,
    ignored: Vec<ClusterId>,
    /// Virtual clusters split during this request, for collapsing back.
    materialized: HashMap<ClusterId, VirtualCluster>,
    memo: LeafMemo,
}

impl Frontier {
    fn position(&self, id: &ClusterId) -> Option<usize> {
        self.entries.iter().position(|e| e.matches(id))
    }

    fn node_members(&mut self, snapshot: &Snapshot, node: usize) -> Vec<u32> {
        let leaves = snapshot.index().subtree_leaves_memo(node, &mut self.memo);
        let mut members: Vec<u32> = leaves
            .iter()
            .flat_map(|&leaf| snapshot.micro(leaf).members.iter().copied())
            .collect();
        members.sort_unstable();
        members
    }
}
