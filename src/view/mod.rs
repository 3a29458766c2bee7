//! Renderable views.
//!
//! [`HierarchicalViewAssembler`] turns a request into a [`ClusterView`]:
//!
//! 1. build the visible set (base cut, focus, expand, collapse);
//! 2. describe each entry (centroid, size, representatives, label, ego flag);
//! 3. aggregate follow edges between entries;
//! 4. lay the entries out in 2D.
//!
//! A view is a pure function of the snapshot, the request and the current
//! cache and label contents. Nothing in it is persisted.

mod edges;
mod layout;

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::cache::{Precomputer, StrategyCache};
use crate::config::{ExpandPolicy, ParsedRequest, RawViewRequest, ViewRequest};
use crate::expansion::{ExpansionEvaluator, StrategyKind};
use crate::id::ClusterId;
use crate::labels::LabelStore;
use crate::snapshot::Snapshot;
use crate::visible::{FocusOutcome, VisibleEntry, VisibleSetBuilder};

pub use edges::{fusion_factor, inter_cluster_edges, ClusterEdge};
pub use layout::{jitter, layout, Layout, LayoutMethod};

/// Representative handles kept per cluster.
pub const MAX_REPRESENTATIVES: usize = 5;

/// Handles joined into an automatic label.
const AUTO_LABEL_HANDLES: usize = 3;

/// Where a cluster's label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// Entered by a user.
    User,
    /// Derived from the strategy or the representatives.
    Auto,
}

/// One rendered cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterDescriptor {
    /// Opaque id.
    pub id: ClusterId,
    /// Display label.
    pub label: String,
    /// Origin of `label`.
    pub label_source: LabelSource,
    /// Number of member accounts.
    pub size: usize,
    /// Number of micro-clusters touched by the members.
    pub micro_count: usize,
    /// Whether this is a single micro-cluster.
    pub is_leaf: bool,
    /// Whether this is a strategy group rather than a tree node.
    pub is_virtual: bool,
    /// Tree parent (for nodes) or split cluster (for groups).
    pub parent: Option<ClusterId>,
    /// Strategy that produced a virtual cluster.
    pub strategy: Option<StrategyKind>,
    /// Whether expanding would change the view.
    pub expandable: bool,
    /// Mean of the constituent micro-cluster centroids.
    pub centroid: Vec<f64>,
    /// 2D position in `[-1, 1]^2`.
    pub position: [f64; 2],
    /// Handles of the most-followed members.
    pub representative_handles: Vec<String>,
    /// Whether the viewer's account is a member.
    pub contains_ego: bool,
}

/// Budget bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetInfo {
    /// Maximum visible clusters.
    pub budget: usize,
    /// Visible clusters.
    pub used: usize,
    /// `budget - used`.
    pub remaining: usize,
}

/// Everything the client needs to draw one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterView {
    /// Clusters in display order.
    pub clusters: Vec<ClusterDescriptor>,
    /// Aggregated inter-cluster edges.
    pub edges: Vec<ClusterEdge>,
    /// How positions were computed.
    pub layout: LayoutMethod,
    /// Budget bookkeeping.
    pub budget: BudgetInfo,
    /// Focus result, if requested.
    pub focus: Option<FocusOutcome>,
    /// Expand/collapse ids that had no effect.
    pub ignored_ids: Vec<ClusterId>,
    /// Request ids that could not be parsed.
    pub rejected_ids: Vec<String>,
}

impl ClusterView {
    /// Descriptor of `id`, if visible.
    pub fn cluster(&self, id: &ClusterId) -> Option<&ClusterDescriptor> {
        self.clusters.iter().find(|c| c.id == *id)
    }

    /// Visible ids in display order.
    pub fn ids(&self) -> Vec<ClusterId> {
        self.clusters.iter().map(|c| c.id.clone()).collect()
    }
}

/// Orchestrates the visible-set builder, cache, labels and layout.
pub struct HierarchicalViewAssembler<'a> {
    snapshot: &'a Snapshot,
    evaluator: &'a ExpansionEvaluator,
    cache: &'a dyn StrategyCache,
    labels: &'a dyn LabelStore,
    precomputer: Option<&'a Precomputer>,
    policy: ExpandPolicy,
}

impl<'a> HierarchicalViewAssembler<'a> {
    /// Assembler over a snapshot with the given collaborators.
    pub fn new(
        snapshot: &'a Snapshot,
        evaluator: &'a ExpansionEvaluator,
        cache: &'a dyn StrategyCache,
        labels: &'a dyn LabelStore,
    ) -> Self {
        Self {
            snapshot,
            evaluator,
            cache,
            labels,
            precomputer: None,
            policy: ExpandPolicy::default(),
        }
    }

    /// Notify `precomputer` of every assembled visible set.
    pub fn with_precomputer(mut self, precomputer: &'a Precomputer) -> Self {
        self.precomputer = Some(precomputer);
        self
    }

    /// Override split thresholds.
    pub fn with_policy(mut self, policy: ExpandPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Parse a boundary request and assemble it.
    pub fn assemble_raw(&self, raw: RawViewRequest) -> ClusterView {
        let ParsedRequest { request, rejected_ids } = raw.into_request();
        let mut view = self.assemble(&request);
        view.rejected_ids = rejected_ids;
        view
    }

    /// Assemble the view for `request`.
    pub fn assemble(&self, request: &ViewRequest) -> ClusterView {
        let snapshot = self.snapshot;
        let visible = VisibleSetBuilder::new(snapshot, self.evaluator, self.cache)
            .with_policy(self.policy)
            .build(request);

        if let Some(precomputer) = self.precomputer {
            precomputer.visible_set_changed(visible.expandable(snapshot, &self.policy));
        }

        let user_labels = self.labels.get_all_labels().unwrap_or_else(|e| {
            log::warn!("label store unavailable, using automatic labels: {e}");
            HashMap::new()
        });
        let ego = request.ego.as_deref().and_then(|node_id| {
            let account = snapshot.account_index(node_id);
            if account.is_none() {
                log::warn!("ego {node_id} is not a known account");
            }
            account.map(|a| a as u32)
        });

        let ids = visible.ids();
        let members: Vec<Vec<u32>> = visible.entries.iter().map(|e| e.members(snapshot)).collect();
        let centroids: Vec<Vec<f64>> = members.iter().map(|m| self.centroid(m)).collect();
        let placed = layout(&centroids, request.layout_seed);

        let edges = inter_cluster_edges(snapshot, &ids, &members, request.louvain_weight);

        let clusters = visible
            .entries
            .iter()
            .zip(ids)
            .zip(members)
            .zip(centroids)
            .zip(placed.positions)
            .map(|((((entry, id), members), centroid), position)| {
                let representative_handles = self.representatives(&members);
                let (label, label_source) = match user_labels.get(&id) {
                    Some(label) => (label.clone(), LabelSource::User),
                    None => (auto_label(entry, &representative_handles), LabelSource::Auto),
                };
                let micro_count = members
                    .iter()
                    .map(|&a| snapshot.micro_of(a as usize))
                    .collect::<BTreeSet<_>>()
                    .len();
                let (is_leaf, parent, strategy, expandable) = match entry {
                    VisibleEntry::Node(n) => {
                        let is_leaf = snapshot.index().is_leaf(*n);
                        (is_leaf, snapshot.index().parent(*n).map(ClusterId::node), None, !is_leaf)
                    }
                    VisibleEntry::Virtual(v) => {
                        let parent = match &v.id {
                            ClusterId::Virtual { parent, .. } => Some((**parent).clone()),
                            ClusterId::Dendrogram(_) => None,
                        };
                        let expandable = v.members.len() >= self.policy.virtual_min_members;
                        (false, parent, Some(v.strategy), expandable)
                    }
                };
                ClusterDescriptor {
                    is_virtual: id.is_virtual(),
                    contains_ego: ego.is_some_and(|e| members.binary_search(&e).is_ok()),
                    id,
                    label,
                    label_source,
                    size: members.len(),
                    micro_count,
                    is_leaf,
                    parent,
                    strategy,
                    expandable,
                    centroid,
                    position,
                    representative_handles,
                }
            })
            .collect();

        ClusterView {
            clusters,
            edges,
            layout: placed.method,
            budget: BudgetInfo {
                budget: visible.budget,
                used: visible.len(),
                remaining: visible.remaining(),
            },
            focus: visible.focus,
            ignored_ids: visible.ignored_ids,
            rejected_ids: Vec::new(),
        }
    }

    /// Mean centroid of the micro-clusters the accounts belong to.
    fn centroid(&self, members: &[u32]) -> Vec<f64> {
        let micros: BTreeSet<usize> = members
            .iter()
            .map(|&a| self.snapshot.micro_of(a as usize))
            .collect();
        let Some(&first) = micros.iter().next() else {
            return Vec::new();
        };
        let mut sum = vec![0.0f64; self.snapshot.micro(first).centroid.len()];
        for &m in &micros {
            for (s, &c) in sum.iter_mut().zip(&self.snapshot.micro(m).centroid) {
                *s += f64::from(c);
            }
        }
        let n = micros.len() as f64;
        sum.iter_mut().for_each(|s| *s /= n);
        sum
    }

    /// Handles of the members with the highest in-degree.
    fn representatives(&self, members: &[u32]) -> Vec<String> {
        let adjacency = self.snapshot.adjacency();
        let mut ranked: Vec<u32> = members.to_vec();
        ranked.sort_by_key(|&a| (std::cmp::Reverse(adjacency.in_degree(a as usize)), a));
        ranked
            .into_iter()
            .take(MAX_REPRESENTATIVES)
            .map(|a| self.snapshot.handle(a as usize).to_string())
            .collect()
    }
}

fn auto_label(entry: &VisibleEntry, representatives: &[String]) -> String {
    if let VisibleEntry::Virtual(v) = entry {
        if let Some(label) = &v.label {
            return label.clone();
        }
    }
    representatives
        .iter()
        .take(AUTO_LABEL_HANDLES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoopCache;
    use crate::labels::InMemoryLabelStore;
    use crate::snapshot::fixtures::four_leaf_snapshot;

    fn assemble(
        snapshot: &Snapshot,
        labels: &InMemoryLabelStore,
        request: &ViewRequest,
    ) -> ClusterView {
        let evaluator = ExpansionEvaluator::new();
        HierarchicalViewAssembler::new(snapshot, &evaluator, &NoopCache, labels).assemble(request)
    }

    fn request() -> ViewRequest {
        ViewRequest::new().with_granularity(2).with_budget(10).with_expand_depth(0.0)
    }

    #[test]
    fn test_descriptors() {
        let snap = four_leaf_snapshot();
        let labels = InMemoryLabelStore::new();
        let view = assemble(&snap, &labels, &request().expand(ClusterId::node(4)));
        assert_eq!(view.ids(), vec![ClusterId::node(0), ClusterId::node(1), ClusterId::node(5)]);
        assert_eq!(view.budget, BudgetInfo { budget: 10, used: 3, remaining: 7 });
        assert_eq!(view.layout, LayoutMethod::Pca);

        let leaf = view.cluster(&ClusterId::node(0)).unwrap();
        assert!(leaf.is_leaf);
        assert!(!leaf.expandable);
        assert_eq!(leaf.parent, Some(ClusterId::node(4)));
        assert_eq!(leaf.size, 2);
        assert_eq!(leaf.centroid, vec![0.0, 0.0]);

        let five = view.cluster(&ClusterId::node(5)).unwrap();
        assert_eq!(five.micro_count, 2);
        assert_eq!(five.centroid, vec![5.0, 0.5]);
        assert_eq!(five.parent, Some(ClusterId::node(6)));
        assert!(five.expandable);
        assert!(view.clusters.iter().all(|c| c.position[0].abs() <= 1.0 + 1e-9));
    }

    #[test]
    fn test_labels() {
        let snap = four_leaf_snapshot();
        let labels = InMemoryLabelStore::new();
        labels.set_label(ClusterId::node(5), "gardeners".into()).unwrap();
        let view = assemble(&snap, &labels, &request());

        let five = view.cluster(&ClusterId::node(5)).unwrap();
        assert_eq!(five.label, "gardeners");
        assert_eq!(five.label_source, LabelSource::User);

        // acct6 has in-degree 2 (from 5 and 1); acct4, acct5, acct7 have 1.
        let four = view.cluster(&ClusterId::node(4)).unwrap();
        assert_eq!(four.label_source, LabelSource::Auto);
        assert_eq!(five.representative_handles[0], "acct6");
        assert_eq!(four.representative_handles.len(), 4);
        assert_eq!(four.label, four.representative_handles[..3].join(", "));
    }

    #[test]
    fn test_ego_and_edges() {
        let snap = four_leaf_snapshot();
        let view = assemble(&snap, &InMemoryLabelStore::new(), &request().with_ego("acct6"));
        assert!(!view.cluster(&ClusterId::node(4)).unwrap().contains_ego);
        assert!(view.cluster(&ClusterId::node(5)).unwrap().contains_ego);
        assert_eq!(view.edges.len(), 1);
        assert_eq!(view.edges[0].count, 1);
    }

    #[test]
    fn test_raw_request_reports_rejected_ids() {
        let snap = four_leaf_snapshot();
        let evaluator = ExpansionEvaluator::new();
        let labels = InMemoryLabelStore::new();
        let assembler = HierarchicalViewAssembler::new(&snap, &evaluator, &NoopCache, &labels);
        let raw = RawViewRequest {
            base_granularity: Some(2),
            budget: Some(10),
            expanded_ids: vec!["d_6".into(), "x_1".into()],
            ..RawViewRequest::default()
        };
        let view = assembler.assemble_raw(raw);
        assert_eq!(view.rejected_ids, vec!["x_1".to_string()]);
        assert_eq!(view.ignored_ids, vec![ClusterId::node(6)]);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["clusters"][0]["id"], "d_4");
        assert_eq!(json["layout"], "pca");
        assert_eq!(json["ignored_ids"][0], "d_6");
    }
}
