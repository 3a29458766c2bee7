//! Request and policy configuration.
//!
//! [`ViewRequest`] is the typed form used inside the crate. [`RawViewRequest`]
//! is what arrives from the transport layer: ids are still strings and
//! numbers are unchecked. Converting never fails; bad ids are dropped and
//! reported back.

use serde::{Deserialize, Serialize};

use crate::expansion::ScoreWeights;
use crate::id::ClusterId;

/// Default number of clusters in the base cut.
pub const DEFAULT_GRANULARITY: usize = 25;

/// Default maximum number of visible clusters.
pub const DEFAULT_BUDGET: usize = 25;

/// Thresholds that decide how a cluster is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpandPolicy {
    /// Dendrogram nodes with at least this many accounts try strategies first.
    pub strategy_min_members: usize,
    /// Virtual clusters need at least this many accounts to be split again.
    pub virtual_min_members: usize,
    /// Lower bound on the target child count.
    pub min_children: usize,
}

impl Default for ExpandPolicy {
    fn default() -> Self {
        Self {
            strategy_min_members: 10,
            virtual_min_members: 100,
            min_children: 3,
        }
    }
}

impl ExpandPolicy {
    /// Children to aim for when expanding a node of `size` leaves.
    ///
    /// `max(min_children, floor(size^(0.4 + 0.3 * depth)))`.
    pub fn target_children(&self, size: usize, expand_depth: f64) -> usize {
        let exponent = 0.4 + 0.3 * expand_depth.clamp(0.0, 1.0);
        let raw = (size as f64).powf(exponent).floor() as usize;
        raw.max(self.min_children)
    }
}

/// One view request, validated.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct ViewRequest {
    /// Clusters in the base cut.
    pub base_granularity: usize,
    /// Maximum visible clusters (at least 1).
    pub budget: usize,
    /// Expansion aggressiveness in `[0, 1]`.
    pub expand_depth: f64,
    /// Louvain fusion strength for edge weights in `[0, 1]`.
    pub louvain_weight: f64,
    /// Clusters to expand, applied in order.
    pub expanded: Vec<ClusterId>,
    /// Clusters to collapse, applied in order after expansions.
    pub collapsed: Vec<ClusterId>,
    /// Account node id to reveal.
    pub focus_leaf: Option<String>,
    /// Account node id of the viewer.
    pub ego: Option<String>,
    /// Strategy score weights.
    pub weights: ScoreWeights,
    /// Seed for the jittered layout fallback.
    pub layout_seed: u64,
}

impl Default for ViewRequest {
    fn default() -> Self {
        Self {
            base_granularity: DEFAULT_GRANULARITY,
            budget: DEFAULT_BUDGET,
            expand_depth: 0.5,
            louvain_weight: 0.0,
            expanded: Vec::new(),
            collapsed: Vec::new(),
            focus_leaf: None,
            ego: None,
            weights: ScoreWeights::default(),
            layout_seed: 42,
        }
    }
}

impl ViewRequest {
    /// Default request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base cut size.
    pub fn with_granularity(mut self, base_granularity: usize) -> Self {
        self.base_granularity = base_granularity;
        self
    }

    /// Set the budget. Zero is raised to one.
    pub fn with_budget(mut self, budget: usize) -> Self {
        if budget == 0 {
            log::warn!("budget 0 raised to 1");
        }
        self.budget = budget.max(1);
        self
    }

    /// Set expansion depth, clamped to `[0, 1]`.
    pub fn with_expand_depth(mut self, expand_depth: f64) -> Self {
        self.expand_depth = clamp_unit("expand_depth", expand_depth);
        self
    }

    /// Set Louvain fusion weight, clamped to `[0, 1]`.
    pub fn with_louvain_weight(mut self, louvain_weight: f64) -> Self {
        self.louvain_weight = clamp_unit("louvain_weight", louvain_weight);
        self
    }

    /// Append a cluster to expand.
    pub fn expand(mut self, id: ClusterId) -> Self {
        self.expanded.push(id);
        self
    }

    /// Append a cluster to collapse.
    pub fn collapse(mut self, id: ClusterId) -> Self {
        self.collapsed.push(id);
        self
    }

    /// Reveal an account.
    pub fn with_focus(mut self, node_id: impl Into<String>) -> Self {
        self.focus_leaf = Some(node_id.into());
        self
    }

    /// Mark the viewer's account.
    pub fn with_ego(mut self, node_id: impl Into<String>) -> Self {
        self.ego = Some(node_id.into());
        self
    }

    /// Set score weights.
    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Set the layout seed.
    pub fn with_layout_seed(mut self, seed: u64) -> Self {
        self.layout_seed = seed;
        self
    }
}

fn clamp_unit(name: &str, value: f64) -> f64 {
    if value.is_nan() {
        log::warn!("{name} is NaN, using 0");
        return 0.0;
    }
    if !(0.0..=1.0).contains(&value) {
        log::warn!("{name} {value} clamped to [0, 1]");
    }
    value.clamp(0.0, 1.0)
}

/// A view request as received at the serialization boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawViewRequest {
    /// Clusters in the base cut.
    pub base_granularity: Option<usize>,
    /// Maximum visible clusters.
    pub budget: Option<usize>,
    /// Expansion aggressiveness.
    pub expand_depth: Option<f64>,
    /// Louvain fusion strength.
    pub louvain_weight: Option<f64>,
    /// Opaque ids to expand.
    pub expanded_ids: Vec<String>,
    /// Opaque ids to collapse.
    pub collapsed_ids: Vec<String>,
    /// Account node id to reveal.
    pub focus_leaf_id: Option<String>,
    /// Account node id of the viewer.
    pub ego: Option<String>,
    /// Strategy score weights.
    pub weights: Option<ScoreWeights>,
    /// Seed for the jittered layout fallback.
    pub layout_seed: Option<u64>,
}

/// Outcome of [`RawViewRequest::into_request`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRequest {
    /// The typed request.
    pub request: ViewRequest,
    /// Ids that could not be parsed.
    pub rejected_ids: Vec<String>,
}

impl RawViewRequest {
    /// Parse ids and apply defaults and clamps.
    pub fn into_request(self) -> ParsedRequest {
        let mut rejected_ids = Vec::new();
        let expanded = parse_ids(self.expanded_ids, &mut rejected_ids);
        let collapsed = parse_ids(self.collapsed_ids, &mut rejected_ids);

        let mut request = ViewRequest::new()
            .with_granularity(self.base_granularity.unwrap_or(DEFAULT_GRANULARITY))
            .with_budget(self.budget.unwrap_or(DEFAULT_BUDGET))
            .with_weights(self.weights.unwrap_or_default());
        if let Some(depth) = self.expand_depth {
            request = request.with_expand_depth(depth);
        }
        if let Some(weight) = self.louvain_weight {
            request = request.with_louvain_weight(weight);
        }
        if let Some(seed) = self.layout_seed {
            request = request.with_layout_seed(seed);
        }
        request.expanded = expanded;
        request.collapsed = collapsed;
        request.focus_leaf = self.focus_leaf_id;
        request.ego = self.ego;

        ParsedRequest { request, rejected_ids }
    }
}

fn parse_ids(raw: Vec<String>, rejected: &mut Vec<String>) -> Vec<ClusterId> {
    raw.into_iter()
        .filter_map(|s| match s.parse::<ClusterId>() {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("dropping request id: {e}");
                rejected.push(s);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_children() {
        let policy = ExpandPolicy::default();
        assert_eq!(policy.target_children(2, 0.0), 3);
        // 100^0.4 = 6.3
        assert_eq!(policy.target_children(100, 0.0), 6);
        // 100^0.7 = 25.1
        assert_eq!(policy.target_children(100, 1.0), 25);
        assert_eq!(policy.target_children(100, 7.0), 25);
    }

    #[test]
    fn test_request_clamps() {
        let req = ViewRequest::new()
            .with_budget(0)
            .with_expand_depth(3.0)
            .with_louvain_weight(f64::NAN);
        assert_eq!(req.budget, 1);
        assert_eq!(req.expand_depth, 1.0);
        assert_eq!(req.louvain_weight, 0.0);
    }

    #[test]
    fn test_raw_request_from_json() {
        let json = r#"{
            "budget": 10,
            "base_granularity": 2,
            "expanded_ids": ["d_4", "bogus", "d_4_local_1"],
            "collapsed_ids": ["d_"],
            "focus_leaf_id": "acct3",
            "weights": {"collapse": 1.0}
        }"#;
        let raw: RawViewRequest = serde_json::from_str(json).unwrap();
        let ParsedRequest { request, rejected_ids } = raw.into_request();
        assert_eq!(request.budget, 10);
        assert_eq!(request.base_granularity, 2);
        assert_eq!(request.expanded, vec![ClusterId::node(4), ClusterId::node(4).child(1)]);
        assert!(request.collapsed.is_empty());
        assert_eq!(rejected_ids, vec!["bogus".to_string(), "d_".to_string()]);
        assert_eq!(request.focus_leaf.as_deref(), Some("acct3"));
        assert_eq!(request.weights.collapse, 1.0);
        assert_eq!(request.weights.size_entropy, 0.2);
    }

    #[test]
    fn test_empty_raw_request_uses_defaults() {
        let raw: RawViewRequest = serde_json::from_str("{}").unwrap();
        let parsed = raw.into_request();
        assert_eq!(parsed.request, ViewRequest::default());
        assert!(parsed.rejected_ids.is_empty());
    }
}
