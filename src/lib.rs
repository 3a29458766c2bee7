//! # zoomtree
//!
//! Budget-constrained drill-down over a hierarchical clustering of a follow graph.
//!
//! The upstream pipeline clusters accounts into micro-clusters and merges those
//! into a dendrogram. `zoomtree` decides what to *render*: a flat cut of the
//! tree that the user refines by expanding, collapsing, or focusing on an
//! account, never showing more clusters than the budget allows. Large
//! clusters are split by whichever structural strategy (Louvain, mutual
//! components, tag groups, ...) scores best, with results cached and warmed
//! in the background.
//!
//! ```text
//! Snapshot ──► VisibleSetBuilder ──► HierarchicalViewAssembler ──► ClusterView
//!                   │       ▲
//!                   ▼       │
//!          ExpansionEvaluator ◄── ExpansionCache ◄── Precomputer (worker)
//! ```
//!
//! **Default build** is single-threaded per request. The `parallel` feature
//! evaluates candidate strategies with rayon.

pub mod cache;
pub mod community;
pub mod config;
/// Error types used across `zoomtree`.
pub mod error;
pub mod expansion;
pub mod graph;
pub mod hierarchy;
pub mod id;
pub mod labels;
pub mod snapshot;
pub mod view;
pub mod visible;

pub use cache::{CacheConfig, ExpansionCache, NoopCache, Precomputer, StrategyCache};
pub use community::{CommunityDetection, Louvain};
pub use config::{ExpandPolicy, RawViewRequest, ViewRequest};
pub use error::{Error, Result};
pub use expansion::{ExpansionEvaluator, ScoreWeights, ScoredStrategy, StrategyKind};
pub use graph::Adjacency;
pub use hierarchy::{Dendrogram, DendrogramIndex};
pub use id::ClusterId;
pub use labels::{InMemoryLabelStore, LabelStore};
pub use snapshot::{Snapshot, SnapshotInput};
pub use view::{ClusterView, HierarchicalViewAssembler};
pub use visible::{VisibleSet, VisibleSetBuilder};
