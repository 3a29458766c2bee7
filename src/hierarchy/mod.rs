//! The precomputed merge tree over micro-clusters.
//!
//! Records complete merge history from hierarchical clustering:
//!
//! ```text
//!         6 (height=1.0)
//!        / \
//!       4   5 (height=0.7)
//!      / \ / \
//!     0  1 2  3 (leaves = micro-clusters)
//! ```
//!
//! Key property: "cut" at any depth to get any number of clusters, then
//! refine the cut locally by replacing a node with its two children.
//!
//! - [`Dendrogram`]: validated merge history loaded from a linkage matrix.
//! - [`DendrogramIndex`]: O(1) children/parent/size lookups over it.

mod dendrogram;
mod index;

pub use dendrogram::{Dendrogram, Merge};
pub use index::{DendrogramIndex, LeafMemo};
