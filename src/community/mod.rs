//! Community detection inside a single rendered cluster.
//!
//! When a user expands a cluster, one candidate decomposition is the
//! modularity-optimal partition of the subgraph induced by its members.
//!
//! ## The Modularity Objective
//!
//! ```text
//! Q = (1/2m) × Σ[A_ij - γ(k_i × k_j)/(2m)] × δ(c_i, c_j)
//! ```
//!
//! Where m is the total edge weight, k_i the degree of node i, and γ the
//! resolution parameter. Higher γ yields smaller communities, which is what
//! large clusters need: modularity cannot resolve communities smaller than
//! roughly √(2m), so [`Louvain::for_subgraph_size`] raises γ with size.
//!
//! ## Usage
//!
//! ```rust
//! use petgraph::graph::UnGraph;
//! use zoomtree::community::{CommunityDetection, Louvain};
//!
//! let mut graph = UnGraph::<(), ()>::new_undirected();
//! let a = graph.add_node(());
//! let b = graph.add_node(());
//! let c = graph.add_node(());
//! graph.add_edge(a, b, ());
//! graph.add_edge(b, c, ());
//!
//! let communities = Louvain::new().detect(&graph).unwrap();
//! assert_eq!(communities.len(), 3);
//! ```
//!
//! ## References
//!
//! - Blondel et al. (2008). "Fast unfolding of communities in large networks."
//! - Newman & Girvan (2004). "Finding and evaluating community structure in networks."

mod louvain;
mod traits;

pub use louvain::Louvain;
pub use traits::CommunityDetection;
