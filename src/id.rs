//! Cluster identifiers.
//!
//! Inside the crate a cluster is either a dendrogram node or a virtual
//! sub-cluster produced by an expansion strategy. Virtual ids nest: a virtual
//! cluster can itself be split, giving `d_12_local_3_local_0`.
//!
//! The string form only exists at the serialization boundary:
//!
//! ```text
//! d_<node>                 dendrogram node
//! <parent>_local_<index>   virtual child of <parent>
//! ```

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

const DENDROGRAM_PREFIX: &str = "d_";
const LOCAL_SEPARATOR: &str = "_local_";

/// Identifier of a rendered cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClusterId {
    /// A node of the dendrogram (`d_<n>`).
    Dendrogram(u32),
    /// The `local`-th group of a strategy partition of `parent`.
    Virtual {
        /// Cluster that was split.
        parent: Box<ClusterId>,
        /// Index of the group within the chosen partition.
        local: u32,
    },
}

impl ClusterId {
    /// Id of dendrogram node `node`.
    pub fn node(node: usize) -> Self {
        ClusterId::Dendrogram(node as u32)
    }

    /// Id of the `local`-th virtual child of `self`.
    pub fn child(&self, local: usize) -> Self {
        ClusterId::Virtual {
            parent: Box::new(self.clone()),
            local: local as u32,
        }
    }

    /// The dendrogram node, if this id names one.
    pub fn as_node(&self) -> Option<usize> {
        match self {
            ClusterId::Dendrogram(n) => Some(*n as usize),
            ClusterId::Virtual { .. } => None,
        }
    }

    /// Whether this is a virtual (non-tree) cluster.
    pub fn is_virtual(&self) -> bool {
        matches!(self, ClusterId::Virtual { .. })
    }

    /// The dendrogram node at the bottom of the nesting chain.
    pub fn root_node(&self) -> usize {
        match self {
            ClusterId::Dendrogram(n) => *n as usize,
            ClusterId::Virtual { parent, .. } => parent.root_node(),
        }
    }

    /// Whether `self` is `ancestor` or nested (virtually) beneath it.
    pub fn is_within(&self, ancestor: &ClusterId) -> bool {
        if self == ancestor {
            return true;
        }
        match self {
            ClusterId::Dendrogram(_) => false,
            ClusterId::Virtual { parent, .. } => parent.is_within(ancestor),
        }
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterId::Dendrogram(n) => write!(f, "{DENDROGRAM_PREFIX}{n}"),
            ClusterId::Virtual { parent, local } => write!(f, "{parent}{LOCAL_SEPARATOR}{local}"),
        }
    }
}

impl FromStr for ClusterId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidId(s.to_string());

        if let Some((parent, local)) = s.rsplit_once(LOCAL_SEPARATOR) {
            let local: u32 = local.parse().map_err(|_| invalid())?;
            let parent: ClusterId = parent.parse().map_err(|_| invalid())?;
            return Ok(ClusterId::Virtual {
                parent: Box::new(parent),
                local,
            });
        }

        let digits = s.strip_prefix(DENDROGRAM_PREFIX).ok_or_else(invalid)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        digits.parse().map(ClusterId::Dendrogram).map_err(|_| invalid())
    }
}

impl Serialize for ClusterId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClusterId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
