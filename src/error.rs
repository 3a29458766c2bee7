use thiserror::Error;

/// Result alias for `zoomtree`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned while loading snapshots and running the background service.
///
/// Request-path problems (stale ids, failing strategies, layout failures) are
/// not errors: they are logged and reported in the assembled view instead.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum Error {
    /// Input was empty.
    #[error("empty input provided")]
    EmptyInput,

    /// Linkage matrix row count does not match the declared micro-cluster count.
    #[error("linkage has {rows} rows, expected {expected} for {n_micro} micro-clusters")]
    LinkageMismatch {
        /// Rows found in the linkage matrix.
        rows: usize,
        /// Rows required (`n_micro - 1`).
        expected: usize,
        /// Declared micro-cluster count.
        n_micro: usize,
    },

    /// A linkage row references a node that does not exist yet or was already merged.
    #[error("invalid linkage row {row}: {message}")]
    InvalidLinkage {
        /// Offending row.
        row: usize,
        /// What was wrong with it.
        message: String,
    },

    /// Shape mismatch between parallel input arrays.
    #[error("shape mismatch: expected {expected}, actual {actual}")]
    ShapeMismatch {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        actual: String,
    },

    /// A flat labelling does not correspond to any cut of the dendrogram.
    #[error("label {label} is not the leaf set of any dendrogram node")]
    NotATreeCut {
        /// Label whose leaf set has no matching node.
        label: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// An opaque cluster id could not be parsed.
    #[error("invalid cluster id '{0}'")]
    InvalidId(String),

    /// `start()` called on a precomputer that is already running.
    #[error("precomputer already running")]
    PrecomputerAlreadyRunning,

    /// The background worker thread could not be spawned.
    #[error("failed to spawn precompute worker: {0}")]
    WorkerSpawn(String),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}
