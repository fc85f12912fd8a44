//! Error types for the range query engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RangeError>;

/// Location of a parse failure within the source expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLocation {
    pub line: usize,
    pub column: usize,
    pub rule: &'static str,
}

impl std::fmt::Display for ParseLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {} (in {})", self.line, self.column, self.rule)
    }
}

#[derive(Error, Debug)]
pub enum RangeError {
    #[error("parse error at {0}: {1}")]
    Parse(ParseLocation, String),

    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("key not found: {cluster}:{key}")]
    KeyNotFound { cluster: String, key: String },

    #[error("cluster {0} is not a leaf, cannot look up key {1}")]
    NotALeaf(String, String),

    #[error("backend I/O error: {0}")]
    Backend(String),

    #[error("malformed data in leaf {cluster}: {reason}")]
    MalformedData { cluster: String, reason: String },

    #[error("internal evaluator error: {0}")]
    Internal(String),
}

impl RangeError {
    /// Stable error-class code, for callers that want to branch on error kind
    /// without matching the full enum (e.g. the HTTP front-end's status mapping).
    pub fn code(&self) -> &'static str {
        match self {
            RangeError::Parse(_, _) => "PARSE_ERROR",
            RangeError::ClusterNotFound(_) => "CLUSTER_NOT_FOUND",
            RangeError::KeyNotFound { .. } => "KEY_NOT_FOUND",
            RangeError::NotALeaf(_, _) => "NOT_A_LEAF",
            RangeError::Backend(_) => "BACKEND_ERROR",
            RangeError::MalformedData { .. } => "MALFORMED_DATA",
            RangeError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for errors the evaluator should append to its error list rather
    /// than abort on (lookup / backend / data errors, per spec.md §7).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RangeError::Parse(_, _) | RangeError::Internal(_))
    }
}
