use crate::validation::NodeIssues;
use thiserror::Error;

/// Errors that terminate a run (or prevent it from starting).
#[derive(Error, Debug)]
pub enum FlowError {
    /// Pre-run validation found Error-severity issues. Always a list, never
    /// collapsed into a single failure.
    #[error("flow failed validation across {} node(s)", issues.len())]
    Invalid { issues: Vec<NodeIssues> },

    #[error("node '{node_id}' failed: {source}")]
    NodeFailed {
        node_id: String,
        #[source]
        source: NodeError,
    },

    /// A Break/Continue sentinel surfaced with no enclosing loop. This is a
    /// flow-authoring defect, reported distinctly from normal termination.
    #[error("node '{node_id}' produced a {sentinel} sentinel outside any loop")]
    SentinelOutsideLoop { node_id: String, sentinel: &'static str },

    /// Cooperative cancellation. Never folded into a failure status.
    #[error("run aborted")]
    Aborted,

    #[error("sub-flow depth {depth} exceeds the maximum (path: {path})")]
    DepthExceeded { depth: usize, path: String },

    #[error("flow not found: {0}")]
    FlowNotFound(String),

    /// Sub-flow entry discovery needs exactly one trigger node.
    #[error("flow '{0}' has no unique trigger node")]
    MissingTrigger(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors produced by a node's `execute`.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("missing required input: {0}")]
    MissingInput(String),

    #[error("invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: &'static str,
        actual: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("host operation failed: {0}")]
    Host(#[from] HostError),

    /// A loop iteration's nested run failed; carries the failing item index.
    #[error("sub-flow failed at item {index}: {message}")]
    SubFlow { index: usize, message: String },

    #[error("cancelled")]
    Cancelled,
}

/// Registry configuration errors, surfaced at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("node type already registered: {0}")]
    DuplicateNodeType(String),

    #[error("unknown node type: {0}")]
    UnknownNodeType(String),
}

/// Failures of the host capability surface.
#[derive(Error, Debug, Clone)]
pub enum HostError {
    #[error("operation not supported by this host: {0}")]
    Unsupported(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),
}

/// Result type for flow operations.
pub type Result<T> = std::result::Result<T, FlowError>;
