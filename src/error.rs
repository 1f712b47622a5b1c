//! Error types for graph mutation, evaluation and persistence

use thiserror::Error;
use uuid::Uuid;

/// Errors raised synchronously by graph mutations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),
    #[error("Node not found: {0}")]
    UnknownNode(Uuid),
    #[error("Node {node} is a {expected} node, got {actual} properties")]
    PropertyTypeMismatch {
        node: Uuid,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Why an edge insertion was refused. The graph is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EdgeRejected {
    #[error("Cannot connect a node to itself")]
    SelfLoop,
    #[error("Connection would create a cycle")]
    Cycle,
    #[error("Node not found: {0}")]
    UnknownNode(Uuid),
    #[error("Node {node} has no {direction} port named '{port}'")]
    UnknownPort {
        node: Uuid,
        port: String,
        direction: &'static str,
    },
}

/// Failure of a single node's compute step
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputeError {
    #[error("Requested size {width}x{height} exceeds the limit of {max}")]
    DimensionTooLarge { width: u32, height: u32, max: u32 },
    #[error("Compute timed out after {0} ms")]
    Timeout(u64),
    #[error("Image error: {0}")]
    Image(String),
    #[error("Compute task failed: {0}")]
    Aborted(String),
}

/// Errors that abort a whole evaluation pass
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("Cycle detected in node graph")]
    CycleDetected,
}

/// Errors while restoring a graph snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid ID '{0}'")]
    InvalidId(String),
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),
    #[error("Invalid parameters for node {node}: {reason}")]
    InvalidParams { node: String, reason: String },
    #[error("Duplicate ID {0}")]
    DuplicateId(Uuid),
    #[error("Edge {edge} rejected: {reason}")]
    InvalidEdge { edge: Uuid, reason: EdgeRejected },
    #[error("Input '{port}' of node {node} is bound more than once")]
    DuplicateBinding { node: Uuid, port: String },
}

/// Errors while loading the engine configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}
