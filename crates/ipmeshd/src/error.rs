//! Error types for the configuration engine.
//!
//! Overlay-phase failures ([`ConfigurationError`]) abort a run before any
//! artifact is written. Node failures ([`NodeBuildError`]) are reported per
//! node and never stop sibling builds.

use ipmesh_lib::{DescriptionError, Element, NodeId, TopologyError, Value, ValueKind};
use std::path::PathBuf;
use thiserror::Error;

/// Problems with the declared configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    /// A daemon needs a property the topology does not provide.
    #[error("{kind} on node `{node}` requires {property}")]
    MissingProperty {
        node: NodeId,
        kind: String,
        property: String,
    },
    /// Two overlays assign different values to an exclusive key.
    #[error(
        "overlays `{first}` and `{second}` assign conflicting values to exclusive key `{key}` on {element}: `{first_value}` vs `{second_value}`"
    )]
    ExclusiveConflict {
        element: Element,
        key: String,
        first: String,
        first_value: Value,
        second: String,
        second_value: Value,
    },
    #[error("daemon dependency cycle on node `{node}`: {}", .cycle.join(" -> "))]
    DependencyCycle { node: NodeId, cycle: Vec<String> },
    #[error("unknown daemon kind `{kind}` on node `{node}`")]
    UnknownDaemonKind { node: NodeId, kind: String },
    #[error("daemon `{kind}` is declared more than once on node `{node}`")]
    DuplicateDaemon { node: NodeId, kind: String },
    #[error("overlay `{overlay}` assigns unrecognised property `{key}`")]
    UnknownProperty { overlay: String, key: String },
    #[error("overlay `{overlay}` assigns a {found} to `{key}`, expected a {expected}")]
    PropertyKind {
        overlay: String,
        key: String,
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("option `{key}` of {kind} on node `{node}`: {reason}")]
    InvalidOption {
        node: NodeId,
        kind: String,
        key: String,
        reason: String,
    },
    #[error("invalid kill pattern for {kind}: {source}")]
    KillPattern {
        kind: String,
        #[source]
        source: regex::Error,
    },
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Failures of a daemon dry run.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("dry run of {kind} on node `{node}` has a malformed command `{command}`: {reason}")]
    Command {
        node: NodeId,
        kind: String,
        command: String,
        reason: String,
    },
    #[error("dry run of {kind} on node `{node}` could not start `{command}`: {source}")]
    Spawn {
        node: NodeId,
        kind: String,
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("dry run of {kind} on node `{node}` failed ({status}): {stderr}")]
    Failed {
        node: NodeId,
        kind: String,
        status: String,
        stderr: String,
    },
    #[error("dry run of {kind} on node `{node}` timed out after {secs}s")]
    Timeout {
        node: NodeId,
        kind: String,
        secs: u64,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("unknown template `{0}`")]
    UnknownTemplate(String),
    #[error("cannot render `{key}`: {reason}")]
    Value { key: String, reason: String },
    #[error("failed to encode JSON: {0}")]
    Json(String),
}

/// Failure of a single node's build.
#[derive(Debug, Error)]
pub enum NodeBuildError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("failed to render {kind} configuration: {source}")]
    Render {
        kind: String,
        #[source]
        source: RenderError,
    },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Failures that abort a whole engine run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Description(#[from] DescriptionError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("node build task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("failed to encode the process plan: {0}")]
    Plan(#[from] serde_json::Error),
}
