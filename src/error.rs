// SPDX-License-Identifier: MIT

//! Typed error handling for autoflow-rs
//!
//! Build and execution errors are fatal and carry enough context (node id or
//! name, the missing reference) to fix the input. Validation never errors; it
//! reports through `ValidationReport` instead.

use thiserror::Error;

/// Top-level error type for autoflow-rs
#[derive(Debug, Error)]
pub enum FlowError {
    /// Graph construction errors
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Runtime errors raised while walking a flow
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Bundle export/import errors
    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),

    /// Configuration errors (invalid config file, bad env override)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl FlowError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Violations of the graph model invariants, raised at insertion time
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Terminal nodes never have outgoing connections
    #[error("Terminal node '{node}' cannot have an outgoing connection (port {port})")]
    TerminalOutput { node: String, port: String },

    /// At most one outgoing connection per port label
    #[error("Node '{node}' already has a connection on port {port}")]
    DuplicatePort { node: String, port: String },

    #[error("Terminal node '{0}' cannot reference an experiment")]
    TerminalExperiment(String),
}

/// Errors raised while turning declarative input into a graph
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Duplicate node name: {0}")]
    DuplicateNodeName(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("Node '{node}' references unknown node '{target}'")]
    UnknownNodeReference { node: String, target: String },

    #[error("Structure key '{key}' not found (referenced by {referenced_by})")]
    UnknownStructureKey { key: String, referenced_by: String },

    #[error("Cyclic reference in structure: {}", chain.join(" -> "))]
    CyclicReference { chain: Vec<String> },

    #[error("Unknown instance type '{instance_type}' for node {key}")]
    UnknownInstanceType { key: String, instance_type: String },

    #[error("Node {key} of type {instance_type} requires a flow assignment")]
    MissingFlow { key: String, instance_type: String },

    #[error("Flow '{flow}' not found in flows file for node {key}")]
    UnknownFlow { key: String, flow: String },

    #[error("Invalid output port '{port}' on node {key}")]
    InvalidPort { key: String, port: String },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Fatal errors raised by the executor
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Start node '{0}' not found in flow")]
    UnknownStartNode(String),

    /// The branch policy picked a port with no connection on a wired node
    #[error("No handler for port {port} on node {node}")]
    NoHandlerForPort { node: String, port: String },

    #[error("Connection target '{0}' not found in flow")]
    UnknownNode(String),

    #[error("Flow execution exceeded the step limit ({0})")]
    StepLimitExceeded(usize),

    /// Failure reported by the experiment collaborator, passed through unchanged
    #[error("Experiment failed on node {node}: {source}")]
    Collaborator {
        node: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Errors raised while exporting, importing or packing a four-file bundle
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Bundle member missing: {0}")]
    MissingMember(String),

    #[error("Invalid {member}: {source}")]
    Json {
        member: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Binding references unknown node '{0}'")]
    UnknownBindingNode(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Bundle archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
