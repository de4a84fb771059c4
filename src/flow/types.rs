// SPDX-License-Identifier: MIT

//! Flow graph type definitions
//!
//! Nodes live in an arena owned by [`FlowGraph`] and connections refer to them
//! by id, so a node reached from several predecessors exists exactly once.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::policy::BranchPolicy;
use crate::error::GraphError;

/// Kind of a flow node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
pub enum NodeType {
    /// Entry point of the flow (boot step)
    #[serde(alias = "Boot", alias = "StartNode")]
    Start,
    /// Runs an experiment and branches on its outcome
    #[default]
    Test,
    /// Decision point; runs an experiment like `Test`
    Gate,
    #[serde(alias = "EndNode")]
    EndPass,
    EndFail,
    EndAbort,
}

impl NodeType {
    /// Terminal nodes end the flow and never have outgoing connections
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeType::EndPass | NodeType::EndFail | NodeType::EndAbort)
    }

    pub fn is_start(&self) -> bool {
        matches!(self, NodeType::Start)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Start => "Start",
            NodeType::Test => "Test",
            NodeType::Gate => "Gate",
            NodeType::EndPass => "EndPass",
            NodeType::EndFail => "EndFail",
            NodeType::EndAbort => "EndAbort",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output port label
///
/// `PASS` and `FAIL` are canonical; any other label is allowed for multi-way
/// gates. Branch policies work on port indices: 0 is `FAIL`, 1 is `PASS` and
/// any other index maps to its decimal label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Port(String);

impl Port {
    pub const PASS: &'static str = "PASS";
    pub const FAIL: &'static str = "FAIL";

    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn pass() -> Self {
        Self::new(Self::PASS)
    }

    pub fn fail() -> Self {
        Self::new(Self::FAIL)
    }

    pub fn from_index(index: u32) -> Self {
        match index {
            0 => Self::fail(),
            1 => Self::pass(),
            n => Self(n.to_string()),
        }
    }

    /// Inverse of [`Port::from_index`]; `None` for non-numeric custom labels
    pub fn index(&self) -> Option<u32> {
        match self.0.as_str() {
            Self::FAIL => Some(0),
            Self::PASS => Some(1),
            other => other.parse().ok(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canvas position (advisory, used only for rendering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// A vertex of the flow graph
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Opaque reference to the experiment this node runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment: Option<String>,
    #[serde(default, skip_serializing_if = "BranchPolicy::is_default")]
    pub policy: BranchPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type,
            experiment: None,
            policy: BranchPolicy::default(),
            position: None,
        }
    }

    pub fn with_experiment(mut self, experiment: impl Into<String>) -> Self {
        self.experiment = Some(experiment.into());
        self
    }

    pub fn with_policy(mut self, policy: BranchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// True when the node has a non-blank experiment reference
    pub fn has_experiment(&self) -> bool {
        self.experiment
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty())
    }
}

/// Directed edge between two nodes of the same graph
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
    #[serde(rename = "on")]
    pub port: Port,
}

impl Connection {
    pub fn new(from: impl Into<String>, to: impl Into<String>, port: Port) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            port,
        }
    }
}

/// Node arena plus connection list
///
/// Insertion order is preserved and is the graph's node ordering everywhere a
/// deterministic order is needed (default wiring, layout fallbacks, export).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowGraph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    connections: Vec<Connection>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; ids must be unique and terminals may not reference experiments
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.index.contains_key(&node.id) {
            return Err(GraphError::DuplicateNodeId(node.id));
        }
        if node.node_type.is_terminal() && node.experiment.is_some() {
            return Err(GraphError::TerminalExperiment(node.id));
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Add a connection, enforcing referential integrity and port uniqueness
    pub fn connect(
        &mut self,
        from: &str,
        to: &str,
        port: Port,
    ) -> Result<(), GraphError> {
        let source = self
            .node(from)
            .ok_or_else(|| GraphError::UnknownNode(from.to_string()))?;
        if source.node_type.is_terminal() {
            return Err(GraphError::TerminalOutput {
                node: from.to_string(),
                port: port.to_string(),
            });
        }
        if !self.contains(to) {
            return Err(GraphError::UnknownNode(to.to_string()));
        }
        if self.connection_on(from, &port).is_some() {
            return Err(GraphError::DuplicatePort {
                node: from.to_string(),
                port: port.to_string(),
            });
        }
        self.connections.push(Connection::new(from, to, port));
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn set_position(&mut self, id: &str, position: Position) -> Result<(), GraphError> {
        let i = *self
            .index
            .get(id)
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;
        self.nodes[i].position = Some(position);
        Ok(())
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Outgoing connections of a node, in insertion order
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.from == id)
    }

    pub fn connection_on(&self, id: &str, port: &Port) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|c| c.from == id && &c.port == port)
    }

    pub fn start_nodes(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| n.node_type.is_start())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// How the experiments bound to a node are run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
}

/// Experiment payloads bound to one node
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct ExperimentBinding {
    /// Display name of the bound node, kept for human readers of the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default)]
    pub experiments: Vec<Value>,
    #[serde(default)]
    pub mode: ExecutionMode,
}

impl ExperimentBinding {
    pub fn new(experiments: Vec<Value>) -> Self {
        Self {
            node: None,
            experiments,
            mode: ExecutionMode::Sequential,
        }
    }
}

/// Experiment bindings keyed by node id
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(transparent)]
pub struct Bindings(BTreeMap<String, ExperimentBinding>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind experiments given by node *name*; unknown names are skipped
    pub fn from_named(graph: &FlowGraph, experiments: &BTreeMap<String, Vec<Value>>) -> Self {
        let mut bindings = Self::new();
        for (name, payloads) in experiments {
            match graph.nodes().iter().find(|n| &n.name == name) {
                Some(node) => {
                    bindings.insert(
                        node.id.clone(),
                        ExperimentBinding {
                            node: Some(name.clone()),
                            experiments: payloads.clone(),
                            mode: ExecutionMode::Sequential,
                        },
                    );
                }
                None => log::warn!("Skipping experiments for unknown node name '{}'", name),
            }
        }
        bindings
    }

    pub fn insert(&mut self, node_id: impl Into<String>, binding: ExperimentBinding) {
        self.0.insert(node_id.into(), binding);
    }

    pub fn get(&self, node_id: &str) -> Option<&ExperimentBinding> {
        self.0.get(node_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExperimentBinding)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Target-machine connection parameters attached to a whole flow
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct UnitConfig {
    #[serde(default, deserialize_with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub com_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, deserialize_with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub lot: Option<String>,
    #[serde(default, deserialize_with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub wafer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dut_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
}

/// Accept `11` as well as `"11"` for fields that are usually numeric
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
