// SPDX-License-Identifier: MIT

//! Structure file shapes
//!
//! The canonical shape lists nodes and connections separately. The legacy
//! shape nests each node's outgoing connections under the node, keyed by port
//! label. Both carry the same information and convert into each other.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::flow::policy::BranchPolicy;
use crate::flow::types::{Connection, FlowGraph, Node, NodeType, Port};

/// Node entry of the structure file; positions live in their own file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StructureNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment: Option<String>,
    #[serde(default, skip_serializing_if = "BranchPolicy::is_default")]
    pub policy: BranchPolicy,
}

impl StructureNode {
    pub fn into_node(self) -> Node {
        Node {
            id: self.id,
            name: self.name,
            node_type: self.node_type,
            experiment: self.experiment,
            policy: self.policy,
            position: None,
        }
    }
}

impl From<&Node> for StructureNode {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            node_type: node.node_type,
            experiment: node.experiment.clone(),
            policy: node.policy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct StructureDocument {
    pub nodes: Vec<StructureNode>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl StructureDocument {
    pub fn from_graph(graph: &FlowGraph) -> Self {
        Self {
            nodes: graph.nodes().iter().map(StructureNode::from).collect(),
            connections: graph.connections().to_vec(),
        }
    }

    pub fn to_legacy(&self) -> LegacyStructure {
        let mut legacy = LegacyStructure::new();
        for node in &self.nodes {
            let connections = self
                .connections
                .iter()
                .filter(|c| c.from == node.id)
                .map(|c| (c.port.clone(), c.to.clone()))
                .collect();
            legacy.insert(
                node.id.clone(),
                LegacyNode {
                    name: node.name.clone(),
                    node_type: node.node_type,
                    experiment: node.experiment.clone(),
                    policy: node.policy,
                    connections,
                },
            );
        }
        legacy
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LegacyNode {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment: Option<String>,
    #[serde(default, skip_serializing_if = "BranchPolicy::is_default")]
    pub policy: BranchPolicy,
    /// Port label -> target node id
    #[serde(default)]
    pub connections: BTreeMap<Port, String>,
}

/// Node id -> node with nested connections
pub type LegacyStructure = BTreeMap<String, LegacyNode>;

/// Convert the legacy shape; nodes and each node's ports come out in key order
pub fn from_legacy(legacy: &LegacyStructure) -> StructureDocument {
    let mut doc = StructureDocument::default();
    for (id, node) in legacy {
        doc.nodes.push(StructureNode {
            id: id.clone(),
            name: node.name.clone(),
            node_type: node.node_type,
            experiment: node.experiment.clone(),
            policy: node.policy,
        });
        for (port, target) in &node.connections {
            doc.connections
                .push(Connection::new(id.clone(), target.clone(), port.clone()));
        }
    }
    doc
}

/// Either structure shape, as read from disk
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AnyStructure {
    Canonical(StructureDocument),
    Legacy(LegacyStructure),
}

impl AnyStructure {
    pub fn into_canonical(self) -> StructureDocument {
        match self {
            AnyStructure::Canonical(doc) => doc,
            AnyStructure::Legacy(legacy) => from_legacy(&legacy),
        }
    }
}
