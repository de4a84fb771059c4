// SPDX-License-Identifier: MIT

//! Flow builder - turns node descriptors into a [`FlowGraph`]
//!
//! Descriptors are resolved in two passes: ids and the name table first, then
//! wiring. A node without an explicit `on_pass` continues to the next
//! descriptor, which covers the common boot -> test -> ... -> end chain.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::policy::BranchPolicy;
use super::types::{FlowGraph, Node, NodeType, Port, Position};
use crate::error::BuildError;

/// Declarative description of one node
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct NodeDescriptor {
    /// Display label; also the key other descriptors use to reference this node
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    /// Caller-assigned id (defaults to `node_NNN`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, alias = "onPass", skip_serializing_if = "Option::is_none")]
    pub on_pass: Option<String>,
    #[serde(default, alias = "onFail", skip_serializing_if = "Option::is_none")]
    pub on_fail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i64>,
    #[serde(default, alias = "experimentRef", skip_serializing_if = "Option::is_none")]
    pub experiment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<BranchPolicy>,
}

impl NodeDescriptor {
    pub fn new(name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            name: Some(name.into()),
            node_type,
            ..Default::default()
        }
    }

    pub fn on_pass(mut self, target: impl Into<String>) -> Self {
        self.on_pass = Some(target.into());
        self
    }

    pub fn on_fail(mut self, target: impl Into<String>) -> Self {
        self.on_fail = Some(target.into());
        self
    }

    pub fn experiment(mut self, experiment: impl Into<String>) -> Self {
        self.experiment = Some(experiment.into());
        self
    }

    pub fn policy(mut self, policy: BranchPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Unnamed descriptors take their node id as name
    fn display_name(&self, index: usize) -> String {
        self.name
            .clone()
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| node_id(index))
    }
}

/// Generated id for the descriptor at `index`
pub fn node_id(index: usize) -> String {
    format!("node_{:03}", index)
}

/// Build a graph from an ordered list of descriptors
pub fn build(descriptors: &[NodeDescriptor]) -> Result<FlowGraph, BuildError> {
    let mut graph = FlowGraph::new();
    let mut name_to_id: HashMap<String, String> = HashMap::new();
    let mut ids: Vec<String> = Vec::with_capacity(descriptors.len());
    let mut seen_ids: HashSet<String> = HashSet::new();

    // First pass: ids, names and nodes
    for (i, desc) in descriptors.iter().enumerate() {
        let name = desc.display_name(i);
        let id = desc.id.clone().unwrap_or_else(|| node_id(i));

        if name_to_id.contains_key(&name) {
            return Err(BuildError::DuplicateNodeName(name));
        }
        if !seen_ids.insert(id.clone()) {
            return Err(BuildError::DuplicateNodeId(id));
        }

        let mut node = Node::new(id.clone(), name.clone(), desc.node_type);
        if let Some(experiment) = &desc.experiment {
            node = node.with_experiment(experiment.clone());
        }
        if let Some(policy) = desc.policy {
            node = node.with_policy(policy);
        }
        if desc.x.is_some() || desc.y.is_some() {
            node = node.with_position(Position::new(
                desc.x.unwrap_or_default(),
                desc.y.unwrap_or_default(),
            ));
        }

        log::debug!("Creating node {} ({}, {})", id, name, desc.node_type);
        graph.add_node(node)?;
        name_to_id.insert(name, id.clone());
        ids.push(id);
    }

    let resolve = |desc_name: &str, target: &str| -> Result<String, BuildError> {
        name_to_id
            .get(target)
            .cloned()
            .ok_or_else(|| BuildError::UnknownNodeReference {
                node: desc_name.to_string(),
                target: target.to_string(),
            })
    };

    // Second pass: wiring
    for (i, desc) in descriptors.iter().enumerate() {
        let src = &ids[i];
        let name = desc.display_name(i);

        if desc.node_type.is_terminal() {
            if desc.on_pass.is_some() || desc.on_fail.is_some() {
                log::warn!("Ignoring output wiring on terminal node '{}'", name);
            }
            continue;
        }

        match &desc.on_pass {
            Some(target) => {
                let dst = resolve(&name, target)?;
                graph.connect(src, &dst, Port::pass())?;
            }
            None => {
                if let Some(next) = ids.get(i + 1) {
                    graph.connect(src, next, Port::pass())?;
                }
            }
        }

        if let Some(target) = &desc.on_fail {
            let dst = resolve(&name, target)?;
            graph.connect(src, &dst, Port::fail())?;
        }
    }

    log::info!(
        "Built flow graph with {} nodes and {} connections",
        graph.len(),
        graph.connections().len()
    );

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> Vec<NodeDescriptor> {
        vec![
            NodeDescriptor::new("Boot", NodeType::Start),
            NodeDescriptor::new("T1", NodeType::Test)
                .experiment("exp_t1")
                .on_pass("End_PASS")
                .on_fail("End_FAIL"),
            NodeDescriptor::new("End_PASS", NodeType::EndPass),
            NodeDescriptor::new("End_FAIL", NodeType::EndFail),
        ]
    }

    #[test]
    fn test_builds_scenario_graph() {
        let graph = build(&scenario()).unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.connections().len(), 3);

        let boot = graph.connection_on("node_000", &Port::pass()).unwrap();
        assert_eq!(boot.to, "node_001");
        assert_eq!(
            graph.connection_on("node_001", &Port::pass()).unwrap().to,
            "node_002"
        );
        assert_eq!(
            graph.connection_on("node_001", &Port::fail()).unwrap().to,
            "node_003"
        );
        assert_eq!(graph.outgoing("node_002").count(), 0);
    }

    #[test]
    fn test_default_linear_chain() {
        let descriptors = vec![
            NodeDescriptor::new("Boot", NodeType::Start),
            NodeDescriptor::new("A", NodeType::Test),
            NodeDescriptor::new("B", NodeType::Test),
            NodeDescriptor::new("End", NodeType::EndPass),
        ];
        let graph = build(&descriptors).unwrap();
        let targets: Vec<_> = graph.connections().iter().map(|c| c.to.as_str()).collect();
        assert_eq!(targets, vec!["node_001", "node_002", "node_003"]);
        assert!(graph.connections().iter().all(|c| c.port == Port::pass()));
    }

    #[test]
    fn test_last_non_terminal_has_no_default_edge() {
        let descriptors = vec![
            NodeDescriptor::new("Boot", NodeType::Start),
            NodeDescriptor::new("A", NodeType::Test),
        ];
        let graph = build(&descriptors).unwrap();
        assert_eq!(graph.outgoing("node_001").count(), 0);
    }

    #[test]
    fn test_duplicate_name_fails() {
        let descriptors = vec![
            NodeDescriptor::new("A", NodeType::Test),
            NodeDescriptor::new("A", NodeType::Test),
        ];
        assert_eq!(
            build(&descriptors).unwrap_err(),
            BuildError::DuplicateNodeName("A".to_string())
        );
    }

    #[test]
    fn test_unknown_reference_names_descriptor_and_target() {
        let descriptors = vec![NodeDescriptor::new("A", NodeType::Test).on_fail("Nowhere")];
        assert_eq!(
            build(&descriptors).unwrap_err(),
            BuildError::UnknownNodeReference {
                node: "A".to_string(),
                target: "Nowhere".to_string(),
            }
        );
    }

    #[test]
    fn test_caller_ids_and_positions() {
        let mut start = NodeDescriptor::new("Boot", NodeType::Start);
        start.id = Some("boot".to_string());
        start.x = Some(40);
        start.y = Some(60);
        let mut end = NodeDescriptor::new("End", NodeType::EndAbort);
        end.id = Some("end".to_string());

        let graph = build(&[start, end]).unwrap();
        assert_eq!(graph.node("boot").unwrap().position, Some(Position::new(40, 60)));
        assert_eq!(graph.connections()[0].to, "end");
    }

    #[test]
    fn test_terminal_wiring_is_ignored() {
        let descriptors = vec![
            NodeDescriptor::new("Boot", NodeType::Start),
            NodeDescriptor::new("End", NodeType::EndPass).on_pass("Boot"),
        ];
        let graph = build(&descriptors).unwrap();
        assert_eq!(graph.connections().len(), 1);
    }

    #[test]
    fn test_referential_integrity() {
        let graph = build(&scenario()).unwrap();
        for conn in graph.connections() {
            assert!(graph.contains(&conn.from));
            assert!(graph.contains(&conn.to));
        }
    }

    #[test]
    fn test_descriptor_deserialize_camel_case() {
        let json = r#"{"name": "T1", "type": "Test", "onPass": "End", "experimentRef": "x"}"#;
        let desc: NodeDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.on_pass.as_deref(), Some("End"));
        assert_eq!(desc.experiment.as_deref(), Some("x"));
    }

    #[test]
    fn test_unnamed_descriptor_takes_its_id() {
        let descriptors: Vec<NodeDescriptor> = serde_json::from_value(serde_json::json!([
            {"name": "Boot", "type": "Start"},
            {"type": "Test"},
            {"name": "Node_1", "type": "Test"},
            {"id": "tail", "type": "EndPass"}
        ]))
        .unwrap();

        let graph = build(&descriptors).unwrap();
        assert_eq!(graph.node("node_001").unwrap().name, "node_001");
        assert_eq!(graph.node("node_002").unwrap().name, "Node_1");
        assert_eq!(graph.node("tail").unwrap().name, "tail");
        assert_eq!(
            graph.connection_on("node_001", &Port::pass()).unwrap().to,
            "node_002"
        );
    }
}
