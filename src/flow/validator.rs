// SPDX-License-Identifier: MIT

//! Structural validation of a flow graph
//!
//! Validation always completes. Only a missing start node is an error; every
//! other finding is a warning and the caller decides whether it blocks.

use serde::{Serialize, Serializer};
use std::collections::{HashSet, VecDeque};
use std::fmt;

use super::types::FlowGraph;

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    NoStartNode,
    MultipleStartNodes(Vec<String>),
    NoEndNode,
    MissingExperiment { id: String, name: String },
    NoOutputConnections { id: String, name: String },
    UnreachableNode { id: String, name: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::NoStartNode => write!(f, "No Start node found in flow."),
            ValidationIssue::MultipleStartNodes(ids) => {
                write!(f, "Multiple Start nodes detected: [{}]", ids.join(", "))
            }
            ValidationIssue::NoEndNode => {
                write!(f, "No End node found - flow may never terminate.")
            }
            ValidationIssue::MissingExperiment { id, name } => {
                write!(f, "{} ({}): no experiment assigned.", id, name)
            }
            ValidationIssue::NoOutputConnections { id, name } => {
                write!(f, "{} ({}): no output connections.", id, name)
            }
            ValidationIssue::UnreachableNode { id, name } => {
                write!(f, "{} ({}): not reachable from the Start node.", id, name)
            }
        }
    }
}

impl Serialize for ValidationIssue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Errors and warnings found in a graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Warnings never affect validity
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Serialize for ValidationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ValidationReport", 3)?;
        state.serialize_field("valid", &self.is_valid())?;
        state.serialize_field("errors", &self.errors)?;
        state.serialize_field("warnings", &self.warnings)?;
        state.end()
    }
}

/// Run every structural rule against `graph`
pub fn validate(graph: &FlowGraph) -> ValidationReport {
    let mut report = ValidationReport::default();

    let starts = graph.start_nodes();
    if starts.is_empty() {
        report.errors.push(ValidationIssue::NoStartNode);
    }
    if starts.len() > 1 {
        report.warnings.push(ValidationIssue::MultipleStartNodes(
            starts.iter().map(|n| n.id.clone()).collect(),
        ));
    }

    if !graph.nodes().iter().any(|n| n.node_type.is_terminal()) {
        report.warnings.push(ValidationIssue::NoEndNode);
    }

    for node in graph.nodes() {
        if node.node_type.is_terminal() || node.node_type.is_start() {
            continue;
        }
        if !node.has_experiment() {
            report.warnings.push(ValidationIssue::MissingExperiment {
                id: node.id.clone(),
                name: node.name.clone(),
            });
        }
        if graph.outgoing(&node.id).next().is_none() {
            report.warnings.push(ValidationIssue::NoOutputConnections {
                id: node.id.clone(),
                name: node.name.clone(),
            });
        }
    }

    if !starts.is_empty() {
        let reachable = reachable_from(graph, starts.iter().map(|n| n.id.as_str()));
        for node in graph.nodes() {
            if !reachable.contains(node.id.as_str()) {
                report.warnings.push(ValidationIssue::UnreachableNode {
                    id: node.id.clone(),
                    name: node.name.clone(),
                });
            }
        }
    }

    report
}

fn reachable_from<'a>(
    graph: &'a FlowGraph,
    roots: impl Iterator<Item = &'a str>,
) -> HashSet<&'a str> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    for root in roots {
        if seen.insert(root) {
            queue.push_back(root);
        }
    }
    while let Some(id) = queue.pop_front() {
        for conn in graph.outgoing(id) {
            if seen.insert(conn.to.as_str()) {
                queue.push_back(conn.to.as_str());
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::types::{Node, NodeType, Port};

    fn graph_of(nodes: Vec<Node>, edges: &[(&str, &str, &str)]) -> FlowGraph {
        let mut graph = FlowGraph::new();
        for node in nodes {
            graph.add_node(node).unwrap();
        }
        for (from, to, port) in edges {
            graph.connect(from, to, Port::new(*port)).unwrap();
        }
        graph
    }

    #[test]
    fn test_clean_flow_has_no_findings() {
        let graph = graph_of(
            vec![
                Node::new("boot", "Boot", NodeType::Start),
                Node::new("t1", "T1", NodeType::Test).with_experiment("exp"),
                Node::new("pass", "End_PASS", NodeType::EndPass),
                Node::new("fail", "End_FAIL", NodeType::EndFail),
            ],
            &[
                ("boot", "t1", "PASS"),
                ("t1", "pass", "PASS"),
                ("t1", "fail", "FAIL"),
            ],
        );
        let report = validate(&graph);
        assert!(report.is_valid());
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn test_no_start_node_is_single_error() {
        let graph = graph_of(
            vec![
                Node::new("t1", "T1", NodeType::Test).with_experiment("exp"),
                Node::new("end", "End", NodeType::EndPass),
            ],
            &[("t1", "end", "PASS")],
        );
        let report = validate(&graph);
        assert!(!report.is_valid());
        assert_eq!(report.errors, vec![ValidationIssue::NoStartNode]);
    }

    #[test]
    fn test_multiple_start_nodes_is_warning() {
        let graph = graph_of(
            vec![
                Node::new("s1", "S1", NodeType::Start),
                Node::new("s2", "S2", NodeType::Start),
                Node::new("end", "End", NodeType::EndPass),
            ],
            &[("s1", "end", "PASS"), ("s2", "end", "PASS")],
        );
        let report = validate(&graph);
        assert!(report.is_valid());
        assert_eq!(
            report.warnings,
            vec![ValidationIssue::MultipleStartNodes(vec![
                "s1".to_string(),
                "s2".to_string()
            ])]
        );
        let text = report.warnings[0].to_string();
        assert!(text.contains("s1") && text.contains("s2"));
    }

    #[test]
    fn test_missing_experiment_and_outputs() {
        let graph = graph_of(
            vec![
                Node::new("boot", "Boot", NodeType::Start),
                Node::new("t1", "T1", NodeType::Gate),
            ],
            &[("boot", "t1", "PASS")],
        );
        let report = validate(&graph);
        assert!(report.is_valid());
        assert_eq!(
            report.warnings,
            vec![
                ValidationIssue::NoEndNode,
                ValidationIssue::MissingExperiment {
                    id: "t1".to_string(),
                    name: "T1".to_string()
                },
                ValidationIssue::NoOutputConnections {
                    id: "t1".to_string(),
                    name: "T1".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_unreachable_node_warning() {
        let graph = graph_of(
            vec![
                Node::new("boot", "Boot", NodeType::Start),
                Node::new("end", "End", NodeType::EndPass),
                Node::new("orphan", "Orphan", NodeType::EndFail),
            ],
            &[("boot", "end", "PASS")],
        );
        let report = validate(&graph);
        assert_eq!(
            report.warnings,
            vec![ValidationIssue::UnreachableNode {
                id: "orphan".to_string(),
                name: "Orphan".to_string()
            }]
        );
    }

    #[test]
    fn test_report_serializes_as_strings() {
        let report = validate(&FlowGraph::new());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["errors"][0], "No Start node found in flow.");
        assert_eq!(json["warnings"].as_array().unwrap().len(), 1);
    }
}
