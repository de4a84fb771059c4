// SPDX-License-Identifier: MIT

//! Recipe builder - structure file + flows file
//!
//! The recipe format describes each node by a structure key with an
//! `outputNodeMap` from port index to another structure key. Nodes are built
//! recursively from the root; every built key is memoized so a node reached
//! from several predecessors is created once, and keys still under
//! construction are tracked separately so cycles are reported instead of
//! recursing forever.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

use super::policy::BranchPolicy;
use super::types::{Bindings, ExperimentBinding, FlowGraph, Node, NodeType, Port};
use crate::bundle::ini::{payload_key, typed_value, IniDocument};
use crate::error::BuildError;

/// One entry of the structure file
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecipeNode {
    pub name: String,
    pub instance_type: String,
    /// Key into the flows file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    /// Port index (as a string) -> structure key
    #[serde(default)]
    pub output_node_map: BTreeMap<String, String>,
}

/// Structure key -> node description
pub type RecipeStructure = BTreeMap<String, RecipeNode>;

/// Flow key -> experiment payload
pub type RecipeFlows = BTreeMap<String, Value>;

/// Builds a graph and its bindings from recipe files
pub struct RecipeBuilder<'a> {
    structure: &'a RecipeStructure,
    flows: &'a RecipeFlows,
    overrides: Option<IniDocument>,
    graph: FlowGraph,
    bindings: Bindings,
    built: HashSet<String>,
    in_progress: Vec<String>,
}

impl<'a> RecipeBuilder<'a> {
    pub fn new(structure: &'a RecipeStructure, flows: &'a RecipeFlows) -> Self {
        Self {
            structure,
            flows,
            overrides: None,
            graph: FlowGraph::new(),
            bindings: Bindings::new(),
            built: HashSet::new(),
            in_progress: Vec::new(),
        }
    }

    /// Per-flow overrides: each INI section named after a flow key is merged
    /// over that flow's payload
    pub fn with_overrides(mut self, ini_text: &str) -> Self {
        self.overrides = Some(IniDocument::parse(ini_text));
        self
    }

    /// Build every node reachable from `root_key`
    pub fn build(mut self, root_key: &str) -> Result<(FlowGraph, Bindings), BuildError> {
        self.build_instance(root_key, "root")?;

        log::info!(
            "Flow built successfully with root: {} ({} nodes)",
            root_key,
            self.graph.len()
        );

        Ok((self.graph, self.bindings))
    }

    fn build_instance(&mut self, key: &str, referenced_by: &str) -> Result<(), BuildError> {
        if self.built.contains(key) {
            return Ok(());
        }
        if let Some(pos) = self.in_progress.iter().position(|k| k == key) {
            let mut chain = self.in_progress[pos..].to_vec();
            chain.push(key.to_string());
            return Err(BuildError::CyclicReference { chain });
        }

        let structure = self.structure;
        let flows = self.flows;
        let config = structure
            .get(key)
            .ok_or_else(|| BuildError::UnknownStructureKey {
                key: key.to_string(),
                referenced_by: referenced_by.to_string(),
            })?;

        let (node_type, policy) = resolve_instance_type(key, &config.instance_type)?;
        log::debug!(
            "Building node: {} (Type: {}, Flow: {:?})",
            key,
            config.instance_type,
            config.flow
        );

        let mut node = Node::new(key, config.name.clone(), node_type).with_policy(policy);

        if !node_type.is_start() && !node_type.is_terminal() {
            let flow = config
                .flow
                .as_ref()
                .ok_or_else(|| BuildError::MissingFlow {
                    key: key.to_string(),
                    instance_type: config.instance_type.clone(),
                })?;
            let payload = flows
                .get(flow)
                .ok_or_else(|| BuildError::UnknownFlow {
                    key: key.to_string(),
                    flow: flow.clone(),
                })?;

            let mut binding = ExperimentBinding::new(vec![self.merge_overrides(flow, payload)]);
            binding.node = Some(config.name.clone());
            self.bindings.insert(key, binding);
            node = node.with_experiment(flow.clone());
        }

        // The node is owned by the arena before its successors are built, so
        // shared successors only ever see it by id.
        self.graph.add_node(node)?;
        self.in_progress.push(key.to_string());

        let mut outputs = Vec::with_capacity(config.output_node_map.len());
        for (port, target) in &config.output_node_map {
            let index: u32 = port.trim().parse().map_err(|_| BuildError::InvalidPort {
                key: key.to_string(),
                port: port.clone(),
            })?;
            outputs.push((index, target));
        }
        outputs.sort_by_key(|(index, _)| *index);

        for (index, target) in outputs {
            self.build_instance(target, key)?;
            self.graph.connect(key, target, Port::from_index(index))?;
        }

        self.in_progress.pop();
        self.built.insert(key.to_string());
        Ok(())
    }

    fn merge_overrides(&self, flow: &str, payload: &Value) -> Value {
        let section = self.overrides.as_ref().and_then(|doc| doc.section(flow));
        let Some(section) = section else {
            return payload.clone();
        };

        let mut merged = match payload {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        for (k, v) in &section.entries {
            merged.insert(payload_key(k), typed_value(v));
        }
        Value::Object(merged)
    }
}

fn resolve_instance_type(key: &str, instance_type: &str) -> Result<(NodeType, BranchPolicy), BuildError> {
    if let Some(policy) = BranchPolicy::from_instance_type(instance_type) {
        return Ok((NodeType::Test, policy));
    }
    let node_type = match instance_type {
        "StartNode" | "Start" | "Boot" => NodeType::Start,
        "EndNode" | "EndPass" => NodeType::EndPass,
        "EndFail" => NodeType::EndFail,
        "EndAbort" => NodeType::EndAbort,
        other => {
            return Err(BuildError::UnknownInstanceType {
                key: key.to_string(),
                instance_type: other.to_string(),
            })
        }
    };
    Ok((node_type, BranchPolicy::default()))
}
