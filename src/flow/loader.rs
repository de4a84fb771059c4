// SPDX-License-Identifier: MIT

//! Flow loader - JSON/YAML flow document loading
//!
//! A flow document carries node descriptors plus the experiments bound to each
//! node by name and an optional unit configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::builder::{build, NodeDescriptor};
use super::types::{Bindings, FlowGraph, UnitConfig};
use crate::error::{BuildError, FlowError};

/// Declarative flow as written by the editor or by hand
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FlowDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<NodeDescriptor>,
    /// Node name -> experiment payloads
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub experiments: BTreeMap<String, Vec<Value>>,
    #[serde(default, alias = "unitConfig")]
    pub unit_config: UnitConfig,
}

impl FlowDocument {
    /// Build the graph and resolve name-keyed experiments into bindings
    pub fn build(&self) -> Result<(FlowGraph, Bindings), BuildError> {
        let graph = build(&self.nodes)?;
        let bindings = Bindings::from_named(&graph, &self.experiments);
        log::info!(
            "Built flow {} with {} nodes and {} bindings",
            self.name.as_deref().unwrap_or("<unnamed>"),
            graph.len(),
            bindings.len()
        );
        Ok((graph, bindings))
    }
}

/// Loads flow documents from disk
pub struct FlowLoader;

impl FlowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a flow document; `.json` files are parsed as JSON, everything else as YAML
    pub fn load_descriptors<P: AsRef<Path>>(&self, path: P) -> Result<FlowDocument, FlowError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::parse_json(&content)
        } else {
            Self::parse_yaml(&content)
        }
    }

    pub fn parse_yaml(content: &str) -> Result<FlowDocument, FlowError> {
        let doc: FlowDocument = serde_yaml::from_str(content)?;
        Ok(doc)
    }

    pub fn parse_json(content: &str) -> Result<FlowDocument, FlowError> {
        let doc: FlowDocument = serde_json::from_str(content)?;
        Ok(doc)
    }
}

impl Default for FlowLoader {
    fn default() -> Self {
        Self::new()
    }
}
