// SPDX-License-Identifier: MIT

//! Generate a linear flow from a list of experiments
//!
//! Produces `Boot -> Test_1 -> ... -> Test_n`, with the last test branching to
//! `End_PASS` / `End_FAIL`. Earlier tests only continue on PASS.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::builder::NodeDescriptor;
use super::loader::FlowDocument;
use super::types::NodeType;

const TEST_NAME_KEY: &str = "Test Name";
const END_PASS: &str = "End_PASS";
const END_FAIL: &str = "End_FAIL";

/// Experiments as read from a file: a list, or one experiment object
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ExperimentInput {
    Many(Vec<Value>),
    One(Map<String, Value>),
}

impl ExperimentInput {
    pub fn into_vec(self) -> Vec<Value> {
        match self {
            Self::Many(experiments) => experiments,
            Self::One(experiment) => vec![Value::Object(experiment)],
        }
    }
}

/// Name used for the experiment at `index` (0-based)
fn test_name(experiment: &Value, index: usize) -> String {
    experiment
        .get(TEST_NAME_KEY)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Test_{}", index + 1))
}

/// Descriptors plus name-keyed experiment payloads for one linear flow
pub fn descriptors_from_experiments(
    experiments: &[Value],
    include_boot: bool,
) -> FlowDocument {
    let mut nodes = Vec::with_capacity(experiments.len() + 3);
    let mut bound = BTreeMap::new();

    if include_boot {
        nodes.push(NodeDescriptor::new("Boot", NodeType::Start));
    }

    for (index, experiment) in experiments.iter().enumerate() {
        let name = test_name(experiment, index);
        let mut descriptor = NodeDescriptor::new(name.clone(), NodeType::Test).experiment(name.clone());
        if index + 1 == experiments.len() {
            descriptor = descriptor.on_pass(END_PASS).on_fail(END_FAIL);
        }
        nodes.push(descriptor);
        bound
            .entry(name)
            .or_insert_with(Vec::new)
            .push(experiment.clone());
    }

    nodes.push(NodeDescriptor::new(END_PASS, NodeType::EndPass));
    nodes.push(NodeDescriptor::new(END_FAIL, NodeType::EndFail));

    log::debug!("Generated {} descriptors from {} experiments", nodes.len(), experiments.len());

    FlowDocument {
        name: None,
        description: None,
        nodes,
        experiments: bound,
        unit_config: Default::default(),
    }
}
