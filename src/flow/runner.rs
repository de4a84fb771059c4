// SPDX-License-Identifier: MIT

//! Experiment collaborator interface
//!
//! The executor never runs hardware itself. It hands each node's bound
//! experiments to an [`ExperimentRunner`] and branches on the outcomes it
//! returns. Retries, process isolation and hardware access all live behind
//! this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::Path;

use super::executor::TesterDefaults;
use super::policy::Outcome;
use super::types::ExecutionMode;

/// Everything the collaborator needs to run one node visit
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentRequest<'a> {
    pub node_id: &'a str,
    pub node_name: &'a str,
    pub experiment: Option<&'a str>,
    /// Experiment payloads bound to the node, in run order
    pub payloads: &'a [Value],
    pub mode: ExecutionMode,
    pub overrides: &'a TesterDefaults,
}

/// Outcome of one experiment iteration plus whatever the runner reports
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IterationResult {
    pub status: Outcome,
    #[serde(default)]
    pub metadata: Value,
}

impl IterationResult {
    pub fn new(status: Outcome) -> Self {
        Self {
            status,
            metadata: Value::Null,
        }
    }
}

/// Runs the experiments of one node and reports per-iteration outcomes
#[async_trait]
pub trait ExperimentRunner: Send + Sync {
    async fn run_experiment(
        &self,
        request: &ExperimentRequest<'_>,
    ) -> Result<Vec<IterationResult>, Box<dyn Error + Send + Sync>>;
}

/// Replays canned outcomes, keyed by node id or node name
///
/// Used for dry runs of a flow without hardware attached.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRunner {
    outcomes: HashMap<String, Vec<Outcome>>,
    default: Vec<Outcome>,
}

impl ScriptedRunner {
    pub fn new(outcomes: HashMap<String, Vec<Outcome>>) -> Self {
        Self {
            outcomes,
            default: vec![Outcome::Pass],
        }
    }

    /// Load `{"node id or name": ["PASS", "FAIL", ...]}` from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let content = fs::read_to_string(path)?;
        let outcomes: HashMap<String, Vec<Outcome>> = serde_json::from_str(&content)?;
        Ok(Self::new(outcomes))
    }

    /// Outcomes used for nodes with no script entry
    pub fn with_default(mut self, default: Vec<Outcome>) -> Self {
        self.default = default;
        self
    }
}

#[async_trait]
impl ExperimentRunner for ScriptedRunner {
    async fn run_experiment(
        &self,
        request: &ExperimentRequest<'_>,
    ) -> Result<Vec<IterationResult>, Box<dyn Error + Send + Sync>> {
        let outcomes = self
            .outcomes
            .get(request.node_id)
            .or_else(|| self.outcomes.get(request.node_name))
            .unwrap_or(&self.default);

        Ok(outcomes.iter().copied().map(IterationResult::new).collect())
    }
}
