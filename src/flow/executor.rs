//! Flow executor
//!
//! Walks a [`FlowGraph`] one node at a time. Each non-start node's experiments
//! are handed to the [`ExperimentRunner`], the node's branch policy maps the
//! outcomes to a port, and the connection on that port picks the next node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::policy::{DeterminePort, Outcome};
use super::runner::{ExperimentRequest, ExperimentRunner};
use super::types::{Bindings, ExecutionMode, FlowGraph, Node, NodeType, Port};
use crate::error::ExecutionError;

/// Tester parameters forwarded to the collaborator with every request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TesterDefaults {
    pub after_mrc_post: u32,
    pub efi_post: u32,
    pub linux_post: u32,
    pub bootscript_retry_times: u32,
    /// Seconds
    pub bootscript_retry_delay: u32,
    pub mrc_postcode_wt: u32,
    pub efi_postcode_wt: u32,
    pub mrc_postcode_check_count: u32,
    pub efi_postcode_check_count: u32,
    pub boot_stop_postcode: u32,
    pub boot_postcode_wt: u32,
    pub boot_postcode_check_count: u32,
}

impl Default for TesterDefaults {
    fn default() -> Self {
        Self {
            after_mrc_post: 0xbf00_0000,
            efi_post: 0xef00_00ff,
            linux_post: 0x5800_0000,
            bootscript_retry_times: 3,
            bootscript_retry_delay: 60,
            mrc_postcode_wt: 30,
            efi_postcode_wt: 60,
            mrc_postcode_check_count: 5,
            efi_postcode_check_count: 10,
            boot_stop_postcode: 0,
            boot_postcode_wt: 30,
            boot_postcode_check_count: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Upper bound on node visits per run; cyclic flows stop here
    pub max_steps: usize,
    pub tester: TesterDefaults,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            tester: TesterDefaults::default(),
        }
    }
}

/// Cooperative cancellation, checked before every node visit
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a run stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "node_type")]
pub enum Termination {
    /// Reached an EndPass / EndFail / EndAbort node
    Terminal(NodeType),
    /// Reached a node with no outgoing connections
    DeadEnd,
    Cancelled,
}

/// One node visit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeVisit {
    pub node_id: String,
    pub node_name: String,
    pub outcomes: Vec<Outcome>,
    /// Port chosen on leaving the node; None for terminals and dead ends
    pub port: Option<Port>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub start: String,
    pub visits: Vec<NodeVisit>,
    pub termination: Termination,
    /// Id of the node the run stopped on
    pub final_node: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionReport {
    /// Ids of the visited nodes in order
    pub fn path(&self) -> Vec<&str> {
        self.visits.iter().map(|v| v.node_id.as_str()).collect()
    }

    pub fn passed(&self) -> bool {
        self.termination == Termination::Terminal(NodeType::EndPass)
    }
}

enum RunState<'g> {
    Running(&'g Node),
    Terminated(Termination),
}

pub struct FlowExecutor {
    runner: Arc<dyn ExperimentRunner>,
    config: ExecutorConfig,
    cancel: CancelFlag,
}

impl FlowExecutor {
    pub fn new(runner: Arc<dyn ExperimentRunner>, config: ExecutorConfig) -> Self {
        Self {
            runner,
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// Share an externally owned cancellation flag
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run the flow from `start_id` until it terminates
    pub async fn execute(
        &self,
        graph: &FlowGraph,
        bindings: &Bindings,
        start_id: &str,
    ) -> Result<ExecutionReport, ExecutionError> {
        let start = graph
            .node(start_id)
            .ok_or_else(|| ExecutionError::UnknownStartNode(start_id.to_string()))?;

        let started_at = Utc::now();
        let mut visits = Vec::new();
        let mut current = start;
        let mut steps = 0;

        log::info!("Executing flow from {} ({})", start.name, start.id);

        let termination = loop {
            if self.cancel.is_cancelled() {
                log::warn!("Flow execution cancelled before node {}", current.id);
                break Termination::Cancelled;
            }

            steps += 1;
            if steps > self.config.max_steps {
                log::error!(
                    "Flow execution exceeded max steps ({})",
                    self.config.max_steps
                );
                return Err(ExecutionError::StepLimitExceeded(self.config.max_steps));
            }

            match self.step(graph, bindings, current, &mut visits).await? {
                RunState::Running(next) => current = next,
                RunState::Terminated(reason) => break reason,
            }
        };

        log::info!("Flow finished on {}: {:?}", current.id, termination);

        Ok(ExecutionReport {
            start: start.id.clone(),
            visits,
            termination,
            final_node: current.id.clone(),
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn step<'g>(
        &self,
        graph: &'g FlowGraph,
        bindings: &Bindings,
        node: &'g Node,
        visits: &mut Vec<NodeVisit>,
    ) -> Result<RunState<'g>, ExecutionError> {
        log::info!("Executing node: {} ({})", node.name, node.id);

        if node.node_type.is_terminal() {
            visits.push(NodeVisit {
                node_id: node.id.clone(),
                node_name: node.name.clone(),
                outcomes: Vec::new(),
                port: None,
            });
            return Ok(RunState::Terminated(Termination::Terminal(node.node_type)));
        }

        let (outcomes, port) = if node.node_type.is_start() {
            let port = graph
                .connection_on(&node.id, &Port::pass())
                .or_else(|| graph.outgoing(&node.id).next())
                .map(|c| c.port.clone())
                .unwrap_or_else(Port::pass);
            (Vec::new(), port)
        } else {
            let outcomes = self.run_node(node, bindings).await?;
            let port = Port::from_index(node.policy.determine_port(&outcomes));
            log::info!("Node {} outcomes {:?} -> port {}", node.id, outcomes, port);
            (outcomes, port)
        };

        if graph.outgoing(&node.id).next().is_none() {
            log::warn!("Node {} has no outgoing connections, stopping", node.id);
            visits.push(NodeVisit {
                node_id: node.id.clone(),
                node_name: node.name.clone(),
                outcomes,
                port: None,
            });
            return Ok(RunState::Terminated(Termination::DeadEnd));
        }

        let connection = match graph.connection_on(&node.id, &port) {
            Some(c) => c,
            None => {
                log::error!("No handler for port {} on node {}", port, node.id);
                return Err(ExecutionError::NoHandlerForPort {
                    node: node.id.clone(),
                    port: port.to_string(),
                });
            }
        };

        visits.push(NodeVisit {
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            outcomes,
            port: Some(port),
        });

        graph
            .node(&connection.to)
            .map(RunState::Running)
            .ok_or_else(|| ExecutionError::UnknownNode(connection.to.clone()))
    }

    async fn run_node(
        &self,
        node: &Node,
        bindings: &Bindings,
    ) -> Result<Vec<Outcome>, ExecutionError> {
        let binding = bindings.get(&node.id);
        let request = ExperimentRequest {
            node_id: &node.id,
            node_name: &node.name,
            experiment: node.experiment.as_deref(),
            payloads: binding.map(|b| b.experiments.as_slice()).unwrap_or_default(),
            mode: binding.map(|b| b.mode).unwrap_or(ExecutionMode::Sequential),
            overrides: &self.config.tester,
        };

        let results = self
            .runner
            .run_experiment(&request)
            .await
            .map_err(|source| ExecutionError::Collaborator {
                node: node.id.clone(),
                source,
            })?;

        Ok(results.into_iter().map(|r| r.status).collect())
    }
}
