// SPDX-License-Identifier: MIT

//! Flow graph model, builders and the engine that runs them
//!
//! Declarative input (descriptors, recipes) is turned into a [`FlowGraph`] by
//! the builders; validation, layout, execution and export all work on that
//! one graph model.

pub mod builder;
pub mod executor;
pub mod generate;
pub mod layout;
pub mod loader;
pub mod policy;
pub mod recipe;
pub mod runner;
pub mod types;
pub mod validator;

pub use builder::{build, NodeDescriptor};
pub use executor::{
    CancelFlag, ExecutionReport, ExecutorConfig, FlowExecutor, NodeVisit, Termination,
    TesterDefaults,
};
pub use layout::{apply_layout, layout, LayoutConfig};
pub use loader::{FlowDocument, FlowLoader};
pub use policy::{BranchPolicy, DeterminePort, Outcome};
pub use recipe::RecipeBuilder;
pub use runner::{ExperimentRequest, ExperimentRunner, IterationResult, ScriptedRunner};
pub use types::{
    Bindings, Connection, ExecutionMode, ExperimentBinding, FlowGraph, Node, NodeType, Port,
    Position, UnitConfig,
};
pub use validator::{validate, ValidationIssue, ValidationReport};
