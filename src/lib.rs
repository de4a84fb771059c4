// SPDX-License-Identifier: MIT

//! autoflow-rs - build, validate, lay out, run and export hardware test flows

pub mod bundle;
pub mod config;
pub mod error;
pub mod flow;
pub mod server;

pub use error::FlowError;
