// SPDX-License-Identifier: MIT

//! Branch policies
//!
//! A branch policy turns the outcomes of one node visit into an output port
//! index. Port 0 follows the `FAIL` connection, port 1 the `PASS` connection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Port index of the `FAIL` connection
pub const FAIL_PORT: u32 = 0;
/// Port index of the `PASS` connection
pub const PASS_PORT: u32 = 1;

/// Result of one experiment iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Outcome {
    #[serde(rename = "PASS", alias = "pass", alias = "Pass")]
    Pass,
    #[serde(rename = "FAIL", alias = "fail", alias = "Fail")]
    Fail,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => f.write_str("PASS"),
            Outcome::Fail => f.write_str("FAIL"),
        }
    }
}

/// Anything that can pick an output port from a sequence of outcomes
pub trait DeterminePort {
    fn determine_port(&self, outcomes: &[Outcome]) -> u32;
}

/// Rule by which a node's outcomes select its output port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
pub enum BranchPolicy {
    /// Fail if any iteration failed
    #[default]
    #[serde(alias = "SingleFailFlowInstance")]
    SingleFail,
    /// Fail only if every iteration failed
    #[serde(alias = "AllFailFlowInstance")]
    AllFail,
    /// Fail if at least half of the iterations failed
    #[serde(alias = "MajorityFailFlowInstance")]
    MajorityFail,
}

impl BranchPolicy {
    pub fn is_default(&self) -> bool {
        *self == BranchPolicy::default()
    }

    /// Map a recipe `instanceType` class name to its policy
    pub fn from_instance_type(instance_type: &str) -> Option<Self> {
        match instance_type {
            "SingleFailFlowInstance" => Some(BranchPolicy::SingleFail),
            "AllFailFlowInstance" => Some(BranchPolicy::AllFail),
            "MajorityFailFlowInstance" => Some(BranchPolicy::MajorityFail),
            _ => None,
        }
    }
}

impl DeterminePort for BranchPolicy {
    fn determine_port(&self, outcomes: &[Outcome]) -> u32 {
        // No iterations means no observed failure
        if outcomes.is_empty() {
            return PASS_PORT;
        }

        let fails = outcomes.iter().filter(|o| **o == Outcome::Fail).count();
        let take_fail = match self {
            BranchPolicy::SingleFail => fails > 0,
            BranchPolicy::AllFail => fails == outcomes.len(),
            BranchPolicy::MajorityFail => fails * 2 >= outcomes.len(),
        };

        if take_fail {
            FAIL_PORT
        } else {
            PASS_PORT
        }
    }
}

impl fmt::Display for BranchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchPolicy::SingleFail => f.write_str("SingleFail"),
            BranchPolicy::AllFail => f.write_str("AllFail"),
            BranchPolicy::MajorityFail => f.write_str("MajorityFail"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::Outcome::{Fail, Pass};

    #[test]
    fn test_single_fail() {
        let policy = BranchPolicy::SingleFail;
        assert_eq!(policy.determine_port(&[Pass, Pass]), PASS_PORT);
        assert_eq!(policy.determine_port(&[Pass, Pass, Fail]), FAIL_PORT);
        assert_eq!(policy.determine_port(&[Fail]), FAIL_PORT);
    }

    #[test]
    fn test_all_fail() {
        let policy = BranchPolicy::AllFail;
        assert_eq!(policy.determine_port(&[Pass, Pass, Fail]), PASS_PORT);
        assert_eq!(policy.determine_port(&[Fail, Fail]), FAIL_PORT);
    }

    #[test]
    fn test_majority_fail() {
        let policy = BranchPolicy::MajorityFail;
        // 1 of 3 is below half
        assert_eq!(policy.determine_port(&[Pass, Pass, Fail]), PASS_PORT);
        // exactly half counts as failing
        assert_eq!(policy.determine_port(&[Pass, Fail]), FAIL_PORT);
        assert_eq!(policy.determine_port(&[Fail, Fail, Pass]), FAIL_PORT);
    }

    #[test]
    fn test_empty_outcomes_take_pass() {
        for policy in [
            BranchPolicy::SingleFail,
            BranchPolicy::AllFail,
            BranchPolicy::MajorityFail,
        ] {
            assert_eq!(policy.determine_port(&[]), PASS_PORT);
        }
    }

    #[test]
    fn test_policy_serde_aliases() {
        let p: BranchPolicy = serde_json::from_str("\"MajorityFailFlowInstance\"").unwrap();
        assert_eq!(p, BranchPolicy::MajorityFail);
        let o: Outcome = serde_json::from_str("\"fail\"").unwrap();
        assert_eq!(o, Fail);
        assert_eq!(serde_json::to_string(&Pass).unwrap(), "\"PASS\"");
    }

    #[test]
    fn test_from_instance_type() {
        assert_eq!(
            BranchPolicy::from_instance_type("AllFailFlowInstance"),
            Some(BranchPolicy::AllFail)
        );
        assert_eq!(BranchPolicy::from_instance_type("AdaptiveFlowInstance"), None);
    }
}
