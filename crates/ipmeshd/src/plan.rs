//! Process plans published for the external supervisor, and the per-node
//! build report.

use crate::daemon::KillPattern;
use crate::error::NodeBuildError;
use ipmesh_lib::NodeId;
use serde::Serialize;
use std::path::PathBuf;

/// File name of the plan written at the root of the artifact directory.
pub const PLAN_FILE: &str = "plan.json";

/// How the supervisor runs one daemon.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSpec {
    pub kind: String,
    pub artifact_path: PathBuf,
    pub startup_line: String,
    pub dry_run: String,
    pub kill_patterns: Vec<KillPattern>,
}

/// Everything the supervisor needs for one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodePlan {
    pub node: NodeId,
    /// Network namespace the daemons run in.
    pub namespace: String,
    pub log_dir: PathBuf,
    /// Daemons in startup order.
    pub daemons: Vec<ProcessSpec>,
    pub shutdown_order: Vec<String>,
}

impl NodePlan {
    #[must_use]
    pub fn startup_order(&self) -> Vec<&str> {
        self.daemons.iter().map(|d| d.kind.as_str()).collect()
    }

    #[must_use]
    pub fn daemon(&self, kind: &str) -> Option<&ProcessSpec> {
        self.daemons.iter().find(|d| d.kind == kind)
    }
}

#[derive(Debug)]
pub enum NodeOutcome {
    Built(NodePlan),
    Failed(NodeBuildError),
}

#[derive(Debug)]
pub struct NodeReport {
    pub node: NodeId,
    pub outcome: NodeOutcome,
}

impl NodeReport {
    #[must_use]
    pub fn plan(&self) -> Option<&NodePlan> {
        match &self.outcome {
            NodeOutcome::Built(plan) => Some(plan),
            NodeOutcome::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&NodeBuildError> {
        match &self.outcome {
            NodeOutcome::Built(_) => None,
            NodeOutcome::Failed(err) => Some(err),
        }
    }
}

/// Outcome of every node of one run, ordered by node id.
#[derive(Debug, Default)]
pub struct BuildReport {
    nodes: Vec<NodeReport>,
}

impl BuildReport {
    #[must_use]
    pub fn new(mut nodes: Vec<NodeReport>) -> Self {
        nodes.sort_by(|a, b| a.node.cmp(&b.node));
        Self { nodes }
    }

    #[must_use]
    pub fn nodes(&self) -> &[NodeReport] {
        &self.nodes
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&NodeReport> {
        self.nodes.iter().find(|r| &r.node == id)
    }

    pub fn plans(&self) -> impl Iterator<Item = &NodePlan> {
        self.nodes.iter().filter_map(NodeReport::plan)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&NodeId, &NodeBuildError)> {
        self.nodes
            .iter()
            .filter_map(|r| r.error().map(|err| (&r.node, err)))
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigurationError;

    fn plan(node: &str) -> NodePlan {
        NodePlan {
            node: NodeId::from(node),
            namespace: node.to_owned(),
            log_dir: PathBuf::from("/var/tmp/log").join(node),
            daemons: Vec::new(),
            shutdown_order: Vec::new(),
        }
    }

    #[test]
    fn report_is_sorted_and_splits_outcomes() {
        let failed = NodeReport {
            node: NodeId::from("h1"),
            outcome: NodeOutcome::Failed(NodeBuildError::Configuration(
                ConfigurationError::MissingProperty {
                    node: NodeId::from("h1"),
                    kind: "openr".into(),
                    property: "an IPv4 network".into(),
                },
            )),
        };
        let built = NodeReport {
            node: NodeId::from("r1"),
            outcome: NodeOutcome::Built(plan("r1")),
        };
        let report = BuildReport::new(vec![built, failed]);

        let order: Vec<&str> = report.nodes().iter().map(|r| r.node.as_str()).collect();
        assert_eq!(order, ["h1", "r1"]);
        assert_eq!(report.plans().count(), 1);
        assert!(!report.is_success());
        assert!(report.node(&NodeId::from("h1")).and_then(NodeReport::error).is_some());
    }
}
