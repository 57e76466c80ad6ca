//! Dry-run validation of written artifacts.
//!
//! Each daemon's dry-run command parses its artifact and exits. The quoted
//! command line is split back into its arguments and executed directly,
//! never through a shell, with a time limit. A failure is reported for the
//! node it belongs to and never affects other nodes.

use crate::error::ValidationError;
use crate::plan::{NodePlan, ProcessSpec};
use ipmesh_lib::NodeId;
use shell_words::split;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Run one dry-run command.
///
/// # Errors
///
/// Returns [`ValidationError`] when the command is malformed or cannot be
/// started, exits unsuccessfully or outlives `timeout`.
pub async fn dry_run(
    node: &NodeId,
    spec: &ProcessSpec,
    timeout: Duration,
) -> Result<(), ValidationError> {
    let malformed = |reason: String| ValidationError::Command {
        node: node.clone(),
        kind: spec.kind.clone(),
        command: spec.dry_run.clone(),
        reason,
    };
    let args = split(&spec.dry_run).map_err(|err| malformed(err.to_string()))?;
    let Some((program, rest)) = args.split_first() else {
        return Err(malformed("empty command".to_owned()));
    };
    let mut cmd = Command::new(program);
    cmd.args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(res) => res.map_err(|source| ValidationError::Spawn {
            node: node.clone(),
            kind: spec.kind.clone(),
            command: spec.dry_run.clone(),
            source,
        })?,
        Err(_) => {
            return Err(ValidationError::Timeout {
                node: node.clone(),
                kind: spec.kind.clone(),
                secs: timeout.as_secs(),
            });
        }
    };

    if output.status.success() {
        tracing::debug!(node = %node, kind = %spec.kind, "dry run passed");
        Ok(())
    } else {
        Err(ValidationError::Failed {
            node: node.clone(),
            kind: spec.kind.clone(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

/// Dry-run every daemon of a node in startup order, stopping at the first
/// failure.
///
/// # Errors
///
/// See [`dry_run`].
pub async fn validate_plan(plan: &NodePlan, timeout: Duration) -> Result<(), ValidationError> {
    for spec in &plan.daemons {
        dry_run(&plan.node, spec, timeout).await?;
    }
    Ok(())
}
