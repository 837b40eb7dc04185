//! Contract envelope: the one-shot JSON payload handed to a freshly spawned
//! worker over stdin, and the heredoc composer that injects it into a pane.

use std::path::Path;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Fixed sentinel delimiter. A collision with task/agent content is checked
/// defensively rather than generating a unique delimiter per invocation —
/// the contract's own fields never legitimately contain this token.
pub const CONTRACT_DELIMITER: &str = "VILLAGE_CONTRACT_EOF";

#[derive(Debug, Clone, Serialize)]
pub struct ContractEnvelope {
    pub task_id: String,
    pub agent: String,
    pub worktree_path: String,
    pub git_root: String,
    pub window_name: String,
    pub claimed_at: DateTime<Utc>,
}

impl ContractEnvelope {
    pub fn new(
        task_id: &str,
        agent: &str,
        worktree_path: &Path,
        git_root: &Path,
        window_name: &str,
        claimed_at: DateTime<Utc>,
    ) -> Self {
        ContractEnvelope {
            task_id: task_id.to_string(),
            agent: agent.to_string(),
            worktree_path: worktree_path.display().to_string(),
            git_root: git_root.display().to_string(),
            window_name: window_name.to_string(),
            claimed_at,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Compose the heredoc that starts the worker's agent binary and feeds it
/// the contract over stdin, verifying none of the envelope's own fields
/// happen to contain the delimiter (which would terminate the heredoc early).
pub fn compose_heredoc(agent_command: &str, contract: &ContractEnvelope) -> Result<String> {
    let json = contract.to_json()?;
    if json.contains(CONTRACT_DELIMITER) {
        bail!("contract payload collides with heredoc delimiter '{CONTRACT_DELIMITER}'");
    }
    Ok(format!("{agent_command} <<'{CONTRACT_DELIMITER}'\n{json}\n{CONTRACT_DELIMITER}"))
}
