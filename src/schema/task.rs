//! Final task-list item contract, ported from upstream's `TASK_SCHEMA`.
//!
//! Task `id`/`status` are not part of the agent's structured output — the
//! arbiter assigns them deterministically after parsing (see `arbiter.rs`).

use serde::{Deserialize, Serialize};

use super::{Complexity, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    pub title: String,
    pub description: String,
    pub issue_id: String,
    pub priority: Severity,
    pub complexity: Complexity,
    #[serde(default)]
    pub files_likely_affected: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_approach: Option<String>,
}
