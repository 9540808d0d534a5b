//! The three non-adversarial research workers (C7, roles 1-3): root-cause,
//! solution, and impact assessment. Each loads the issue record, builds a
//! role-specific prompt, dispatches through the agent invoker, and writes a
//! markdown artifact plus a validated structured sibling.
//!
//! Grounded on `agents/researcher.py`, `agents/solution_finder.py`, and
//! `agents/impact_assessor.py`; the structured-sidecar write is upstream's own
//! `runner.py::write_research_json` helper, wired into each call site (the
//! original defines it but never actually invokes it from these three
//! scripts — the spec's "validated structured artifact" requirement is what
//! this crate adds by actually calling it).

pub mod impact_assessor;
pub mod researcher;
pub mod solution_finder;

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::agent::AgentError;

#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("agent invocation failed: {0}")]
    AgentFailed(String),
    #[error("agent timed out")]
    AgentTimedOut,
    #[error("agent produced no structured output")]
    MissingStructuredOutput,
    #[error("structured output failed schema validation: {0}")]
    SchemaInvalid(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AgentError> for PhaseError {
    fn from(err: AgentError) -> Self {
        PhaseError::AgentFailed(err.to_string())
    }
}

pub(crate) fn write_markdown(research_dir: &Path, filename: &str, content: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(research_dir)?;
    std::fs::write(research_dir.join(filename), content)
}

pub(crate) fn write_json<T: Serialize>(
    research_dir: &Path,
    filename: &str,
    data: &T,
) -> std::io::Result<()> {
    std::fs::create_dir_all(research_dir)?;
    let text = serde_json::to_string_pretty(data)?;
    std::fs::write(research_dir.join(filename), text)
}

pub(crate) fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}
