//! Agent invocation contract (C6): an agent is an opaque
//! `prompt -> (markdown, optional structured JSON)` function subject to
//! timeout and failure, backed either by a real `claude -p` subprocess or,
//! in sandbox mode, a deterministic mock.

pub mod invoker;
pub mod mock;

use serde_json::Value;
use thiserror::Error;

use crate::schema::{extract_markdown_output, extract_json_output};

/// Which pipeline stage this invocation belongs to — selects a model from
/// `budget.model_map` and, in sandbox mode, which mock family to return.
/// This is deliberately narrower than [`mock::AgentRole`]: upstream's
/// `stage` parameter conflated "which model config applies" (3-way: research
/// /debate/converge) with "which mock response to return" (5-way, by agent
/// role) under one string. Keeping them distinct avoids that ambiguity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Research,
    Debate,
    Converge,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Debate => "debate",
            Self::Converge => "converge",
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent subprocess exited with status {0}: {1}")]
    NonZeroExit(i32, String),
    #[error("claude CLI not found in PATH")]
    BinaryNotFound,
    #[error("agent timed out after {0}s")]
    Timeout(u64),
    #[error("io error spawning agent subprocess: {0}")]
    Io(#[from] std::io::Error),
}

/// The outcome of one agent invocation. A failed run still carries
/// `raw_output == ""` and `structured == None`, matching upstream's
/// `AgentResult`.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub ok: bool,
    pub raw_output: String,
    pub structured: Option<Value>,
    pub error: Option<String>,
    pub timed_out: bool,
}

impl AgentResult {
    pub fn success(raw_output: String) -> Self {
        let structured = extract_json_output(&raw_output);
        Self {
            ok: true,
            raw_output,
            structured,
            error: None,
            timed_out: false,
        }
    }

    pub fn failure(error: impl Into<String>, timed_out: bool) -> Self {
        Self {
            ok: false,
            raw_output: String::new(),
            structured: None,
            error: Some(error.into()),
            timed_out,
        }
    }

    /// Just the markdown portion of `raw_output`, stripping the JSON block.
    pub fn markdown_output(&self) -> String {
        extract_markdown_output(&self.raw_output)
    }
}
