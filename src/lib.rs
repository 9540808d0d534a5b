//! Convergence Engine
//!
//! Observes tool failures inside a running development session, captures
//! and deduplicates them as issue records, dispatches independent research
//! agents, runs an adversarial debate pass over their findings, and
//! synthesizes the results into a prioritized task list plus a `CLAUDE.md`
//! knowledge section so future sessions inherit known fixes for free.
//!
//! # Pipeline
//!
//! ```text
//! capture (hook)  ->  research (parallel)  ->  debate  ->  converge
//! ```
//!
//! - [`issue`] / [`fingerprint`] / [`sanitizer`]: the data model, dedup key,
//!   and secret-stripping applied before anything is written or sent to an
//!   agent.
//! - [`store`] / [`checkpoint`]: the durable, lock-protected JSONL log and
//!   per-issue phase checkpoints that make every stage resumable.
//! - [`agent`] / [`phases`] / [`debate`]: the agent invocation contract and
//!   the research/debate workers built on it.
//! - [`pipeline`] / [`arbiter`]: the orchestrator that drives one issue
//!   through its phases, and the cross-issue synthesiser that produces the
//!   final convergence report and task list.
//! - [`knowledge_bridge`] / [`pattern_matcher`]: the `CLAUDE.md` writer and
//!   the pre-tool matcher that reads it back to short-circuit known errors.
//!
//! The four `src/bin/*` entry points wire these modules to the hook
//! lifecycle (`PostToolUseFailure`, `PreToolUse`, `SessionEnd`) and an
//! operator-facing CLI.

#![allow(dead_code)]
#![allow(clippy::uninlined_format_args)]

pub mod agent;
pub mod arbiter;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod issue;
pub mod knowledge_bridge;
pub mod logging;
pub mod pattern_matcher;
pub mod phases;
pub mod pipeline;
pub mod sanitizer;
pub mod schema;
pub mod store;

pub mod debate;

pub use arbiter::{ArbiterError, ConvergenceOutcome, Task};
pub use checkpoint::{Checkpoint, CheckpointStore, Phase, PhaseStatus};
pub use config::Config;
pub use error::{LockError, StoreError, StoreResult};
pub use fingerprint::{compute_fingerprint, find_duplicate, normalize_error_message};
pub use issue::{make_issue_id, Issue, IssueStatus, IssueType};
pub use pipeline::{PipelineError, PipelineResult, PipelineStatus, ResearchResults, RunOutcome};
