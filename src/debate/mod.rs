//! Adversarial debate (C7.4) and disagreement metrics (C8).
//!
//! Runs a two-round, three-perspective (analyst / devil's advocate /
//! sceptic) pass over a single issue's research artefacts, synthesising a
//! revised root cause and fix, and scores the debate's own disagreement
//! (challenge survival rate, concern severity, confidence delta, kappa).

pub mod debater;
pub mod metrics;

pub use debater::{debate_issue, DebateOutcome};
pub use metrics::{compute_debate_metrics, DebateMetrics, FindingCounts};
