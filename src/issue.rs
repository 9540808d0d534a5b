//! Issue record and status state machine (§3 Data Model, I4).
//!
//! Field layout follows upstream `schema_validator.py`'s `_ISSUE_REQUIRED_FIELDS`
//! plus the Phase-2 fingerprint/dedup fields; the status transition graph is
//! expressed the way the teacher's `debate/state.rs` expresses `DebatePhase`
//! (an enum with a `valid_transitions` table) rather than a bare string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the eight issue classifications the capture hook can assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Error,
    Warning,
    Failure,
    Regression,
    Performance,
    Design,
    Manual,
    Unknown,
}

impl IssueType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Failure => "failure",
            Self::Regression => "regression",
            Self::Performance => "performance",
            Self::Design => "design",
            Self::Manual => "manual",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        Some(match s {
            "error" => Self::Error,
            "warning" => Self::Warning,
            "failure" => Self::Failure,
            "regression" => Self::Regression,
            "performance" => Self::Performance,
            "design" => Self::Design,
            "manual" => Self::Manual,
            "unknown" => Self::Unknown,
            _ => return None,
        })
    }

    /// Coarse keyword classification, kept exactly as narrow as upstream's
    /// `_classify_error_type` (DESIGN.md Open Question (a) — not widened).
    pub fn classify(tool_name: &str, error_text: &str) -> Self {
        let lower = error_text.to_lowercase();
        if lower.contains("permission") || lower.contains("access denied") {
            return Self::Error;
        }
        if lower.contains("timeout") {
            return Self::Performance;
        }
        if lower.contains("not found") || lower.contains("no such file") {
            return Self::Error;
        }
        if lower.contains("syntax") || lower.contains("unexpected token") {
            return Self::Error;
        }
        if lower.contains("deprecated") {
            return Self::Warning;
        }
        if matches!(tool_name, "Bash" | "Execute") {
            return Self::Failure;
        }
        Self::Error
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline status, matching `_VALID_STATUSES`. Transitions only move
/// downstream except via explicit checkpoint clear (I4) — see
/// [`IssueStatus::valid_transitions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Captured,
    Researching,
    Researched,
    Debating,
    Debated,
    Converging,
    Converged,
    Resolved,
    Quarantined,
}

impl IssueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Captured => "captured",
            Self::Researching => "researching",
            Self::Researched => "researched",
            Self::Debating => "debating",
            Self::Debated => "debated",
            Self::Converging => "converging",
            Self::Converged => "converged",
            Self::Resolved => "resolved",
            Self::Quarantined => "quarantined",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        Some(match s {
            "captured" => Self::Captured,
            "researching" => Self::Researching,
            "researched" => Self::Researched,
            "debating" => Self::Debating,
            "debated" => Self::Debated,
            "converging" => Self::Converging,
            "converged" => Self::Converged,
            "resolved" => Self::Resolved,
            "quarantined" => Self::Quarantined,
            _ => return None,
        })
    }

    /// Forward transitions the pipeline itself drives. A fall-back to an
    /// earlier state (e.g. all research sub-workers failing, §4.13) is
    /// modeled as staying put, not as a transition — the orchestrator simply
    /// never calls `transition_to` in that case. `Quarantined` is reachable
    /// from any state on schema failure.
    pub fn valid_transitions(self) -> &'static [IssueStatus] {
        match self {
            Self::Captured => &[Self::Researching, Self::Quarantined],
            Self::Researching => &[Self::Researched, Self::Captured, Self::Quarantined],
            Self::Researched => &[Self::Debating, Self::Converging, Self::Quarantined],
            Self::Debating => &[Self::Debated, Self::Researched, Self::Quarantined],
            Self::Debated => &[Self::Converging, Self::Quarantined],
            Self::Converging => &[Self::Converged, Self::Quarantined],
            Self::Converged => &[Self::Resolved, Self::Quarantined],
            Self::Resolved => &[],
            Self::Quarantined => &[],
        }
    }

    pub fn can_transition_to(self, target: IssueStatus) -> bool {
        self.valid_transitions().contains(&target)
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("invalid status transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: IssueStatus,
    pub to: IssueStatus,
}

/// The central entity: a durable record of one observed tool failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub timestamp: DateTime<Utc>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub description: String,
    pub raw_error: String,
    pub tool_name: String,
    pub git_branch: String,
    pub recent_files: Vec<String>,
    pub working_directory: String,
    pub source: String,
    pub status: IssueStatus,
    pub fingerprint: String,
    pub occurrence_count: u64,
}

impl Issue {
    /// Attempt the state transition, rejecting any move `valid_transitions`
    /// does not name (I4).
    pub fn transition_to(&mut self, target: IssueStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(target) {
            return Err(TransitionError {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }
}

/// `issue_{YYYYMMDD}_{HHMMSS}_{random4}`, matching upstream `make_issue_id`.
///
/// Uses a v4 UUID's first 4 hex characters as the random suffix rather than
/// pulling in a `rand` dependency the teacher's stack doesn't already carry.
pub fn make_issue_id() -> String {
    let now = Utc::now();
    let date_part = now.format("%Y%m%d_%H%M%S");
    let rand_part: String = uuid::Uuid::new_v4().simple().to_string().chars().take(4).collect();
    format!("issue_{date_part}_{rand_part}")
}
