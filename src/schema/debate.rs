//! Adversarial debate output contract (C7.4 schema half of C4).
//!
//! The original `DEBATE_SCHEMA` only carried `agreements` / `contradictions`
//! / `gaps` / `revised_root_cause` / `revised_fix` / `revised_priority` — a
//! single-perspective debate predating the adversarial design this crate
//! implements. This is the superset: it keeps all six original fields and
//! adds `devil_advocate_challenges`, `skeptic_concerns`, and
//! `confidence_after_debate` for the analyst/devil's-advocate/sceptic
//! three-perspective round described alongside the debater itself.

use serde::{Deserialize, Serialize};

use super::{Confidence, ConcernSeverity, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub description: String,
    pub better_supported: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub claim: String,
    pub challenge: String,
    pub survived: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concern {
    pub concern: String,
    pub severity: ConcernSeverity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateOutput {
    pub agreements: Vec<String>,
    pub contradictions: Vec<Contradiction>,
    pub gaps: Vec<String>,
    pub revised_root_cause: String,
    pub revised_fix: String,
    pub revised_priority: Severity,
    #[serde(default)]
    pub devil_advocate_challenges: Vec<Challenge>,
    #[serde(default)]
    pub skeptic_concerns: Vec<Concern>,
    pub confidence_after_debate: Confidence,
    /// Free-form notes on unresolved disagreement the agent chose to flag
    /// explicitly, passed through to [`crate::debate::metrics::DebateMetrics`]
    /// unmodified.
    #[serde(default)]
    pub dissent_notes: Vec<String>,
}

impl DebateOutput {
    /// Fraction of devil's-advocate challenges the revised position survived,
    /// or `None` when no challenges were raised (C8's `challenge_survival_rate`
    /// is left null in that case rather than reported as a vacuous 1.0).
    pub fn challenge_survival_rate(&self) -> Option<f64> {
        if self.devil_advocate_challenges.is_empty() {
            return None;
        }
        let survived = self
            .devil_advocate_challenges
            .iter()
            .filter(|c| c.survived)
            .count();
        Some(survived as f64 / self.devil_advocate_challenges.len() as f64)
    }

    /// Weighted mean of sceptic concern severities (weights per C4's
    /// `{low: 0.25, medium: 0.5, high: 1.0}` table), or `None` with no concerns.
    pub fn mean_concern_severity(&self) -> Option<f64> {
        if self.skeptic_concerns.is_empty() {
            return None;
        }
        let total: f64 = self.skeptic_concerns.iter().map(|c| c.severity.weight()).sum();
        Some(total / self.skeptic_concerns.len() as f64)
    }
}
