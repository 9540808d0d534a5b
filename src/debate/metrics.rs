//! Quantitative disagreement metrics over adversarial debate output (C8).
//!
//! Ported verbatim from `agents/debate_metrics.py`'s
//! `compute_challenge_survival_rate` / `compute_skeptic_severity_score` /
//! `compute_confidence_delta` / `compute_agreement_kappa` /
//! `compute_debate_metrics`, retargeted onto the typed
//! [`crate::schema::debate::DebateOutput`] rather than a loose dict.

use serde::{Deserialize, Serialize};

use crate::schema::debate::DebateOutput;
use crate::schema::Confidence;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingCounts {
    pub agreements: usize,
    pub contradictions: usize,
    pub gaps: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateMetrics {
    pub challenge_survival_rate: Option<f64>,
    pub challenge_count: usize,
    pub challenges_survived: usize,
    pub skeptic_severity_score: Option<f64>,
    pub skeptic_concern_count: usize,
    pub confidence_delta: Option<i8>,
    pub confidence_before: Confidence,
    pub confidence_after: Confidence,
    pub agreement_kappa: Option<f64>,
    pub finding_counts: FindingCounts,
    /// Passthrough of `DebateOutput::dissent_notes` — not aggregated, just
    /// carried alongside the computed metrics (§4.8 "dissent notes passthrough").
    pub dissent_notes: Vec<String>,
}

/// Assumed pre-debate confidence when the root-cause artefact is missing or
/// its `confidence` field failed to parse — the original's hardcoded
/// fallback, since pre-debate confidence has no other recorded source.
const FALLBACK_PRE_CONFIDENCE: Confidence = Confidence::Medium;

fn challenge_survival_rate(debate: &DebateOutput) -> Option<f64> {
    debate.challenge_survival_rate()
}

fn skeptic_severity_score(debate: &DebateOutput) -> Option<f64> {
    debate.mean_concern_severity()
}

fn confidence_delta(pre: Confidence, post: Confidence) -> i8 {
    post.ordinal() - pre.ordinal()
}

/// Simplified chance-corrected agreement: `(A - E) / (T - E)` where
/// `E = T / 3` is the expected agreement count under random assignment
/// across three finding buckets, clamped to `[-1, 1]`.
fn agreement_kappa(agreements: usize, contradictions: usize, gaps: usize) -> Option<f64> {
    let total = (agreements + contradictions + gaps) as f64;
    if total == 0.0 {
        return None;
    }
    let expected = total / 3.0;
    if total == expected {
        return Some(0.0);
    }
    let kappa = (agreements as f64 - expected) / (total - expected);
    Some(kappa.clamp(-1.0, 1.0))
}

/// Compute all debate-quality metrics from a validated debate output.
///
/// `pre_confidence` should come from the issue's `root_cause.json` artefact
/// when it parsed successfully; pass `None` to fall back to the documented
/// "medium" baseline.
pub fn compute_debate_metrics(debate: &DebateOutput, pre_confidence: Option<Confidence>) -> DebateMetrics {
    let pre = pre_confidence.unwrap_or(FALLBACK_PRE_CONFIDENCE);
    let post = debate.confidence_after_debate;

    DebateMetrics {
        challenge_survival_rate: challenge_survival_rate(debate),
        challenge_count: debate.devil_advocate_challenges.len(),
        challenges_survived: debate.devil_advocate_challenges.iter().filter(|c| c.survived).count(),
        skeptic_severity_score: skeptic_severity_score(debate),
        skeptic_concern_count: debate.skeptic_concerns.len(),
        confidence_delta: Some(confidence_delta(pre, post)),
        confidence_before: pre,
        confidence_after: post,
        agreement_kappa: agreement_kappa(
            debate.agreements.len(),
            debate.contradictions.len(),
            debate.gaps.len(),
        ),
        finding_counts: FindingCounts {
            agreements: debate.agreements.len(),
            contradictions: debate.contradictions.len(),
            gaps: debate.gaps.len(),
        },
        dissent_notes: debate.dissent_notes.clone(),
    }
}
