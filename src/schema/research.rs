//! Root-cause, solution, and impact agent output contracts.
//!
//! Ported from upstream's `RESEARCHER_SCHEMA`, `SOLUTION_SCHEMA`,
//! `SOLUTION_ITEM_SCHEMA`, and `IMPACT_SCHEMA`. Field presence/type checking
//! and enum-membership checking collapse into one thing here: `serde`'s
//! derived `Deserialize` already rejects a missing required field or an
//! out-of-enum string at parse time, so a structured agent response either
//! parses into one of these types or it doesn't.

use serde::{Deserialize, Serialize};

use super::{Confidence, Frequency, Scope};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearcherOutput {
    pub hypothesis: String,
    pub evidence: Vec<String>,
    pub confidence: Confidence,
    pub confidence_reasoning: String,
    #[serde(default)]
    pub related_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolutionTradeoffs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_effects: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionItem {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tradeoffs: Option<SolutionTradeoffs>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionOutput {
    pub solutions: Vec<SolutionItem>,
    pub recommended_index: i64,
    pub recommendation_reasoning: String,
    pub implementation_steps: Vec<String>,
}

impl SolutionOutput {
    /// The one structural check `serde`'s type system can't express: the
    /// recommended index must point inside the solutions list.
    pub fn validate(&self) -> Result<(), String> {
        if self.solutions.is_empty() {
            return Ok(());
        }
        if self.recommended_index < 0 || self.recommended_index as usize >= self.solutions.len() {
            return Err(format!(
                "recommended_index {} out of range (0-{})",
                self.recommended_index,
                self.solutions.len() - 1
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactOutput {
    pub severity: super::Severity,
    pub severity_reasoning: String,
    pub scope: Scope,
    pub scope_detail: String,
    pub frequency: Frequency,
    #[serde(default)]
    pub frequency_detail: Option<String>,
    pub priority: super::ActionPriority,
    pub priority_reasoning: String,
}
