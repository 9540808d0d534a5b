//! Deterministic sandbox responses (one literal per agent role), ported from
//! upstream's `_default_mock_response`. Each embeds a `===JSON_OUTPUT===`
//! block designed to pass its role's schema validator, so sandbox-mode runs
//! exercise the same parse/validate path as a real agent response.
//!
//! Named by *agent role*, not pipeline [`super::Stage`] — see the note on
//! `Stage` for why these are kept as two distinct concepts.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Researcher,
    SolutionFinder,
    ImpactAssessor,
    Debater,
    Arbiter,
}

impl AgentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Researcher => "researcher",
            Self::SolutionFinder => "solution_finder",
            Self::ImpactAssessor => "impact_assessor",
            Self::Debater => "debater",
            Self::Arbiter => "arbiter",
        }
    }
}

pub fn default_mock_response(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Researcher => RESEARCHER_MOCK,
        AgentRole::SolutionFinder => SOLUTION_MOCK,
        AgentRole::ImpactAssessor => IMPACT_MOCK,
        AgentRole::Debater => DEBATE_MOCK,
        AgentRole::Arbiter => CONVERGE_MOCK,
    }
}

const RESEARCHER_MOCK: &str = concat!(
    "## Hypothesis\n",
    "The error appears to be caused by a missing dependency.\n\n",
    "## Evidence\n",
    "Stack trace indicates import failure at module initialization.\n\n",
    "## Confidence\n",
    "medium\n\n",
    "## Related Patterns\n",
    "Similar to dependency resolution issues seen in Node.js projects.\n\n",
    "===JSON_OUTPUT===\n",
    "{\n",
    "  \"hypothesis\": \"The error appears to be caused by a missing dependency.\",\n",
    "  \"evidence\": [\"Stack trace indicates import failure at module initialization.\"],\n",
    "  \"confidence\": \"medium\",\n",
    "  \"confidence_reasoning\": \"Error message clearly indicates missing module, but root package unclear.\",\n",
    "  \"related_patterns\": [\"dependency resolution\", \"Node.js import failures\"]\n",
    "}\n",
    "===JSON_OUTPUT_END===",
);

const SOLUTION_MOCK: &str = concat!(
    "## Solution 1\n",
    "Install the missing dependency via package manager.\n",
    "**Tradeoffs:** Simple fix, low risk.\n\n",
    "## Solution 2\n",
    "Refactor to remove the dependency entirely.\n",
    "**Tradeoffs:** More work, but reduces future dependency issues.\n\n",
    "## Recommended Approach\n",
    "Solution 1 for immediate fix, consider Solution 2 for long-term.\n\n",
    "## Implementation Steps\n",
    "1. Identify the exact missing package\n",
    "2. Add to package.json\n",
    "3. Run install\n",
    "4. Verify fix\n\n",
    "===JSON_OUTPUT===\n",
    "{\n",
    "  \"solutions\": [\n",
    "    {\"title\": \"Install missing dependency\", \"description\": \"Install the missing dependency via package manager.\", \"tradeoffs\": {\"risk\": \"low\", \"complexity\": \"low\", \"side_effects\": \"none\"}},\n",
    "    {\"title\": \"Remove dependency\", \"description\": \"Refactor to remove the dependency entirely.\", \"tradeoffs\": {\"risk\": \"medium\", \"complexity\": \"high\", \"side_effects\": \"requires code changes\"}}\n",
    "  ],\n",
    "  \"recommended_index\": 0,\n",
    "  \"recommendation_reasoning\": \"Solution 1 for immediate fix, consider Solution 2 for long-term.\",\n",
    "  \"implementation_steps\": [\"Identify the exact missing package\", \"Add to package.json\", \"Run install\", \"Verify fix\"]\n",
    "}\n",
    "===JSON_OUTPUT_END===",
);

const IMPACT_MOCK: &str = concat!(
    "## Severity\n",
    "P2 - Blocks specific functionality but not entire system.\n\n",
    "## Scope\n",
    "Module-level -- affects one feature area.\n\n",
    "## Frequency\n",
    "First occurrence in this session.\n\n",
    "## Priority Recommendation\n",
    "Fix during current development session to prevent cascade.\n\n",
    "===JSON_OUTPUT===\n",
    "{\n",
    "  \"severity\": \"P2\",\n",
    "  \"severity_reasoning\": \"Blocks specific functionality but not entire system.\",\n",
    "  \"scope\": \"module\",\n",
    "  \"scope_detail\": \"Affects one feature area.\",\n",
    "  \"frequency\": \"first\",\n",
    "  \"frequency_detail\": \"First occurrence in this session.\",\n",
    "  \"priority\": \"now\",\n",
    "  \"priority_reasoning\": \"Fix during current development session to prevent cascade.\"\n",
    "}\n",
    "===JSON_OUTPUT_END===",
);

// Extended relative to upstream's single-round mock: adds
// `devil_advocate_challenges` / `skeptic_concerns` / `confidence_after_debate`
// so sandbox runs exercise the superset debate schema (§4.4/§4.8), not the
// original's narrower six-field one.
const DEBATE_MOCK: &str = concat!(
    "## Agreements\n",
    "All agents agree the root cause is a missing dependency.\n\n",
    "## Contradictions\n",
    "None significant.\n\n",
    "## Gaps\n",
    "No agent checked if this dependency was intentionally removed.\n\n",
    "## Devil's Advocate\n",
    "Challenged whether the missing dependency is really the root cause.\n\n",
    "## Sceptic\n",
    "Flagged that the fix hasn't been verified under a clean install.\n\n",
    "## Revised Assessment\n",
    "High confidence: reinstall the dependency as the primary fix.\n\n",
    "===JSON_OUTPUT===\n",
    "{\n",
    "  \"agreements\": [\"Root cause is a missing dependency\"],\n",
    "  \"contradictions\": [],\n",
    "  \"gaps\": [\"No agent checked if dependency was intentionally removed\"],\n",
    "  \"revised_root_cause\": \"Missing dependency due to incomplete package.json\",\n",
    "  \"revised_fix\": \"Reinstall the dependency via npm install\",\n",
    "  \"revised_priority\": \"P2\",\n",
    "  \"devil_advocate_challenges\": [\n",
    "    {\"claim\": \"Missing dependency is the root cause\", \"challenge\": \"Could be a stale lockfile instead\", \"survived\": true}\n",
    "  ],\n",
    "  \"skeptic_concerns\": [\n",
    "    {\"concern\": \"Fix not verified under a clean install\", \"severity\": \"medium\"}\n",
    "  ],\n",
    "  \"confidence_after_debate\": \"high\",\n",
    "  \"dissent_notes\": []\n",
    "}\n",
    "===JSON_OUTPUT_END===",
);

const CONVERGE_MOCK: &str = concat!(
    "===CONVERGENCE_REPORT===\n\n",
    "# Convergence Report\n\n",
    "## Session Summary\n",
    "Issues analyzed: 1 | Resolved: 0 | Pending: 1\n\n",
    "### Issue: issue_mock\n",
    "- **Root Cause:** Blocking operation in main event loop\n",
    "- **Confidence:** high\n",
    "- **Recommended Fix:** Offload processing to background thread\n",
    "- **Priority:** P1\n",
    "- **Tasks Generated:** 2\n\n",
    "## Cross-Issue Patterns\n",
    "None (single issue)\n\n",
    "## Recommended Action Order\n",
    "1. Offload processing first to unblock loop\n",
    "2. Add metrics to monitor queue size\n\n",
    "===TASKS_JSON===\n\n",
    "[\n",
    "  {\n",
    "    \"title\": \"Offload message processing to thread\",\n",
    "    \"description\": \"Move the queue processing logic from the main loop to a separate worker thread.\",\n",
    "    \"issue_id\": \"issue_mock\",\n",
    "    \"priority\": \"P1\",\n",
    "    \"complexity\": \"medium\",\n",
    "    \"files_likely_affected\": [\"src/event_loop.rs\", \"src/queue.rs\"],\n",
    "    \"suggested_approach\": \"Use a dedicated worker task\"\n",
    "  },\n",
    "  {\n",
    "    \"title\": \"Add queue size metrics\",\n",
    "    \"description\": \"Instrument the queue to report size and processing time.\",\n",
    "    \"issue_id\": \"issue_mock\",\n",
    "    \"priority\": \"P2\",\n",
    "    \"complexity\": \"low\",\n",
    "    \"files_likely_affected\": [\"src/queue.rs\"],\n",
    "    \"suggested_approach\": \"Use the standard metrics crate\"\n",
    "  }\n",
    "]",
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::debate::DebateOutput;
    use crate::schema::research::{ImpactOutput, ResearcherOutput, SolutionOutput};
    use crate::schema::{extract_json_output, extract_markdown_output};

    #[test]
    fn researcher_mock_parses_and_validates() {
        let value = extract_json_output(RESEARCHER_MOCK).unwrap();
        let parsed: ResearcherOutput = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.hypothesis, "The error appears to be caused by a missing dependency.");
    }

    #[test]
    fn solution_mock_parses_and_validates() {
        let value = extract_json_output(SOLUTION_MOCK).unwrap();
        let parsed: SolutionOutput = serde_json::from_value(value).unwrap();
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn impact_mock_parses_and_validates() {
        let value = extract_json_output(IMPACT_MOCK).unwrap();
        let _parsed: ImpactOutput = serde_json::from_value(value).unwrap();
    }

    #[test]
    fn debate_mock_parses_superset_schema() {
        let value = extract_json_output(DEBATE_MOCK).unwrap();
        let parsed: DebateOutput = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.challenge_survival_rate(), Some(1.0));
    }

    #[test]
    fn converge_mock_has_both_labelled_sections() {
        assert!(CONVERGE_MOCK.contains("===CONVERGENCE_REPORT==="));
        assert!(CONVERGE_MOCK.contains("===TASKS_JSON==="));
    }

    #[test]
    fn markdown_extraction_excludes_json_block() {
        let markdown = extract_markdown_output(RESEARCHER_MOCK);
        assert!(!markdown.contains("JSON_OUTPUT"));
        assert!(markdown.contains("## Hypothesis"));
    }
}
