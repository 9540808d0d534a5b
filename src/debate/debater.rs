//! Adversarial debater (C7.4), ported from `agents/debater.py`'s single-round
//! flow and sentinel handling, extended to the two-round analyst / devil's
//! advocate / sceptic design of §4.8.
//!
//! Round 1 drives three perspectives in one agent turn and always writes
//! `debate.md` + `debate.log`. An optional round 2, gated on
//! `budget.debate_rounds == 2`, re-invokes the agent with the unresolved
//! challenges and concerns; on failure its artefacts are discarded and round
//! 1's stand as final, byte-for-byte (graceful degradation, §4.8/S5).

use std::path::Path;

use serde_json::Value;

use crate::agent::invoker::{invoke, InvokeRequest};
use crate::agent::mock::AgentRole;
use crate::agent::Stage;
use crate::config::Config;
use crate::issue::{Issue, IssueStatus};
use crate::logging::ActivityLog;
use crate::phases::{write_json, write_markdown, PhaseError};
use crate::schema::debate::DebateOutput;
use crate::schema::research::ResearcherOutput;
use crate::store;

use super::metrics::{compute_debate_metrics, DebateMetrics};

const ROUND1_PROMPT: &str = "You are a debate and critique agent. Three independent research agents investigated
a software development issue. Your job is to compare their findings under three distinct
perspectives, then synthesise a single revised position.

## Issue Being Investigated

ID: {issue_id}
Description: {description}

## Agent Findings

### ROOT CAUSE ANALYSIS (Researcher Agent)
{root_cause}

### SOLUTION RESEARCH (Solution Finder Agent)
{solutions}

### IMPACT ASSESSMENT (Impact Assessor Agent)
{impact}

## Instructions

Adopt three distinct perspectives in turn:

1. **Analyst** -- where do all agents agree? Where do they contradict each other, and
   which position does the evidence better support? What did NO agent consider?
2. **Devil's Advocate** -- for each significant claim, mount the strongest challenge you
   can against it, then judge whether the claim survives that challenge.
3. **Sceptic** -- raise concerns about the proposed fix and rate each one's severity
   (low, medium, or high).

Then synthesise a unified, revised assessment stronger than any individual agent's,
with your confidence in that revised assessment.

## Required Output Format

## Agreements
High-confidence findings supported by multiple agents.

## Contradictions
Where agents disagree, and which position the evidence better supports.

## Gaps
Critical considerations that no agent addressed.

## Devil's Advocate
Per-claim challenges and whether each claim survived.

## Sceptic
Per-concern severity ratings.

## Revised Assessment
A unified position: root cause (revised), recommended fix (revised), priority (revised),
and your confidence in this revised assessment.
";

const ROUND2_PROMPT: &str = "You previously produced the following adversarial debate analysis of a
software development issue. Resolve each challenge and each medium/high severity concern you raised,
then restate your revised assessment in light of those resolutions.

## Round 1 Analysis

{round1_output}

## Instructions

For each devil's advocate challenge and each medium/high severity sceptic concern above,
state explicitly how it is resolved (or why it cannot be, in which case lower your
confidence accordingly). Then restate the full debate output in the same format as before.

## Required Output Format

## Agreements
## Contradictions
## Gaps
## Devil's Advocate
## Sceptic
## Revised Assessment
";

fn read_research_file(research_dir: &Path, filename: &str) -> String {
    let path = research_dir.join(filename);
    let Ok(content) = std::fs::read_to_string(&path) else {
        return format!("[MISSING: {filename} was not produced by its agent]");
    };
    let content = content.trim();
    if content.is_empty() {
        format!("[EMPTY: {filename} was produced but contains no content]")
    } else {
        content.to_string()
    }
}

fn is_sentinel(content: &str) -> bool {
    content.starts_with("[MISSING") || content.starts_with("[EMPTY")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

fn build_round1_prompt(issue: &Issue, root_cause: &str, solutions: &str, impact: &str) -> String {
    ROUND1_PROMPT
        .replace("{issue_id}", &issue.id)
        .replace("{description}", &truncate_chars(&issue.description, 1000))
        .replace("{root_cause}", root_cause)
        .replace("{solutions}", solutions)
        .replace("{impact}", impact)
}

fn build_round2_prompt(round1_markdown: &str) -> String {
    ROUND2_PROMPT.replace("{round1_output}", round1_markdown)
}

/// Pre-debate confidence, read from `root_cause.json` when present and
/// valid; `None` lets the metrics stage fall back to its own baseline.
fn pre_debate_confidence(research_dir: &Path) -> Option<crate::schema::Confidence> {
    let path = research_dir.join("root_cause.json");
    let content = std::fs::read_to_string(path).ok()?;
    let parsed: ResearcherOutput = serde_json::from_str(&content).ok()?;
    Some(parsed.confidence)
}

pub struct DebateOutcome {
    pub output: DebateOutput,
    pub metrics: DebateMetrics,
    pub rounds_run: u8,
}

/// Run the adversarial debater on a researched issue.
pub async fn debate_issue(issue: &Issue, config: &Config) -> Result<DebateOutcome, PhaseError> {
    let log = ActivityLog::new(&config.data_dir(), &issue.id, "debate");
    log.section("Cross-Agent Debate");

    let research_dir = config.research_dir(&issue.id);
    let root_cause = read_research_file(&research_dir, "root_cause.md");
    let solutions = read_research_file(&research_dir, "solutions.md");
    let impact = read_research_file(&research_dir, "impact.md");

    if is_sentinel(&root_cause) && is_sentinel(&solutions) && is_sentinel(&impact) {
        log.error("No research outputs found. Run research first.");
        return Err(PhaseError::AgentFailed(
            "no non-empty research artefacts available for debate".to_string(),
        ));
    }

    let issues_path = config.issues_path();
    let _ = store::update(&issues_path, &issue.id, "id", |record: &mut Value| {
        record["status"] = Value::String(IssueStatus::Debating.as_str().to_string());
    });
    log.info("Research outputs loaded, constructing debate prompt");

    let round1_prompt = build_round1_prompt(issue, &root_cause, &solutions, &impact);
    let round1 = invoke(InvokeRequest {
        prompt: &round1_prompt,
        stage: Stage::Debate,
        mock_role: AgentRole::Debater,
        config,
        log: &log,
        timeout_override: None,
    })
    .await;

    if !round1.ok {
        let message = round1.error.clone().unwrap_or_default();
        log.error(&format!("Debate agent failed: {message}"));
        let _ = store::update(&issues_path, &issue.id, "id", |record: &mut Value| {
            record["status"] = Value::String(IssueStatus::Researched.as_str().to_string());
        });
        return Err(if round1.timed_out {
            PhaseError::AgentTimedOut
        } else {
            PhaseError::AgentFailed(message)
        });
    }

    write_markdown(&research_dir, "debate.log", &round1.raw_output)?;

    let round1_structured = round1.structured.clone().ok_or(PhaseError::MissingStructuredOutput)?;
    let round1_output: DebateOutput = serde_json::from_value(round1_structured)
        .map_err(|err| PhaseError::SchemaInvalid(err.to_string()))?;

    let mut rounds_run = 1;
    let mut final_markdown = round1.raw_output.clone();
    let mut final_output = round1_output.clone();

    if config.budget.debate_rounds >= 2 {
        write_markdown(&research_dir, "debate_round1.md", &round1.raw_output)?;
        write_json(&research_dir, "debate_round1.json", &round1_output)?;

        let round2_prompt = build_round2_prompt(&round1.raw_output);
        let round2 = invoke(InvokeRequest {
            prompt: &round2_prompt,
            stage: Stage::Debate,
            mock_role: AgentRole::Debater,
            config,
            log: &log,
            timeout_override: None,
        })
        .await;

        match round2.structured.clone() {
            Some(value) if round2.ok => match serde_json::from_value::<DebateOutput>(value) {
                Ok(parsed) => {
                    log.info("Round 2 debate succeeded, promoting its output to final");
                    final_markdown = round2.raw_output.clone();
                    final_output = parsed;
                    rounds_run = 2;
                }
                Err(err) => {
                    log.warn(&format!(
                        "Round 2 debate output failed schema validation ({err}), keeping round 1"
                    ));
                }
            },
            _ => {
                log.warn("Round 2 debate failed or produced no structured output, keeping round 1");
            }
        }
    }

    write_markdown(&research_dir, "debate.md", &final_markdown)?;
    write_json(&research_dir, "debate.json", &final_output)?;

    let pre_confidence = pre_debate_confidence(&research_dir);
    let metrics = compute_debate_metrics(&final_output, pre_confidence);
    write_json(&research_dir, "debate_metrics.json", &metrics)?;

    let _ = store::update(&issues_path, &issue.id, "id", |record: &mut Value| {
        record["status"] = Value::String(IssueStatus::Debated.as_str().to_string());
    });
    log.info("Debate complete");

    Ok(DebateOutcome {
        output: final_output,
        metrics,
        rounds_run,
    })
}
