//! Solution research worker, ported from `agents/solution_finder.py`.

use crate::agent::invoker::{invoke, InvokeRequest};
use crate::agent::mock::AgentRole;
use crate::agent::Stage;
use crate::config::Config;
use crate::issue::Issue;
use crate::logging::ActivityLog;
use crate::sanitizer::sanitize_context;
use crate::schema::research::SolutionOutput;

use super::{join_or_none, write_json, write_markdown, PhaseError};

const SOLUTION_PROMPT: &str = "You are a solution research agent. Your job is to find practical fixes
for a software development error.

## Error Context

Tool: {tool_name}
Error: {description}
Git Branch: {git_branch}
Recently Changed Files: {recent_files}

{root_cause_section}

## Instructions

Research solutions for this error. Consider:
- Quick fixes that resolve the immediate problem
- Longer-term fixes that prevent recurrence
- Tradeoffs of each approach (risk, complexity, side effects)
- Implementation steps that are specific and actionable

## Required Output Format

Structure your response EXACTLY as follows:

## Solution 1
Describe the first solution approach.
**Tradeoffs:** Risk, complexity, side effects.

## Solution 2
Describe an alternative approach.
**Tradeoffs:** Risk, complexity, side effects.

## Recommended Approach
Which solution you recommend and why.

## Implementation Steps
Numbered, specific steps to implement the recommended fix.
";

/// Pull in the prior root-cause analysis if one has already been written,
/// so the solution agent can reason from it rather than re-deriving it.
fn load_root_cause_section(research_dir: &std::path::Path) -> String {
    let path = research_dir.join("root_cause.md");
    let Ok(content) = std::fs::read_to_string(&path) else {
        return String::new();
    };
    let content = content.trim();
    if content.is_empty() {
        return String::new();
    }
    format!("## Root Cause Analysis (from prior research)\n\n{content}")
}

fn build_prompt(issue: &Issue, root_cause_section: &str, config: &Config) -> String {
    SOLUTION_PROMPT
        .replace("{tool_name}", &issue.tool_name)
        .replace("{description}", &sanitize_context(&issue.description, &config.sanitizer))
        .replace("{git_branch}", &issue.git_branch)
        .replace("{recent_files}", &join_or_none(&issue.recent_files))
        .replace("{root_cause_section}", root_cause_section)
}

pub async fn find_solutions(issue: &Issue, config: &Config) -> Result<SolutionOutput, PhaseError> {
    let log = ActivityLog::new(&config.data_dir(), &issue.id, "solutions");
    log.section("Solution Research");
    log.info("Issue loaded, constructing solution prompt");

    let research_dir = config.research_dir(&issue.id);
    let root_cause_section = load_root_cause_section(&research_dir);
    if !root_cause_section.is_empty() {
        log.info("Root cause analysis available, incorporating into prompt");
    }

    let prompt = build_prompt(issue, &root_cause_section, config);

    let result = invoke(InvokeRequest {
        prompt: &prompt,
        stage: Stage::Research,
        mock_role: AgentRole::SolutionFinder,
        config,
        log: &log,
        timeout_override: None,
    })
    .await;

    if !result.ok {
        let message = result.error.clone().unwrap_or_default();
        log.error(&format!("Solution finder failed: {message}"));
        return Err(if result.timed_out {
            PhaseError::AgentTimedOut
        } else {
            PhaseError::AgentFailed(message)
        });
    }

    write_markdown(&research_dir, "solutions.md", &result.raw_output)?;

    let structured = result.structured.ok_or(PhaseError::MissingStructuredOutput)?;
    let parsed: SolutionOutput =
        serde_json::from_value(structured).map_err(|err| PhaseError::SchemaInvalid(err.to_string()))?;
    parsed
        .validate()
        .map_err(PhaseError::SchemaInvalid)?;
    write_json(&research_dir, "solutions.json", &parsed)?;

    log.info("Solution research complete");
    Ok(parsed)
}
