//! Impact assessment worker, ported from `agents/impact_assessor.py`.

use crate::agent::invoker::{invoke, InvokeRequest};
use crate::agent::mock::AgentRole;
use crate::agent::Stage;
use crate::config::Config;
use crate::issue::Issue;
use crate::logging::ActivityLog;
use crate::sanitizer::sanitize_context;
use crate::schema::research::ImpactOutput;
use crate::store;

use super::{join_or_none, write_json, write_markdown, PhaseError};

const IMPACT_PROMPT: &str = "You are an impact assessment agent. Your job is to judge how severe,
how widespread, and how urgent a software development error is.

## Error Context

Tool: {tool_name}
Error: {description}
Git Branch: {git_branch}
Recently Changed Files: {recent_files}

## Recent Issue History

{recent_issues_summary}

## Instructions

Assess this error's impact. Consider:
- Severity: does this block work, corrupt data, or just annoy (P0 critical, P1 high, P2 medium, P3 low)
- Scope: is this isolated to one file, one module, or system-wide
- Frequency: is this the first occurrence, a recurring pattern, or escalating
- Priority: should this be fixed now, soon, or later

## Required Output Format

Structure your response EXACTLY as follows:

## Severity
State: P0, P1, P2, or P3 -- with justification.

## Scope
State: isolated, module, or system -- with justification.

## Frequency
State: first, recurring, or escalating -- with justification.

## Priority
State: now, soon, or later -- with justification.
";

const RECENT_ISSUES_LIMIT: usize = 10;
const DESCRIPTION_TRUNCATE: usize = 150;

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

/// Summarize the project's other recent issues, so the assessor can judge
/// whether this error is an isolated blip or part of an escalating pattern.
fn summarize_recent_issues(config: &Config, current_issue_id: &str) -> String {
    let issues: Vec<Issue> = store::read_all_typed(&config.issues_path()).unwrap_or_default();
    let recent: Vec<&Issue> = issues
        .iter()
        .filter(|issue| issue.id != current_issue_id)
        .rev()
        .take(RECENT_ISSUES_LIMIT)
        .collect();

    if recent.is_empty() {
        return "No other recent issues recorded.".to_string();
    }

    recent
        .into_iter()
        .rev()
        .map(|issue| {
            let description =
                truncate_chars(&sanitize_context(&issue.description, &config.sanitizer), DESCRIPTION_TRUNCATE);
            format!(
                "- [{}] {} | {} | {}",
                issue.id, issue.issue_type, issue.tool_name, description
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_prompt(issue: &Issue, recent_issues_summary: &str, config: &Config) -> String {
    IMPACT_PROMPT
        .replace("{tool_name}", &issue.tool_name)
        .replace("{description}", &sanitize_context(&issue.description, &config.sanitizer))
        .replace("{git_branch}", &issue.git_branch)
        .replace("{recent_files}", &join_or_none(&issue.recent_files))
        .replace("{recent_issues_summary}", recent_issues_summary)
}

pub async fn assess_impact(issue: &Issue, config: &Config) -> Result<ImpactOutput, PhaseError> {
    let log = ActivityLog::new(&config.data_dir(), &issue.id, "impact");
    log.section("Impact Assessment");
    log.info("Issue loaded, constructing impact prompt");

    let recent_issues_summary = summarize_recent_issues(config, &issue.id);
    let prompt = build_prompt(issue, &recent_issues_summary, config);

    let result = invoke(InvokeRequest {
        prompt: &prompt,
        stage: Stage::Research,
        mock_role: AgentRole::ImpactAssessor,
        config,
        log: &log,
        timeout_override: None,
    })
    .await;

    if !result.ok {
        let message = result.error.clone().unwrap_or_default();
        log.error(&format!("Impact assessor failed: {message}"));
        return Err(if result.timed_out {
            PhaseError::AgentTimedOut
        } else {
            PhaseError::AgentFailed(message)
        });
    }

    let research_dir = config.research_dir(&issue.id);
    write_markdown(&research_dir, "impact.md", &result.raw_output)?;

    let structured = result.structured.ok_or(PhaseError::MissingStructuredOutput)?;
    let parsed: ImpactOutput =
        serde_json::from_value(structured).map_err(|err| PhaseError::SchemaInvalid(err.to_string()))?;
    write_json(&research_dir, "impact.json", &parsed)?;

    log.info("Impact assessment complete");
    Ok(parsed)
}
