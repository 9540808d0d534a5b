//! Root-cause research worker, ported from `agents/researcher.py`.

use crate::agent::invoker::{invoke, InvokeRequest};
use crate::agent::mock::AgentRole;
use crate::agent::Stage;
use crate::config::Config;
use crate::issue::Issue;
use crate::logging::ActivityLog;
use crate::sanitizer::sanitize_context;
use crate::schema::research::ResearcherOutput;

use super::{join_or_none, write_json, write_markdown, PhaseError};

const RESEARCH_PROMPT: &str = "You are a root cause analysis agent. Your job is to investigate an error
that occurred during software development and determine WHY it happened.

## Error Context

Tool: {tool_name}
Error: {description}
Working Directory: {working_directory}
Git Branch: {git_branch}
Recently Changed Files: {recent_files}

## Instructions

Analyze this error carefully. Consider:
- What the tool was trying to do
- Why it failed based on the error message
- What conditions or prior changes could have caused this
- Whether this is a symptom of a deeper issue

## Required Output Format

Structure your response EXACTLY as follows:

## Hypothesis
State your primary hypothesis for the root cause. Be specific.

## Evidence
List the evidence from the error context that supports your hypothesis.

## Confidence
State: high, medium, or low -- with a brief justification.

## Related Patterns
Note any patterns this error shares with common development issues
(dependency problems, state management bugs, configuration drift, etc.)
";

fn build_prompt(issue: &Issue, config: &Config) -> String {
    RESEARCH_PROMPT
        .replace("{tool_name}", &issue.tool_name)
        .replace("{description}", &sanitize_context(&issue.description, &config.sanitizer))
        .replace("{working_directory}", &issue.working_directory)
        .replace("{git_branch}", &issue.git_branch)
        .replace("{recent_files}", &join_or_none(&issue.recent_files))
}

/// Run root-cause analysis for `issue`, writing `root_cause.md` (raw agent
/// transcript) and `root_cause.json` (validated structured output).
pub async fn research_issue(issue: &Issue, config: &Config) -> Result<ResearcherOutput, PhaseError> {
    let log = ActivityLog::new(&config.data_dir(), &issue.id, "research");
    log.section("Root Cause Analysis");
    log.info("Issue loaded, constructing research prompt");

    let prompt = build_prompt(issue, config);

    let result = invoke(InvokeRequest {
        prompt: &prompt,
        stage: Stage::Research,
        mock_role: AgentRole::Researcher,
        config,
        log: &log,
        timeout_override: None,
    })
    .await;

    if !result.ok {
        let message = result.error.clone().unwrap_or_default();
        log.error(&format!("Research agent failed: {message}"));
        return Err(if result.timed_out {
            PhaseError::AgentTimedOut
        } else {
            PhaseError::AgentFailed(message)
        });
    }

    let research_dir = config.research_dir(&issue.id);
    write_markdown(&research_dir, "root_cause.md", &result.raw_output)?;

    let structured = result.structured.ok_or(PhaseError::MissingStructuredOutput)?;
    let parsed: ResearcherOutput =
        serde_json::from_value(structured).map_err(|err| PhaseError::SchemaInvalid(err.to_string()))?;
    write_json(&research_dir, "root_cause.json", &parsed)?;

    log.info("Root cause analysis complete");
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::{IssueStatus, IssueType};
    use chrono::Utc;

    fn sample_issue() -> Issue {
        let now = Utc::now();
        Issue {
            id: "issue_test".to_string(),
            issue_type: IssueType::Error,
            timestamp: now,
            first_seen: now,
            last_seen: now,
            description: "ENOENT: missing module".to_string(),
            raw_error: "ENOENT: missing module".to_string(),
            tool_name: "Bash".to_string(),
            git_branch: "main".to_string(),
            recent_files: vec!["src/main.rs".to_string()],
            working_directory: "/repo".to_string(),
            source: "hook:PostToolUseFailure".to_string(),
            status: IssueStatus::Captured,
            fingerprint: String::new(),
            occurrence_count: 1,
        }
    }

    #[tokio::test]
    async fn sandbox_run_writes_markdown_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.project_root = dir.path().to_path_buf();
        config.sandbox_mode = true;

        let issue = sample_issue();
        let output = research_issue(&issue, &config).await.unwrap();
        assert_eq!(output.confidence, crate::schema::Confidence::Medium);

        let research_dir = config.research_dir(&issue.id);
        assert!(research_dir.join("root_cause.md").exists());
        assert!(research_dir.join("root_cause.json").exists());
    }

    #[test]
    fn prompt_includes_error_context() {
        let issue = sample_issue();
        let prompt = build_prompt(&issue, &Config::default());
        assert!(prompt.contains("ENOENT: missing module"));
        assert!(prompt.contains("src/main.rs"));
        assert!(prompt.contains("Bash"));
    }
}
