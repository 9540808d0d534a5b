//! Convergence synthesiser / arbiter (C10), ported from `agents/arbiter.py`.
//!
//! Runs once per session (never per-error): aggregates every eligible issue's
//! research/debate artefacts into one agent turn and splits the response into
//! a human report and a machine task list via the `===CONVERGENCE_REPORT===`
//! / `===TASKS_JSON===` delimiters.

use std::path::Path;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::agent::invoker::{invoke, InvokeRequest};
use crate::agent::mock::AgentRole;
use crate::agent::Stage;
use crate::config::Config;
use crate::issue::{Issue, IssueStatus};
use crate::knowledge_bridge;
use crate::logging::ActivityLog;
use crate::schema::task::TaskOutput;
use crate::store;

const CONVERGENCE_PROMPT: &str = "You are the convergence arbiter. Multiple issues have been researched and debated
by independent agents. Your job is to synthesize everything into a single, actionable
convergence report and generate specific tasks.

## Issues to Converge

{issues_block}

## Instructions

Produce a convergence report that:
1. Summarizes each issue with its root cause, recommended fix, and priority
2. Identifies cross-issue patterns (are multiple issues related? same root cause?)
3. Generates a prioritized list of concrete tasks
4. Recommends an action order (what to fix first and why)

Each task must include:
- A clear title (imperative verb, e.g., \"Fix authentication timeout\")
- Specific description of what to do
- Priority (P0-P3)
- Complexity estimate (low/medium/high)
- Which files are likely affected
- A suggested approach

## Required Output Format

Produce your output in TWO CLEARLY SEPARATED SECTIONS using these exact delimiters:

===CONVERGENCE_REPORT===

# Convergence Report -- {date}

## Session Summary
Issues analyzed: N | Resolved: M | Pending: K

## Cross-Issue Patterns
## Recommended Action Order

===TASKS_JSON===

[ {{ \"title\": \"...\", \"description\": \"...\", \"issue_id\": \"...\", \"priority\": \"P1\", \"complexity\": \"low\", \"files_likely_affected\": [\"...\"], \"suggested_approach\": \"...\" }} ]
";

#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] crate::error::StoreError),
    #[error("arbiter agent failed: {0}")]
    AgentFailed(String),
}

pub type ArbiterResult<T> = Result<T, ArbiterError>;

/// A single converged task, with the arbitrer-assigned `id`/`status` fields
/// that are not part of the agent's own structured output.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Task {
    pub id: String,
    pub status: String,
    #[serde(flatten)]
    pub output: TaskOutput,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConvergenceOutcome {
    pub ran: bool,
    pub issue_count: usize,
    pub task_count: usize,
}

fn read_artefact(research_dir: &Path, filename: &str) -> Option<String> {
    let content = std::fs::read_to_string(research_dir.join(filename)).ok()?;
    let content = content.trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

/// Build the per-issue context block: the debate synthesis if present,
/// else the individual research artefacts, matching upstream's
/// `_build_issues_block` preference order.
fn build_issues_block(config: &Config, issues: &[Issue]) -> String {
    let blocks: Vec<String> = issues
        .iter()
        .map(|issue| {
            let research_dir = config.research_dir(&issue.id);
            let mut block = format!(
                "### Issue: {}\n**Type:** {}\n**Tool:** {}\n**Description:** {}\n\n",
                issue.id,
                issue.issue_type,
                issue.tool_name,
                truncate_chars(&issue.description, 500)
            );

            if let Some(debate) = read_artefact(&research_dir, "debate.md") {
                block.push_str(&format!("**Debate Synthesis:**\n{debate}\n\n"));
            } else {
                for (filename, label) in [
                    ("root_cause.md", "Root Cause"),
                    ("solutions.md", "Solutions"),
                    ("impact.md", "Impact"),
                ] {
                    if let Some(content) = read_artefact(&research_dir, filename) {
                        block.push_str(&format!("**{label}:**\n{content}\n\n"));
                    }
                }
            }

            block
        })
        .collect();

    blocks.join("\n---\n\n")
}

/// Move any existing `convergence.md` / `tasks.json` into `output/archive/`
/// with a UTC timestamp suffix before writing new ones.
fn archive_previous_convergence(config: &Config) -> std::io::Result<()> {
    let archive_dir = config.archive_dir();
    std::fs::create_dir_all(&archive_dir)?;
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");

    for filename in ["convergence.md", "tasks.json"] {
        let src = config.output_dir().join(filename);
        if src.exists() {
            let (stem, ext) = filename.split_once('.').unwrap_or((filename, ""));
            let dst = archive_dir.join(format!("{stem}_{timestamp}.{ext}"));
            std::fs::rename(&src, &dst)?;
        }
    }
    Ok(())
}

/// Split the arbiter's raw response into report markdown and a task list.
/// A missing `===TASKS_JSON===` section (or JSON that fails to parse)
/// degrades to "whole output is the report, empty task list" rather than
/// failing the run (§7 "Arbiter JSON parse failure").
fn parse_convergence_output(raw_output: &str) -> (String, Vec<TaskOutput>) {
    const REPORT_MARKER: &str = "===CONVERGENCE_REPORT===";
    const TASKS_MARKER: &str = "===TASKS_JSON===";

    let Some(tasks_idx) = raw_output.find(TASKS_MARKER) else {
        return (raw_output.trim().to_string(), Vec::new());
    };
    if !raw_output.contains(REPORT_MARKER) {
        return (raw_output.trim().to_string(), Vec::new());
    }

    let report_part = raw_output[..tasks_idx].replace(REPORT_MARKER, "");
    let report = report_part.trim().to_string();
    let tasks_part = raw_output[tasks_idx + TASKS_MARKER.len()..].trim();

    let json_slice = match (tasks_part.find('['), tasks_part.rfind(']')) {
        (Some(start), Some(end)) if end > start => &tasks_part[start..=end],
        _ => {
            let note = format!("\n\n---\n\n**Note:** Task extraction failed. Raw output:\n{tasks_part}");
            return (report + &note, Vec::new());
        }
    };

    match serde_json::from_str::<Vec<TaskOutput>>(json_slice) {
        Ok(tasks) => (report, tasks),
        Err(_) => {
            let note = format!("\n\n---\n\n**Note:** Task extraction failed. Raw output:\n{tasks_part}");
            (report + &note, Vec::new())
        }
    }
}

fn assign_task_ids(outputs: Vec<TaskOutput>) -> Vec<Task> {
    outputs
        .into_iter()
        .enumerate()
        .map(|(i, output)| Task {
            id: format!("task_{:03}", i + 1),
            status: "pending".to_string(),
            output,
        })
        .collect()
}

/// Run the arbiter. `issue_filter` converges only that one issue (still
/// subject to `min_issues_for_convergence`); `None` converges every eligible
/// issue (`debated` preferred, `researched` as fallback).
pub async fn synthesize(config: &Config, issue_filter: Option<&str>) -> ArbiterResult<ConvergenceOutcome> {
    let log = ActivityLog::new(&config.data_dir(), "CONVERGENCE", "converge");
    log.section("Convergence Synthesis");

    let all_issues: Vec<Issue> = store::read_all_typed(&config.issues_path())?;

    let eligible: Vec<Issue> = if let Some(id) = issue_filter {
        all_issues.into_iter().filter(|i| i.id == id).collect()
    } else {
        let debated: Vec<Issue> = all_issues
            .iter()
            .filter(|i| i.status == IssueStatus::Debated)
            .cloned()
            .collect();
        if !debated.is_empty() {
            debated
        } else {
            all_issues
                .into_iter()
                .filter(|i| i.status == IssueStatus::Researched)
                .collect()
        }
    };

    if eligible.len() < config.min_issues_for_convergence {
        info!(
            eligible = eligible.len(),
            min = config.min_issues_for_convergence,
            "not enough eligible issues for convergence"
        );
        return Ok(ConvergenceOutcome {
            ran: false,
            issue_count: eligible.len(),
            task_count: 0,
        });
    }

    info!(count = eligible.len(), "converging issues");
    archive_previous_convergence(config)?;

    let issues_block = build_issues_block(config, &eligible);
    let date_str = Utc::now().format("%Y-%m-%d %H:%M UTC").to_string();
    let prompt = CONVERGENCE_PROMPT
        .replace("{issues_block}", &issues_block)
        .replace("{date}", &date_str);

    let result = invoke(InvokeRequest {
        prompt: &prompt,
        stage: Stage::Converge,
        mock_role: AgentRole::Arbiter,
        config,
        log: &log,
        timeout_override: None,
    })
    .await;

    if !result.ok {
        let message = result.error.clone().unwrap_or_default();
        error!(%message, "arbiter failed");
        return Err(ArbiterError::AgentFailed(message));
    }

    let (report, task_outputs) = parse_convergence_output(&result.raw_output);
    let tasks = assign_task_ids(task_outputs);

    let output_dir = config.output_dir();
    std::fs::create_dir_all(&output_dir)?;
    std::fs::write(output_dir.join("convergence.md"), &report)?;
    std::fs::write(output_dir.join("tasks.json"), serde_json::to_string_pretty(&tasks)?)?;
    info!(tasks = tasks.len(), "convergence artefacts written");

    let issues_path = config.issues_path();
    for issue in &eligible {
        store::update(&issues_path, &issue.id, "id", |record: &mut Value| {
            record["status"] = Value::String(IssueStatus::Converged.as_str().to_string());
        })?;
    }

    knowledge_bridge::refresh(config)?;

    info!(issues = eligible.len(), tasks = tasks.len(), "convergence complete");
    Ok(ConvergenceOutcome {
        ran: true,
        issue_count: eligible.len(),
        task_count: tasks.len(),
    })
}

impl From<serde_json::Error> for ArbiterError {
    fn from(err: serde_json::Error) -> Self {
        ArbiterError::AgentFailed(format!("serialisation error: {err}"))
    }
}
