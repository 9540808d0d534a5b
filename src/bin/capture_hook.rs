//! `PostToolUseFailure` capture hook (C11), ported from
//! `hooks/convergence-dispatcher.py`.
//!
//! The sole error-capture entry point: reads one hook payload from stdin,
//! builds an enriched issue record, fingerprints and sanitises it, dedupes
//! against the existing store, and appends/updates `issues.jsonl`. Never
//! triggers research itself — that is deferred to `/converge research` or
//! `SessionEnd`. Always prints `{"result":"allow"}` and exits zero: this
//! hook observes, it never blocks the tool call.

use std::process::Command;

use convergence_engine::config::Config;
use convergence_engine::fingerprint::{compute_fingerprint, find_duplicate};
use convergence_engine::issue::{make_issue_id, Issue, IssueStatus, IssueType};
use convergence_engine::logging::ActivityLog;
use convergence_engine::sanitizer::sanitize_record;
use convergence_engine::schema::{migrate_issue, validate_issue};
use convergence_engine::store;
use serde_json::Value;

const RECENT_FILES_LIMIT: usize = 20;
const RAW_ERROR_TRUNCATE: usize = 2000;
const INPUT_SUMMARY_TRUNCATE: usize = 500;
const SOLUTION_HINT_TRUNCATE: usize = 300;

fn allow_and_exit() -> ! {
    println!("{}", serde_json::json!({"result": "allow"}));
    std::process::exit(0);
}

fn git_branch(project_root: &std::path::Path) -> String {
    let output = Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(project_root)
        .output();
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        _ => "unknown".to_string(),
    }
}

fn recent_changed_files(project_root: &std::path::Path) -> Vec<String> {
    let output = Command::new("git")
        .args(["diff", "--name-only", "HEAD~3"])
        .current_dir(project_root)
        .output();
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .take(RECENT_FILES_LIMIT)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

/// Emit the cached-resolution hint to stderr when a known-converged error
/// recurs, so the active session sees it without re-running research.
fn emit_cached_resolution(config: &Config, duplicate: &Value) {
    let issue_id = duplicate.get("id").and_then(Value::as_str).unwrap_or("");
    let occurrence_count = duplicate.get("occurrence_count").and_then(Value::as_u64).unwrap_or(1);
    let research_dir = config.research_dir(issue_id);

    let hint = std::fs::read_to_string(research_dir.join("solutions.md"))
        .ok()
        .and_then(|content| {
            content
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("---"))
                .map(|line| truncate_chars(line, SOLUTION_HINT_TRUNCATE))
        });

    match hint {
        Some(hint) => eprintln!(
            "[convergence-engine] Known error (seen {occurrence_count}x). Cached fix: {hint}"
        ),
        None => eprintln!(
            "[convergence-engine] Known error (seen {occurrence_count}x). Check convergence report for resolution."
        ),
    }
}

fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(_) => allow_and_exit(),
    };

    if !config.enabled {
        allow_and_exit();
    }

    let payload: Value = match serde_json::from_reader(std::io::stdin()) {
        Ok(payload) => payload,
        Err(_) => allow_and_exit(),
    };

    let tool_name = payload
        .get("tool_name")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let tool_input = payload.get("tool_input").cloned().unwrap_or(Value::Null);
    let error = payload
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default();

    let input_summary = truncate_chars(&tool_input.to_string(), INPUT_SUMMARY_TRUNCATE);
    let mut description = format!("Tool '{tool_name}' failed: {error}");
    if !input_summary.is_empty() && tool_input != Value::Null {
        description.push_str(&format!("\n\nTool input: {input_summary}"));
    }

    let now = chrono::Utc::now();
    let issue_id = make_issue_id();
    let issue_type = IssueType::classify(&tool_name, &error);

    let issue = Issue {
        id: issue_id.clone(),
        issue_type,
        timestamp: now,
        first_seen: now,
        last_seen: now,
        description,
        raw_error: truncate_chars(&error, RAW_ERROR_TRUNCATE),
        tool_name: tool_name.clone(),
        git_branch: git_branch(&config.project_root),
        recent_files: recent_changed_files(&config.project_root),
        working_directory: std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        source: "hook:PostToolUseFailure".to_string(),
        status: IssueStatus::Captured,
        fingerprint: String::new(),
        occurrence_count: 1,
    };

    let mut issue_value = serde_json::to_value(&issue).expect("Issue always serialises");
    issue_value["fingerprint"] = Value::String(compute_fingerprint(&issue));

    let log = ActivityLog::new(&config.data_dir(), &issue_id, "capture");

    let errors = validate_issue(&issue_value);
    if !errors.is_empty() {
        log.error(&format!("Issue validation failed: {}", errors.join("; ")));
        allow_and_exit();
    }

    let sanitized = sanitize_record(&issue_value, &config.sanitizer);
    let sanitized_issue: Issue = match serde_json::from_value(sanitized.clone()) {
        Ok(issue) => issue,
        Err(err) => {
            log.error(&format!("Sanitized issue failed to re-parse: {err}"));
            allow_and_exit();
        }
    };

    let issues_path = config.issues_path();
    let existing_raw = store::read_all(&issues_path).unwrap_or_default();
    let mut existing_issues = Vec::with_capacity(existing_raw.len());
    for mut record in existing_raw {
        migrate_issue(&mut record);
        if let Ok(parsed) = serde_json::from_value::<Issue>(record) {
            existing_issues.push(parsed);
        }
    }

    match find_duplicate(&sanitized_issue, &existing_issues) {
        Some(duplicate) => {
            let dup_id = duplicate.id.clone();
            let new_count = duplicate.occurrence_count + 1;
            let now_str = now.to_rfc3339();

            let _ = store::update(&issues_path, &dup_id, "id", |record: &mut Value| {
                record["occurrence_count"] = Value::from(new_count);
                record["last_seen"] = Value::String(now_str.clone());
            });

            if duplicate.status == IssueStatus::Converged && new_count > 1 {
                log.info(&format!(
                    "Known resolution: {dup_id} (status=converged, count={new_count}) — skipping re-research"
                ));
                let duplicate_value = serde_json::json!({
                    "id": dup_id,
                    "occurrence_count": new_count,
                });
                emit_cached_resolution(&config, &duplicate_value);
            } else {
                log.info(&format!("Dedup: matched existing {dup_id} (count={new_count})"));
            }
        }
        None => match store::append(&issues_path, &sanitized_issue) {
            Ok(()) => log.info(&format!("Issue captured: {tool_name} failure")),
            Err(err) => log.error(&format!("Failed to write issue: {err}")),
        },
    }

    allow_and_exit();
}
