//! `CLAUDE.md` knowledge bridge (C12), ported from `agents/claude_md_bridge.py`.
//!
//! Writes a compact, auto-generated table of converged issues into the
//! project's `CLAUDE.md` so new sessions inherit known fixes for free, using
//! section markers for non-destructive updates and the same lock-then-
//! atomic-rename discipline as [`crate::store`].

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use fs2::FileExt;
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;
use crate::issue::{Issue, IssueStatus};

const START_MARKER: &str = "<!-- convergence-engine:start -->";
const END_MARKER: &str = "<!-- convergence-engine:end -->";
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ACTIVE_TASKS: usize = 10;
const FINGERPRINT_DISPLAY_LEN: usize = 12;
const PATTERN_TRUNCATE: usize = 80;
const SUMMARY_TRUNCATE: usize = 60;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not acquire lock on CLAUDE.md")]
    LockTimedOut,
}

pub type BridgeResult<T> = Result<T, BridgeError>;

fn lock_path(project_root: &Path) -> std::path::PathBuf {
    project_root.join(".claude").join("CLAUDE.md.lock")
}

fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

fn escape_pipes(text: &str) -> String {
    text.replace('|', "\\|")
}

fn extract_error_pattern(issue: &Issue) -> String {
    let first_line = issue.description.lines().next().unwrap_or("");
    let trimmed = match first_line.split_once("failed:") {
        Some((_, rest)) => rest.trim(),
        None => first_line,
    };
    escape_pipes(&truncate_with_ellipsis(trimmed, PATTERN_TRUNCATE))
}

fn first_substantive_line(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("---"))
        .map(|line| escape_pipes(&truncate_with_ellipsis(line, SUMMARY_TRUNCATE)))
}

fn extract_root_cause(config: &Config, issue: &Issue) -> String {
    let research_dir = config.research_dir(&issue.id);
    for filename in ["debate.md", "root_cause.md"] {
        if let Ok(content) = std::fs::read_to_string(research_dir.join(filename)) {
            if let Some(line) = first_substantive_line(&content) {
                return line;
            }
        }
    }
    "See convergence report".to_string()
}

fn extract_fix(config: &Config, issue: &Issue) -> String {
    let research_dir = config.research_dir(&issue.id);
    if let Ok(content) = std::fs::read_to_string(research_dir.join("solutions.md")) {
        if let Some(line) = first_substantive_line(&content) {
            return line;
        }
    }
    "See convergence report".to_string()
}

/// Grove-inspired applicability predicate: the context this cached fix is
/// known to apply under (tool, branch, touched file).
fn extract_applicability(issue: &Issue) -> String {
    let mut parts = Vec::new();
    if !issue.tool_name.is_empty() {
        parts.push(format!("`{}`", issue.tool_name));
    }
    if !issue.git_branch.is_empty() && issue.git_branch != "unknown" {
        parts.push(format!("branch:{}", issue.git_branch));
    }
    if let Some(first_file) = issue.recent_files.first() {
        parts.push(escape_pipes(first_file));
    }
    if parts.is_empty() {
        "any context".to_string()
    } else {
        parts.join(", ")
    }
}

fn build_knowledge_table(config: &Config, issues: &[Issue]) -> String {
    if issues.is_empty() {
        return String::new();
    }

    let mut rows = Vec::with_capacity(issues.len() + 2);
    rows.push("| Fingerprint | Error Pattern | Root Cause | Fix | Applies When | Seen |".to_string());
    rows.push("|---|---|---|---|---|---|".to_string());

    for issue in issues {
        let fp: String = issue.fingerprint.chars().take(FINGERPRINT_DISPLAY_LEN).collect();
        rows.push(format!(
            "| `{}` | {} | {} | {} | {} | {} |",
            fp,
            extract_error_pattern(issue),
            extract_root_cause(config, issue),
            extract_fix(config, issue),
            extract_applicability(issue),
            issue.occurrence_count,
        ));
    }

    rows.join("\n")
}

fn build_tasks_summary(tasks: &[Value]) -> String {
    let active: Vec<&Value> = tasks
        .iter()
        .filter(|task| {
            let priority = task.get("priority").and_then(Value::as_str).unwrap_or("");
            let status = task.get("status").and_then(Value::as_str).unwrap_or("");
            matches!(priority, "P0" | "P1") && status == "pending"
        })
        .take(MAX_ACTIVE_TASKS)
        .collect();

    if active.is_empty() {
        return String::new();
    }

    let mut lines = vec!["### Active Tasks (P0/P1)".to_string()];
    for task in active {
        let priority = task.get("priority").and_then(Value::as_str).unwrap_or("P?");
        let title = task.get("title").and_then(Value::as_str).unwrap_or("Untitled");
        lines.push(format!("- **[{priority}]** {title}"));
    }
    lines.join("\n")
}

/// Build the full `<!-- convergence-engine:start -->...end` block.
pub fn build_convergence_section(config: &Config, issues: &[Issue], tasks: &[Value]) -> String {
    let now = Utc::now().format("%Y-%m-%d %H:%M UTC");
    let mut parts = vec![
        START_MARKER.to_string(),
        String::new(),
        "## Convergence Knowledge (auto-generated)".to_string(),
        format!("_Last updated: {now}_"),
        String::new(),
    ];

    let table = build_knowledge_table(config, issues);
    let tasks_summary = build_tasks_summary(tasks);

    if !table.is_empty() {
        parts.push(table);
        parts.push(String::new());
    }
    if !tasks_summary.is_empty() {
        parts.push(tasks_summary);
        parts.push(String::new());
    }
    if parts.len() == 5 {
        parts.push("_No convergence knowledge yet._".to_string());
        parts.push(String::new());
    }

    parts.push(END_MARKER.to_string());
    parts.join("\n")
}

/// Remove a prior convergence section from `content`, tolerating a
/// mismatched single marker left behind by a previous partial write.
fn strip_convergence_section(content: &str) -> String {
    let has_start = content.contains(START_MARKER);
    let has_end = content.contains(END_MARKER);

    match (has_start, has_end) {
        (true, true) => {
            let start_idx = content.find(START_MARKER).unwrap();
            let mut end_idx = content.find(END_MARKER).unwrap() + END_MARKER.len();
            if content[end_idx..].starts_with('\n') {
                end_idx += 1;
            }
            let head = content[..start_idx].trim_end_matches('\n');
            format!("{head}{}", &content[end_idx..])
        }
        (true, false) => {
            let start_idx = content.find(START_MARKER).unwrap();
            content[..start_idx].trim_end_matches('\n').to_string()
        }
        (false, true) => {
            let mut end_idx = content.find(END_MARKER).unwrap() + END_MARKER.len();
            if content[end_idx..].starts_with('\n') {
                end_idx += 1;
            }
            content[end_idx..].trim_start_matches('\n').to_string()
        }
        (false, false) => content.to_string(),
    }
}

/// Read-strip-append-rewrite `CLAUDE.md` under an exclusive lock, atomically
/// (temp sibling + rename), so a concurrently-editing user never observes a
/// torn write.
fn write_to_claude_md(config: &Config, section_content: &str) -> BridgeResult<()> {
    let claude_md_path = config.knowledge_doc_path();
    let lock_file_path = lock_path(&config.project_root);
    if let Some(parent) = lock_file_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let lock_file = std::fs::File::create(&lock_file_path)?;

    let mut waited = Duration::ZERO;
    let step = Duration::from_millis(50);
    loop {
        match lock_file.try_lock_exclusive() {
            Ok(()) => break,
            Err(_) if waited < LOCK_TIMEOUT => {
                std::thread::sleep(step);
                waited += step;
            }
            Err(_) => return Err(BridgeError::LockTimedOut),
        }
    }

    let result = (|| -> BridgeResult<()> {
        let existing = std::fs::read_to_string(&claude_md_path).unwrap_or_default();
        let mut new_content = strip_convergence_section(&existing);

        if !new_content.is_empty() && !new_content.ends_with("\n\n") {
            if !new_content.ends_with('\n') {
                new_content.push('\n');
            }
            new_content.push('\n');
        }
        new_content.push_str(section_content);
        new_content.push('\n');

        let dir = claude_md_path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let tmp_path = dir.join(".CLAUDE.md.tmp");
        let mut tmp = std::fs::File::create(&tmp_path)?;
        use std::io::Write;
        tmp.write_all(new_content.as_bytes())?;
        tmp.sync_all()?;
        std::fs::rename(&tmp_path, &claude_md_path)?;
        Ok(())
    })();

    let _ = fs2::FileExt::unlock(&lock_file);
    result
}

/// Recompute the knowledge section from every `converged`/`resolved` issue
/// and the latest `tasks.json`, and write it into `CLAUDE.md`.
pub fn refresh(config: &Config) -> BridgeResult<()> {
    let issues: Vec<Issue> = crate::store::read_all_typed(&config.issues_path()).unwrap_or_default();
    let converged: Vec<Issue> = issues
        .into_iter()
        .filter(|issue| matches!(issue.status, IssueStatus::Converged | IssueStatus::Resolved))
        .collect();

    let tasks_path = config.output_dir().join("tasks.json");
    let tasks: Vec<Value> = std::fs::read_to_string(&tasks_path)
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default();

    let section = build_convergence_section(config, &converged, &tasks);
    write_to_claude_md(config, &section)
}

/// Parse the knowledge table back out of `CLAUDE.md`, for the pre-tool
/// pattern matcher to consult without re-deriving it from `issues.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeEntry {
    pub fingerprint_short: String,
    pub error_pattern: String,
    pub root_cause: String,
    pub fix: String,
    pub applies_when: String,
    pub seen_count: u64,
}

pub fn read_knowledge_table(config: &Config) -> Vec<KnowledgeEntry> {
    let content = match std::fs::read_to_string(config.knowledge_doc_path()) {
        Ok(content) => content,
        Err(_) => return Vec::new(),
    };

    let (Some(start), Some(end)) = (content.find(START_MARKER), content.find(END_MARKER)) else {
        return Vec::new();
    };
    let section = &content[start + START_MARKER.len()..end];

    let mut entries = Vec::new();
    let mut in_table = false;
    for line in section.lines() {
        let line = line.trim();
        if line.starts_with("| Fingerprint") {
            in_table = true;
            continue;
        }
        if line.starts_with("|---") {
            continue;
        }
        if in_table && line.starts_with('|') {
            let mut cells: Vec<&str> = line.split('|').skip(1).collect();
            if cells.last().map(|c| c.trim().is_empty()).unwrap_or(false) {
                cells.pop();
            }
            if cells.len() >= 6 {
                entries.push(KnowledgeEntry {
                    fingerprint_short: cells[0].trim().trim_matches('`').to_string(),
                    error_pattern: cells[1].trim().to_string(),
                    root_cause: cells[2].trim().to_string(),
                    fix: cells[3].trim().to_string(),
                    applies_when: cells[4].trim().to_string(),
                    seen_count: cells[5].trim().parse().unwrap_or(1),
                });
            }
        } else if in_table {
            in_table = false;
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueType;
    use chrono::Utc;

    fn sandbox_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.project_root = dir.to_path_buf();
        config
    }

    fn converged_issue(id: &str) -> Issue {
        let now = Utc::now();
        Issue {
            id: id.to_string(),
            issue_type: IssueType::Error,
            timestamp: now,
            first_seen: now,
            last_seen: now,
            description: "Tool 'Bash' failed: ENOENT missing module".to_string(),
            raw_error: "ENOENT missing module".to_string(),
            tool_name: "Bash".to_string(),
            git_branch: "main".to_string(),
            recent_files: vec!["src/main.rs".to_string()],
            working_directory: "/repo".to_string(),
            source: "hook:PostToolUseFailure".to_string(),
            status: IssueStatus::Converged,
            fingerprint: "abcdef0123456789".to_string(),
            occurrence_count: 3,
        }
    }

    #[test]
    fn strip_handles_no_markers() {
        assert_eq!(strip_convergence_section("plain content"), "plain content");
    }

    #[test]
    fn strip_removes_well_formed_section() {
        let content = format!("# Notes\n\nhello\n\n{START_MARKER}\nstuff\n{END_MARKER}\n");
        assert_eq!(strip_convergence_section(&content), "# Notes\n\nhello");
    }

    #[test]
    fn strip_tolerates_orphaned_start_marker() {
        let content = format!("# Notes\n\n{START_MARKER}\nstuff without end");
        assert_eq!(strip_convergence_section(&content), "# Notes");
    }

    #[test]
    fn extract_error_pattern_strips_failed_prefix() {
        let issue = converged_issue("issue_1");
        assert_eq!(extract_error_pattern(&issue), "ENOENT missing module");
    }

    #[test]
    fn build_knowledge_table_empty_for_no_issues() {
        let dir = tempfile::tempdir().unwrap();
        let config = sandbox_config(dir.path());
        assert_eq!(build_knowledge_table(&config, &[]), "");
    }

    #[test]
    fn refresh_writes_section_into_claude_md() {
        let dir = tempfile::tempdir().unwrap();
        let config = sandbox_config(dir.path());
        let issue = converged_issue("issue_1");
        crate::store::append(&config.issues_path(), &issue).unwrap();

        refresh(&config).unwrap();

        let content = std::fs::read_to_string(config.knowledge_doc_path()).unwrap();
        assert!(content.contains(START_MARKER));
        assert!(content.contains("ENOENT missing module"));
        assert!(content.contains("See convergence report"));
    }

    #[test]
    fn refresh_preserves_existing_content_outside_markers() {
        let dir = tempfile::tempdir().unwrap();
        let config = sandbox_config(dir.path());
        std::fs::write(config.knowledge_doc_path(), "# My Project\n\nHand-written notes.\n").unwrap();

        refresh(&config).unwrap();

        let content = std::fs::read_to_string(config.knowledge_doc_path()).unwrap();
        assert!(content.starts_with("# My Project"));
        assert!(content.contains("Hand-written notes."));
        assert!(content.contains("No convergence knowledge yet."));
    }

    #[test]
    fn refresh_is_idempotent_on_repeated_calls() {
        let dir = tempfile::tempdir().unwrap();
        let config = sandbox_config(dir.path());
        let issue = converged_issue("issue_1");
        crate::store::append(&config.issues_path(), &issue).unwrap();

        refresh(&config).unwrap();
        refresh(&config).unwrap();

        let content = std::fs::read_to_string(config.knowledge_doc_path()).unwrap();
        assert_eq!(content.matches(START_MARKER).count(), 1);
    }

    #[test]
    fn read_knowledge_table_round_trips_written_entries() {
        let dir = tempfile::tempdir().unwrap();
        let config = sandbox_config(dir.path());
        let issue = converged_issue("issue_1");
        crate::store::append(&config.issues_path(), &issue).unwrap();

        refresh(&config).unwrap();
        let entries = read_knowledge_table(&config);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].seen_count, 3);
        assert_eq!(entries[0].fingerprint_short, "abcdef012345");
    }
}
