//! Structured inter-agent output contracts and issue-record validation (C4).
//!
//! Two concerns live here, mirroring upstream's `output_schemas.py` +
//! `schema_validator.py` split: agent output schemas (delegated to
//! [`research`], [`debate`], [`task`]) and issue-record validation/migration,
//! which stays in this module since it operates on raw [`serde_json::Value`]s
//! read straight off the JSONL store rather than a typed agent contract.

pub mod debate;
pub mod research;
pub mod task;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fingerprint::compute_fingerprint;
use crate::issue::{Issue, IssueStatus, IssueType};
use crate::store;

/// Agent output is embedded between these markers, markdown before, JSON after.
pub const JSON_OUTPUT_START: &str = "===JSON_OUTPUT===";
pub const JSON_OUTPUT_END: &str = "===JSON_OUTPUT_END===";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Ordinal position used by the debate-metrics confidence delta (low=0, medium=1, high=2).
    pub fn ordinal(self) -> i8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }
}

/// P0 (drop everything) .. P3 (backlog). Shared by impact severity, revised
/// debate priority, and task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    P0,
    P1,
    P2,
    P3,
}

/// Low/medium/high severity scale for sceptic concerns — distinct from
/// [`Severity`]'s P0-P3 scale. Weights feed the debate metrics' mean concern
/// severity calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcernSeverity {
    Low,
    Medium,
    High,
}

impl ConcernSeverity {
    pub fn weight(self) -> f64 {
        match self {
            Self::Low => 0.25,
            Self::Medium => 0.5,
            Self::High => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Isolated,
    Module,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    First,
    Recurring,
    Escalating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    Now,
    Soon,
    Later,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Extract the structured JSON block from raw agent output.
///
/// Tries the explicit end delimiter first; falls back to "everything after
/// the start delimiter" when it's missing (an agent that gets cut off
/// mid-response still yields usable JSON more often than not). Strips a
/// leading/trailing markdown code fence before parsing.
pub fn extract_json_output(raw_output: &str) -> Option<Value> {
    let start = raw_output.find(JSON_OUTPUT_START)?;
    let after_start = start + JSON_OUTPUT_START.len();

    let json_str = match raw_output[after_start..].find(JSON_OUTPUT_END) {
        Some(end_rel) => raw_output[after_start..after_start + end_rel].trim(),
        None => raw_output[after_start..].trim(),
    };

    let stripped = strip_code_fence(json_str);
    serde_json::from_str(&stripped).ok()
}

/// Everything before the JSON delimiter, or the whole trimmed string if
/// there's no delimiter at all.
pub fn extract_markdown_output(raw_output: &str) -> String {
    match raw_output.find(JSON_OUTPUT_START) {
        Some(idx) => raw_output[..idx].trim().to_string(),
        None => raw_output.trim().to_string(),
    }
}

fn strip_code_fence(s: &str) -> String {
    let s = s.trim();
    let s = s
        .strip_prefix("```json")
        .or_else(|| s.strip_prefix("```"))
        .unwrap_or(s);
    let s = s.strip_prefix('\n').unwrap_or(s);
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim().to_string()
}

#[derive(Debug, Default, Serialize)]
pub struct ValidationSummary {
    pub valid: usize,
    pub quarantined: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct MigrationSummary {
    pub total: usize,
    pub migrated: usize,
    pub already_current: usize,
}

/// Validate a tentative issue record against the required-field/enum rules,
/// returning every violation found (empty on success). Exposed for the
/// capture hook, which must validate before ever writing to the store.
pub fn validate_issue(record: &Value) -> Vec<String> {
    validate_issue_value(record)
}

fn validate_issue_value(record: &Value) -> Vec<String> {
    let mut errors = Vec::new();

    for field in ["id", "type", "timestamp", "description", "status"] {
        match record.get(field) {
            None => errors.push(format!("Missing required field: '{field}'")),
            Some(v) if !v.is_string() => {
                errors.push(format!("Field '{field}' expected string, got {v}"))
            }
            _ => {}
        }
    }

    if let Some(status) = record.get("status").and_then(Value::as_str) {
        if !status.is_empty() && IssueStatus::from_str_loose(status).is_none() {
            errors.push(format!("Invalid status: '{status}'"));
        }
    }

    if let Some(issue_type) = record.get("type").and_then(Value::as_str) {
        if !issue_type.is_empty() && IssueType::from_str_loose(issue_type).is_none() {
            errors.push(format!("Invalid type: '{issue_type}'"));
        }
    }

    if let Some(id) = record.get("id").and_then(Value::as_str) {
        if id.trim().is_empty() {
            errors.push("Field 'id' cannot be empty".to_string());
        }
    }

    if let Some(timestamp) = record.get("timestamp").and_then(Value::as_str) {
        if !timestamp.is_empty() && DateTime::parse_from_rfc3339(timestamp).is_err() {
            errors.push(format!("Field 'timestamp' is not valid ISO 8601: '{timestamp}'"));
        }
    }

    errors
}

/// Non-destructively add the Phase-2 fingerprint/dedup fields to a legacy
/// issue record that predates them. Mutates and returns whether it changed anything.
pub fn migrate_issue(record: &mut Value) -> bool {
    let mut migrated = false;

    if record.get("fingerprint").is_none() {
        if let Ok(issue) = serde_json::from_value::<Issue>(record.clone()) {
            record["fingerprint"] = Value::String(compute_fingerprint(&issue));
        } else {
            record["fingerprint"] = Value::String(String::new());
        }
        migrated = true;
    }
    if record.get("occurrence_count").is_none() {
        record["occurrence_count"] = Value::from(1);
        migrated = true;
    }

    let timestamp = record
        .get("timestamp")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| Utc::now().to_rfc3339());

    if record.get("first_seen").is_none() {
        record["first_seen"] = Value::String(timestamp.clone());
        migrated = true;
    }
    if record.get("last_seen").is_none() {
        record["last_seen"] = Value::String(timestamp);
        migrated = true;
    }

    migrated
}

/// Scan the issues log, quarantining any record that fails [`validate_issue_value`]
/// and rewriting the log with only the survivors. A no-op if nothing is quarantined.
pub fn validate_all_issues(issues_path: &Path, quarantine_path: &Path) -> std::io::Result<ValidationSummary> {
    let mut summary = ValidationSummary::default();
    if !issues_path.exists() {
        return Ok(summary);
    }

    let raw = std::fs::read_to_string(issues_path)?;
    let mut valid_records = Vec::new();
    let mut quarantined = Vec::new();

    for (line_num, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(trimmed) {
            Err(err) => {
                summary
                    .errors
                    .push(format!("Line {}: Invalid JSON -- {err}", line_num + 1));
                quarantined.push(serde_json::json!({
                    "raw_line": trimmed,
                    "error": err.to_string(),
                    "line_number": line_num + 1,
                    "quarantined_at": Utc::now().to_rfc3339(),
                }));
                summary.quarantined += 1;
            }
            Ok(mut record) => {
                let errors = validate_issue_value(&record);
                if errors.is_empty() {
                    valid_records.push(record);
                    summary.valid += 1;
                } else {
                    let id = record
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or("?")
                        .to_string();
                    summary
                        .errors
                        .push(format!("Line {} (id={id}): {}", line_num + 1, errors.join("; ")));
                    record["_quarantine_reason"] = Value::from(errors);
                    record["_quarantined_at"] = Value::String(Utc::now().to_rfc3339());
                    quarantined.push(record);
                    summary.quarantined += 1;
                }
            }
        }
    }

    for record in &quarantined {
        store::append(quarantine_path, record)?;
    }

    if summary.quarantined > 0 {
        rewrite_jsonl(issues_path, &valid_records)?;
    }

    Ok(summary)
}

/// Non-destructively backfill Phase-2 fields on every record in the issues log.
pub fn migrate_issues_file(issues_path: &Path) -> std::io::Result<MigrationSummary> {
    let mut summary = MigrationSummary::default();
    if !issues_path.exists() {
        return Ok(summary);
    }

    let raw = std::fs::read_to_string(issues_path)?;
    let mut records = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(mut record) = serde_json::from_str::<Value>(trimmed) else {
            continue;
        };
        summary.total += 1;

        let needs_migration = ["fingerprint", "occurrence_count", "first_seen", "last_seen"]
            .iter()
            .any(|f| record.get(*f).is_none());

        migrate_issue(&mut record);

        if needs_migration {
            summary.migrated += 1;
        } else {
            summary.already_current += 1;
        }
        records.push(record);
    }

    if summary.migrated > 0 {
        rewrite_jsonl(issues_path, &records)?;
    }

    Ok(summary)
}

fn rewrite_jsonl(path: &Path, records: &[Value]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("store")
    ));

    let mut buf = String::new();
    for record in records {
        buf.push_str(&serde_json::to_string(record)?);
        buf.push('\n');
    }
    std::fs::write(&tmp_path, buf)?;
    std::fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_output_with_end_delimiter() {
        let raw = format!(
            "some markdown\n{JSON_OUTPUT_START}\n{{\"a\": 1}}\n{JSON_OUTPUT_END}\ntrailing"
        );
        let value = extract_json_output(&raw).unwrap();
        assert_eq!(value["a"], 1);
        assert_eq!(extract_markdown_output(&raw), "some markdown");
    }

    #[test]
    fn extract_json_output_missing_end_delimiter_falls_back() {
        let raw = format!("notes\n{JSON_OUTPUT_START}\n{{\"a\": 2}}");
        let value = extract_json_output(&raw).unwrap();
        assert_eq!(value["a"], 2);
    }

    #[test]
    fn extract_json_output_strips_code_fence() {
        let raw = format!("{JSON_OUTPUT_START}\n```json\n{{\"a\": 3}}\n```\n{JSON_OUTPUT_END}");
        let value = extract_json_output(&raw).unwrap();
        assert_eq!(value["a"], 3);
    }

    #[test]
    fn extract_json_output_absent_returns_none() {
        assert!(extract_json_output("no delimiters here").is_none());
    }

    #[test]
    fn validate_issue_value_flags_missing_fields() {
        let record = serde_json::json!({"id": "x"});
        let errors = validate_issue_value(&record);
        assert!(errors.iter().any(|e| e.contains("type")));
        assert!(errors.iter().any(|e| e.contains("timestamp")));
    }

    #[test]
    fn validate_issue_value_flags_invalid_status() {
        let record = serde_json::json!({
            "id": "x", "type": "error", "timestamp": "2024-01-01T00:00:00Z",
            "description": "d", "status": "bogus"
        });
        let errors = validate_issue_value(&record);
        assert!(errors.iter().any(|e| e.contains("Invalid status")));
    }

    #[test]
    fn migrate_issue_adds_phase2_fields_only_when_missing() {
        let mut record = serde_json::json!({
            "id": "x", "type": "error", "timestamp": "2024-01-01T00:00:00Z",
            "description": "d", "status": "captured", "tool_name": "Bash",
            "git_branch": "main", "recent_files": [], "working_directory": "/tmp",
            "source": "hook", "first_seen": "2024-01-01T00:00:00Z",
            "last_seen": "2024-01-01T00:00:00Z"
        });
        assert!(migrate_issue(&mut record));
        assert!(record.get("fingerprint").is_some());
        assert!(record.get("occurrence_count").is_some());

        assert!(!migrate_issue(&mut record));
    }

    #[test]
    fn validate_all_issues_quarantines_invalid_and_keeps_valid() {
        let dir = tempfile::tempdir().unwrap();
        let issues_path = dir.path().join("issues.jsonl");
        let quarantine_path = dir.path().join("quarantine.jsonl");

        std::fs::write(
            &issues_path,
            concat!(
                "{\"id\":\"a\",\"type\":\"error\",\"timestamp\":\"2024-01-01T00:00:00Z\",\"description\":\"d\",\"status\":\"captured\"}\n",
                "not json\n",
                "{\"id\":\"b\"}\n",
            ),
        )
        .unwrap();

        let summary = validate_all_issues(&issues_path, &quarantine_path).unwrap();
        assert_eq!(summary.valid, 1);
        assert_eq!(summary.quarantined, 2);

        let remaining = std::fs::read_to_string(&issues_path).unwrap();
        assert_eq!(remaining.lines().count(), 1);
        assert!(quarantine_path.exists());
    }
}
