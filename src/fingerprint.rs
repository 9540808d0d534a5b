//! Deterministic issue fingerprinting (C3).
//!
//! Ported from `agents/fingerprint.py`: normalise the error message with an
//! ordered list of regex substitutions (most specific pattern first), then
//! hash a canonical, sorted-key JSON subset of fields with sha256.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::issue::Issue;

struct NormalizationRules {
    rules: Vec<(Regex, &'static str)>,
}

fn rules() -> &'static NormalizationRules {
    static RULES: OnceLock<NormalizationRules> = OnceLock::new();
    RULES.get_or_init(|| NormalizationRules {
        rules: vec![
            (
                Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
                    .unwrap(),
                "<UUID>",
            ),
            (
                Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})")
                    .unwrap(),
                "<TIMESTAMP>",
            ),
            (
                Regex::new(r"\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}").unwrap(),
                "<TIMESTAMP>",
            ),
            (Regex::new(r"(?i)\b[0-9a-f]{32,}\b").unwrap(), "<HASH>"),
            (
                Regex::new(r#"(?:/[^\s:"']+(?:\.[a-zA-Z0-9]+)?|[A-Z]:\\[^\s:"']+)"#).unwrap(),
                "<PATH>",
            ),
            (Regex::new(r"(?::|[Ll]ine\s*|[Ll])(\d+)").unwrap(), "<LINE>"),
            (
                Regex::new(r"(?i)(?:pid|process)\s*[=:]?\s*\d+").unwrap(),
                "<PID>",
            ),
            (Regex::new(r"0x[0-9a-fA-F]{4,}").unwrap(), "<ADDR>"),
            (Regex::new(r"(?i)(?:port\s+)\d{2,5}").unwrap(), "port <PORT>"),
            (Regex::new(r"\b\d{4,}\b").unwrap(), "<NUM>"),
        ],
    })
}

fn collapse_whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Normalise an error message: strip volatile content, collapse whitespace,
/// lowercase. Order matters — more specific patterns run first so they don't
/// get partially consumed by looser ones (e.g. a path must be stripped
/// before the trailing line-number suffix it may contain).
pub fn normalize_error_message(msg: &str) -> String {
    if msg.is_empty() {
        return String::new();
    }

    let mut result = msg.to_string();
    for (pattern, replacement) in &rules().rules {
        result = pattern.replace_all(&result, *replacement).into_owned();
    }

    let collapsed = collapse_whitespace().replace_all(result.trim(), " ");
    collapsed.to_lowercase()
}

/// Compute the 64-char hex sha256 fingerprint for an issue.
///
/// Only `{type, tool_name, error_normalized, source_file, git_branch}`
/// contribute — `id`, `timestamp`, `status`, and `occurrence_count` are
/// intentionally excluded so recomputation during dedup is stable.
pub fn compute_fingerprint(issue: &Issue) -> String {
    let error_normalized = normalize_error_message(&issue.raw_error);
    let source_file = issue.recent_files.first().map(String::as_str).unwrap_or("");

    let canonical: Value = json!({
        "type": issue.issue_type.as_str(),
        "tool_name": issue.tool_name,
        "error_normalized": error_normalized,
        "source_file": source_file,
        "git_branch": issue.git_branch,
    });

    // serde_json's Map is a BTreeMap by default (sorted keys) unless the
    // `preserve_order` feature is enabled, so `to_string` already yields a
    // canonical, sort-key representation matching upstream's
    // `json.dumps(..., sort_keys=True)`.
    let canonical_str = canonical.to_string();

    let mut hasher = Sha256::new();
    hasher.update(canonical_str.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Trivial equality today; the extension point upstream calls out for future
/// fuzzy matching (structural LSH, embeddings) — kept as a seam, not widened.
pub fn fingerprints_match(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && a == b
}

pub fn find_duplicate<'a>(issue: &Issue, existing: &'a [Issue]) -> Option<&'a Issue> {
    let new_fp = if issue.fingerprint.is_empty() {
        compute_fingerprint(issue)
    } else {
        issue.fingerprint.clone()
    };

    existing
        .iter()
        .find(|candidate| fingerprints_match(&new_fp, &candidate.fingerprint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueType;
    use chrono::Utc;

    fn make_issue(raw_error: &str, recent_files: Vec<String>, git_branch: &str) -> Issue {
        let now = Utc::now();
        Issue {
            id: "issue_x".to_string(),
            issue_type: IssueType::Error,
            timestamp: now,
            first_seen: now,
            last_seen: now,
            description: raw_error.to_string(),
            raw_error: raw_error.to_string(),
            tool_name: "Bash".to_string(),
            git_branch: git_branch.to_string(),
            recent_files,
            working_directory: "/tmp".to_string(),
            source: "hook:PostToolUseFailure".to_string(),
            status: crate::issue::IssueStatus::Captured,
            fingerprint: String::new(),
            occurrence_count: 1,
        }
    }

    #[test]
    fn normalization_strips_noise() {
        let a = "Failed at /Users/alice/app.py line 42 pid=1234 at 0x7fff5fbff8c0";
        let b = "Failed at /Users/bob/app.py line 99 pid=5678 at 0x1234abcd";
        assert_eq!(normalize_error_message(a), normalize_error_message(b));
    }

    #[test]
    fn fingerprint_deterministic_regardless_of_timestamp_or_id() {
        let mut a = make_issue("connection refused", vec!["src/main.rs".into()], "main");
        let mut b = a.clone();
        a.id = "issue_1".to_string();
        b.id = "issue_2".to_string();
        b.timestamp = a.timestamp + chrono::Duration::hours(3);
        assert_eq!(compute_fingerprint(&a), compute_fingerprint(&b));
    }

    #[test]
    fn cosmetic_path_difference_converges() {
        let a = make_issue(
            "ENOENT: /Users/alice/repo/src/index.ts not found",
            vec!["src/index.ts".into()],
            "main",
        );
        let b = make_issue(
            "ENOENT: /Users/bob/repo/src/index.ts not found",
            vec!["src/index.ts".into()],
            "main",
        );
        assert_eq!(compute_fingerprint(&a), compute_fingerprint(&b));
    }

    #[test]
    fn different_tool_name_changes_fingerprint() {
        let mut a = make_issue("boom", vec![], "main");
        let mut b = a.clone();
        a.tool_name = "Bash".to_string();
        b.tool_name = "Write".to_string();
        assert_ne!(compute_fingerprint(&a), compute_fingerprint(&b));
    }

    #[test]
    fn find_duplicate_matches_by_fingerprint() {
        let mut issue = make_issue("boom", vec![], "main");
        issue.fingerprint = compute_fingerprint(&issue);
        let existing = vec![issue.clone()];

        let mut new_issue = make_issue("boom", vec![], "main");
        new_issue.fingerprint = compute_fingerprint(&new_issue);

        assert!(find_duplicate(&new_issue, &existing).is_some());
    }
}
