//! Pre-tool knowledge-pattern matcher (C12), ported from
//! `hooks/fingerprint-matcher.py`'s `_load_converged_patterns` /
//! `_check_tool_input_matches`.
//!
//! Checks whether a tool invocation's input text overlaps keywords from a
//! previously converged error, so a proactive warning can point the session
//! at a cached fix before it re-derives the same root cause.

use std::collections::HashSet;

use serde_json::Value;

use crate::config::Config;
use crate::knowledge_bridge::read_knowledge_table;
use crate::store;

const COMMON_WORDS: &[&str] = &["tool", "failed", "error", "the", "with", "from", "that"];
const MIN_WORD_LEN: usize = 3;

#[derive(Debug, Clone)]
pub struct KnownPattern {
    pub error_pattern: String,
    pub fix: String,
}

/// Load known patterns: prefer the compact `CLAUDE.md` knowledge table,
/// falling back to a direct `issues.jsonl` scan when it's empty or missing
/// (e.g. convergence has run but the bridge write failed).
pub fn load_known_patterns(config: &Config) -> Vec<KnownPattern> {
    let from_claude_md: Vec<KnownPattern> = read_knowledge_table(config)
        .into_iter()
        .map(|entry| KnownPattern {
            error_pattern: entry.error_pattern,
            fix: entry.fix,
        })
        .collect();
    if !from_claude_md.is_empty() {
        return from_claude_md;
    }

    store::read_all(&config.issues_path())
        .unwrap_or_default()
        .into_iter()
        .filter(|issue| issue.get("status").and_then(Value::as_str) == Some("converged"))
        .map(|issue| {
            let description = issue.get("description").and_then(Value::as_str).unwrap_or("");
            KnownPattern {
                error_pattern: description.chars().take(100).collect(),
                fix: "See convergence report".to_string(),
            }
        })
        .collect()
}

fn error_keywords(error_pattern: &str) -> HashSet<String> {
    error_pattern
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.len() > MIN_WORD_LEN && !COMMON_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Simple keyword-overlap heuristic: a pattern matches the tool input text
/// when at least a third of its meaningful error words (minimum one) appear
/// in it.
pub fn find_matches<'a>(input_text: &str, patterns: &'a [KnownPattern]) -> Vec<&'a KnownPattern> {
    let input_lower = input_text.to_lowercase();
    patterns
        .iter()
        .filter(|pattern| {
            let words = error_keywords(&pattern.error_pattern);
            if words.is_empty() {
                return false;
            }
            let overlap = words.iter().filter(|w| input_lower.contains(w.as_str())).count();
            overlap >= std::cmp::max(1, words.len() / 3)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(error_pattern: &str) -> KnownPattern {
        KnownPattern {
            error_pattern: error_pattern.to_string(),
            fix: "reinstall the dependency".to_string(),
        }
    }

    #[test]
    fn matches_on_keyword_overlap() {
        let patterns = vec![pattern("ENOENT missing module dependency")];
        let matches = find_matches("npm error enoent missing module xyz", &patterns);
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn no_match_when_overlap_too_sparse() {
        let patterns = vec![pattern("ENOENT missing module dependency resolution")];
        let matches = find_matches("completely unrelated text here", &patterns);
        assert!(matches.is_empty());
    }

    #[test]
    fn empty_error_pattern_never_matches() {
        let patterns = vec![pattern("")];
        let matches = find_matches("anything at all", &patterns);
        assert!(matches.is_empty());
    }

    #[test]
    fn common_words_are_excluded_from_keyword_set() {
        let words = error_keywords("the tool failed with error from that");
        assert!(words.is_empty());
    }
}
