//! Security sanitiser (C1).
//!
//! Strips secrets, filesystem paths, and usernames from text and records
//! before they reach any LLM or shared storage. Ported rule-for-rule from
//! `agents/sanitizer.py`: tokens/env-secrets first (most critical), then
//! paths (preserving the basename), then usernames.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::config::SanitizerConfig;

struct Patterns {
    tokens: Vec<Regex>,
    env: Vec<Regex>,
    paths: Vec<Regex>,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        tokens: vec![
            Regex::new(r"(?i)sk-[a-zA-Z0-9]{20,}").unwrap(),
            Regex::new(r"(?i)sk-ant-[a-zA-Z0-9\-]{20,}").unwrap(),
            Regex::new(r"(?i)AKIA[0-9A-Z]{16}").unwrap(),
            Regex::new(r"(?i)aws_secret_access_key\s*=\s*\S+").unwrap(),
            Regex::new(r"(?i)ghp_[a-zA-Z0-9]{36,}").unwrap(),
            Regex::new(r"(?i)gho_[a-zA-Z0-9]{36,}").unwrap(),
            Regex::new(r"(?i)glpat-[a-zA-Z0-9\-]{20,}").unwrap(),
            Regex::new(r"(?i)xoxb-[a-zA-Z0-9\-]{20,}").unwrap(),
            Regex::new(r"(?i)xoxp-[a-zA-Z0-9\-]{20,}").unwrap(),
            Regex::new(r"eyJ[a-zA-Z0-9_\-]{10,}\.eyJ[a-zA-Z0-9_\-]{10,}\.[a-zA-Z0-9_\-]+").unwrap(),
            Regex::new(
                r#"(?i)(API_KEY|SECRET|TOKEN|PASSWORD|PRIVATE_KEY|ACCESS_KEY)\s*[=:]\s*['"]?\S{8,}['"]?"#,
            )
            .unwrap(),
        ],
        env: vec![Regex::new(
            r"(?i)(?:export\s+)?(?:DATABASE_URL|DB_PASSWORD|REDIS_URL|SUPABASE_KEY|STRIPE_SECRET|NEXTAUTH_SECRET|JWT_SECRET|ENCRYPTION_KEY|PRIVATE_KEY|SSH_KEY)\s*=\s*\S+",
        )
        .unwrap()],
        paths: vec![
            Regex::new(r#"(?i)(/Users/[^\s:"']+)"#).unwrap(),
            Regex::new(r#"(?i)(/home/[^\s:"']+)"#).unwrap(),
            Regex::new(r#"(?i)([A-Z]:\\Users\\[^\s:"']+)"#).unwrap(),
            Regex::new(r#"(?i)(/var/[^\s:"']+)"#).unwrap(),
            Regex::new(r#"(?i)(/tmp/[^\s:"']+)"#).unwrap(),
            Regex::new(r#"(?i)(/opt/[^\s:"']+)"#).unwrap(),
            Regex::new(r#"(?i)(/etc/[^\s:"']+)"#).unwrap(),
        ],
    })
}

fn current_username() -> Option<String> {
    for var in ["USER", "USERNAME", "LOGNAME"] {
        if let Ok(value) = std::env::var(var) {
            if value.len() >= 3 {
                return Some(value);
            }
        }
    }
    None
}

fn username_pattern() -> &'static Option<Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| {
        current_username().map(|name| {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&name))).expect("valid regex")
        })
    })
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Strip sensitive data from a single text blob per the configured rules.
pub fn sanitize_context(text: &str, config: &SanitizerConfig) -> String {
    if text.is_empty() || !config.enabled {
        return text.to_string();
    }

    let mut result = text.to_string();
    let pats = patterns();

    if config.strip_tokens {
        for pattern in &pats.tokens {
            result = pattern.replace_all(&result, "[TOKEN_REDACTED]").into_owned();
        }
        for pattern in &pats.env {
            result = pattern.replace_all(&result, "[ENV_REDACTED]").into_owned();
        }
    }

    if config.strip_paths {
        for pattern in &pats.paths {
            result = pattern
                .replace_all(&result, |caps: &regex::Captures| {
                    let path = &caps[1];
                    let base = basename(path);
                    if base.is_empty() {
                        "[PATH_REDACTED]".to_string()
                    } else {
                        format!("[PATH_REDACTED]/{base}")
                    }
                })
                .into_owned();
        }
    }

    if config.strip_usernames {
        if let Some(pattern) = username_pattern() {
            result = pattern.replace_all(&result, "[USER_REDACTED]").into_owned();
        }
    }

    result
}

/// Recursively sanitise every string value in a JSON record.
pub fn sanitize_record(value: &Value, config: &SanitizerConfig) -> Value {
    if !config.enabled {
        return value.clone();
    }
    sanitize_value(value, config)
}

fn sanitize_value(value: &Value, config: &SanitizerConfig) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_context(s, config)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), sanitize_value(v, config)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| sanitize_value(item, config)).collect())
        }
        other => other.clone(),
    }
}

/// Check if text contains any sensitive pattern, without modifying it.
pub fn is_sensitive(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let pats = patterns();
    if pats.tokens.iter().any(|p| p.is_match(text)) {
        return true;
    }
    if pats.env.iter().any(|p| p.is_match(text)) {
        return true;
    }
    if pats.paths.iter().any(|p| p.is_match(text)) {
        return true;
    }
    if let Some(pattern) = username_pattern() {
        if pattern.is_match(text) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config() -> SanitizerConfig {
        SanitizerConfig {
            enabled: true,
            strip_paths: true,
            strip_tokens: true,
            strip_usernames: true,
        }
    }

    #[test]
    fn redacts_openai_key() {
        let text = "key is sk-abcdefghijklmnopqrstuvwxyz1234567890";
        let out = sanitize_context(text, &enabled_config());
        assert!(out.contains("[TOKEN_REDACTED]"));
        assert!(!out.contains("sk-abcdefghijklmnopqrstuvwxyz1234567890"));
    }

    #[test]
    fn redacts_path_but_keeps_basename() {
        let text = "failed to read /Users/alice/projects/app/src/main.rs";
        let out = sanitize_context(text, &enabled_config());
        assert!(out.contains("[PATH_REDACTED]/main.rs"));
    }

    #[test]
    fn idempotent() {
        let text = "token sk-abcdefghijklmnopqrstuvwxyz1234567890 at /home/bob/x.py";
        let config = enabled_config();
        let once = sanitize_context(text, &config);
        let twice = sanitize_context(&once, &config);
        assert_eq!(once, twice);
    }

    #[test]
    fn disabled_config_is_noop() {
        let config = SanitizerConfig {
            enabled: false,
            ..enabled_config()
        };
        let text = "sk-abcdefghijklmnopqrstuvwxyz1234567890";
        assert_eq!(sanitize_context(text, &config), text);
    }

    #[test]
    fn sanitize_record_walks_nested_structures() {
        let value = serde_json::json!({
            "description": "token sk-abcdefghijklmnopqrstuvwxyz1234567890",
            "nested": {"path": "/var/log/app/error.log"},
            "list": ["/opt/app/config.yaml", "fine"],
        });
        let out = sanitize_record(&value, &enabled_config());
        assert!(out["description"].as_str().unwrap().contains("[TOKEN_REDACTED]"));
        assert!(out["nested"]["path"]
            .as_str()
            .unwrap()
            .contains("[PATH_REDACTED]/error.log"));
        assert!(out["list"][0]
            .as_str()
            .unwrap()
            .contains("[PATH_REDACTED]/config.yaml"));
        assert_eq!(out["list"][1], "fine");
    }
}
