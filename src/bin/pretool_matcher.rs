//! `PreToolUse` pattern matcher entrypoint (C12), ported from
//! `hooks/fingerprint-matcher.py`'s `main()`.
//!
//! Runs before `Bash`/`Execute` tool invocations. Checks the tool's input
//! against known error patterns from the `CLAUDE.md` knowledge table (or,
//! failing that, `issues.jsonl`'s converged records), emitting up to three
//! stderr warnings when a prior fix likely applies. Never blocks: the point
//! is to save a future research pass, not to gate the call.

use convergence_engine::config::Config;
use convergence_engine::logging::ActivityLog;
use convergence_engine::pattern_matcher::{find_matches, load_known_patterns};
use serde_json::Value;

const MAX_WARNINGS: usize = 3;

fn allow_and_exit() -> ! {
    println!("{}", serde_json::json!({"result": "allow"}));
    std::process::exit(0);
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

    let tool_name = payload.get("tool_name").and_then(Value::as_str).unwrap_or("").to_string();
    let tool_input = payload.get("tool_input").cloned().unwrap_or(Value::Null);
    let input_text = tool_input.to_string();

    let log = ActivityLog::new(&config.data_dir(), "PATTERN_MATCH", "pretool");

    let patterns = load_known_patterns(&config);
    if patterns.is_empty() {
        allow_and_exit();
    }

    let matches = find_matches(&input_text, &patterns);
    if !matches.is_empty() {
        for pattern in matches.iter().take(MAX_WARNINGS) {
            let fix = if pattern.fix.is_empty() {
                "See convergence report"
            } else {
                &pattern.fix
            };
            let error = if pattern.error_pattern.is_empty() {
                "unknown pattern"
            } else {
                &pattern.error_pattern
            };
            eprintln!("[convergence-engine] \u{26a0} Known error pattern detected: {error}\n  Cached fix: {fix}");
        }
        log.info(&format!("Pattern match: {} known pattern(s) for {tool_name}", matches.len()));
    }

    allow_and_exit();
}
