//! `SessionEnd` convergence trigger (C10 entry point), ported from
//! `hooks/convergence-synthesizer.py`.
//!
//! Runs ONLY on session end, never per-error: checks whether
//! `auto_converge_on_session_end` is set and, if so, synthesizes every
//! eligible issue into a convergence report. Always allows the session to
//! end regardless of outcome.

use convergence_engine::arbiter::synthesize;
use convergence_engine::config::Config;
use convergence_engine::logging::ActivityLog;
use serde_json::Value;

fn allow_and_exit() -> ! {
    println!("{}", serde_json::json!({"result": "allow"}));
    std::process::exit(0);
}

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(_) => allow_and_exit(),
    };

    if !config.enabled {
        allow_and_exit();
    }
    if !config.auto_converge_on_session_end {
        allow_and_exit();
    }

    let log = ActivityLog::new(&config.data_dir(), "SESSION_END", "pipeline");
    log.info("Session ending -- checking for unconverged issues");

    // SessionEnd payloads may be empty; we don't act on their contents, but
    // stdin is still drained so the hook framework doesn't see a broken pipe.
    let _payload: Value = serde_json::from_reader(std::io::stdin()).unwrap_or(Value::Null);

    match synthesize(&config, None).await {
        Ok(outcome) if outcome.ran => {
            log.info(&format!(
                "Auto-convergence completed successfully on session end ({} issues, {} tasks)",
                outcome.issue_count, outcome.task_count
            ));
        }
        Ok(_) => {
            log.info("No issues eligible for convergence at session end");
        }
        Err(err) => {
            log.error(&format!("Auto-convergence failed: {err}"));
        }
    }

    allow_and_exit();
}
