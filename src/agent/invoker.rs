//! `claude -p` subprocess invocation, ported from `agents/runner.py::run_agent`.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::Config;
use crate::logging::ActivityLog;
use crate::sanitizer::sanitize_context;

use super::mock::{default_mock_response, AgentRole};
use super::{AgentError, AgentResult, Stage};

pub struct InvokeRequest<'a> {
    pub prompt: &'a str,
    pub stage: Stage,
    pub mock_role: AgentRole,
    pub config: &'a Config,
    pub log: &'a ActivityLog,
    pub timeout_override: Option<u64>,
}

/// Run one agent turn. In sandbox mode this never touches the filesystem or
/// network; otherwise it spawns `claude -p`, feeding `prompt` on stdin and
/// capturing stdout until exit or timeout.
pub async fn invoke(request: InvokeRequest<'_>) -> AgentResult {
    if request.config.sandbox_mode {
        request.log.info("Sandbox mode: returning mock response");
        let mock = default_mock_response(request.mock_role);
        return AgentResult::success(mock.to_string());
    }

    let sanitized_prompt = sanitize_context(request.prompt, &request.config.sanitizer);
    let model = request.config.model_for_stage(request.stage.as_str());
    let timeout_secs = request
        .timeout_override
        .unwrap_or(request.config.budget.timeout_seconds);

    let mut cmd = Command::new("claude");
    cmd.arg("-p");
    if model != "default" {
        cmd.arg("--model").arg(&model);
    }
    cmd.current_dir(&request.config.project_root);
    cmd.env("CLAUDE_PROJECT_DIR", &request.config.project_root);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    request.log.info(&format!(
        "Spawning agent subprocess (model={model}, timeout={timeout_secs}s, prompt_length={})",
        sanitized_prompt.len()
    ));

    let spawn_result = cmd.spawn();
    let mut child = match spawn_result {
        Ok(child) => child,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            request.log.error("Claude CLI not found. Is Claude Code installed and in PATH?");
            return AgentResult::failure(AgentError::BinaryNotFound.to_string(), false);
        }
        Err(err) => {
            request.log.error(&format!("Unexpected error spawning agent: {err}"));
            return AgentResult::failure(AgentError::Io(err).to_string(), false);
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(err) = stdin.write_all(sanitized_prompt.as_bytes()).await {
            request.log.error(&format!("Failed to write prompt to agent stdin: {err}"));
            return AgentResult::failure(AgentError::Io(err).to_string(), false);
        }
    }

    let run = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await;

    match run {
        Err(_) => {
            request.log.error(&format!("Agent timed out after {timeout_secs}s"));
            AgentResult::failure(AgentError::Timeout(timeout_secs).to_string(), true)
        }
        Ok(Err(err)) => {
            request.log.error(&format!("Unexpected error waiting for agent: {err}"));
            AgentResult::failure(AgentError::Io(err).to_string(), false)
        }
        Ok(Ok(output)) => {
            if output.status.success() {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                request
                    .log
                    .info(&format!("Agent completed successfully (output_length={})", stdout.len()));
                AgentResult::success(stdout)
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let code = output.status.code().unwrap_or(-1);
                let message = if stderr.is_empty() {
                    format!("Exit code {code}")
                } else {
                    stderr
                };
                request.log.error(&format!("Agent subprocess failed: {message}"));
                AgentResult::failure(AgentError::NonZeroExit(code, message).to_string(), false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::AgentRole;

    fn sandbox_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.project_root = dir.to_path_buf();
        config.sandbox_mode = true;
        config
    }

    #[tokio::test]
    async fn sandbox_mode_returns_mock_without_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let config = sandbox_config(dir.path());
        let log = ActivityLog::new(&config.data_dir(), "issue_1", "research");

        let result = invoke(InvokeRequest {
            prompt: "investigate this failure",
            stage: Stage::Research,
            mock_role: AgentRole::Researcher,
            config: &config,
            log: &log,
            timeout_override: None,
        })
        .await;

        assert!(result.ok);
        assert!(result.structured.is_some());
        assert!(result.markdown_output().contains("Hypothesis"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_surfaced_with_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bin_dir = dir.path().join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        let fake_claude = bin_dir.join("claude");
        std::fs::write(&fake_claude, "#!/bin/sh\necho boom 1>&2\nexit 3\n").unwrap();
        let mut perms = std::fs::metadata(&fake_claude).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&fake_claude, perms).unwrap();

        let mut config = sandbox_config(dir.path());
        config.sandbox_mode = false;
        let log = ActivityLog::new(&config.data_dir(), "issue_1", "research");

        let original_path = std::env::var("PATH").unwrap_or_default();
        std::env::set_var("PATH", format!("{}:{}", bin_dir.display(), original_path));

        let result = invoke(InvokeRequest {
            prompt: "prompt",
            stage: Stage::Research,
            mock_role: AgentRole::Researcher,
            config: &config,
            log: &log,
            timeout_override: Some(5),
        })
        .await;

        std::env::set_var("PATH", original_path);

        assert!(!result.ok);
        assert!(result.error.unwrap().contains("boom"));
    }
}
