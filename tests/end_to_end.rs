//! Multi-component scenarios that cross module boundaries (S1-S6).
//!
//! Unit tests co-located with each module already cover component-level
//! behaviour; these exercise the public API the way a real hook/CLI
//! invocation sequence would, against a temp project root.

use std::path::Path;

use convergence_engine::checkpoint::{CheckpointStore, Phase, PhaseStatus};
use convergence_engine::config::Config;
use convergence_engine::fingerprint::compute_fingerprint;
use convergence_engine::issue::{make_issue_id, Issue, IssueStatus, IssueType};
use convergence_engine::{pipeline, store};

fn sandbox_config(project_root: &Path) -> Config {
    let mut config = Config::default();
    config.project_root = project_root.to_path_buf();
    config.sandbox_mode = true;
    config.min_issues_for_convergence = 1;
    config
}

fn sample_issue(id: &str, raw_error: &str, tool_name: &str) -> Issue {
    let now = chrono::Utc::now();
    let mut issue = Issue {
        id: id.to_string(),
        issue_type: IssueType::Error,
        timestamp: now,
        first_seen: now,
        last_seen: now,
        description: format!("Tool '{tool_name}' failed: {raw_error}"),
        raw_error: raw_error.to_string(),
        tool_name: tool_name.to_string(),
        git_branch: "main".to_string(),
        recent_files: vec!["src/lib.rs".to_string()],
        working_directory: "/workspace".to_string(),
        source: "hook:PostToolUseFailure".to_string(),
        status: IssueStatus::Captured,
        fingerprint: String::new(),
        occurrence_count: 1,
    };
    issue.fingerprint = compute_fingerprint(&issue);
    issue
}

/// S1 - a single capture on an empty corpus appends exactly one record.
#[test]
fn s1_single_occurrence_capture() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    let issue = sample_issue(&make_issue_id(), "npm ERR! Could not resolve dependency", "Bash");

    store::append(&config.issues_path(), &issue).unwrap();

    let all = store::read_all_typed::<Issue>(&config.issues_path()).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].occurrence_count, 1);
    assert_eq!(all[0].status, IssueStatus::Captured);
}

/// S2 - duplicate capture against an already-converged record increments
/// the canonical record's occurrence count instead of appending a new one.
#[test]
fn s2_duplicate_capture_short_circuits() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());

    let mut converged = sample_issue("issue_seed", "connection refused", "Bash");
    converged.status = IssueStatus::Converged;
    store::append(&config.issues_path(), &converged).unwrap();

    // Two more captures of the "same" underlying error.
    for _ in 0..2 {
        let candidate = sample_issue(&make_issue_id(), "connection refused", "Bash");
        let existing = store::read_all_typed::<Issue>(&config.issues_path()).unwrap();
        let duplicate = existing.iter().find(|i| i.fingerprint == candidate.fingerprint);
        match duplicate {
            Some(dup) => {
                let new_count = dup.occurrence_count + 1;
                store::update(&config.issues_path(), &dup.id, "id", |record| {
                    record["occurrence_count"] = serde_json::Value::from(new_count);
                })
                .unwrap();
            }
            None => store::append(&config.issues_path(), &candidate).unwrap(),
        }
    }

    let all = store::read_all_typed::<Issue>(&config.issues_path()).unwrap();
    assert_eq!(all.len(), 1, "no new record should have been created");
    assert_eq!(all[0].occurrence_count, 3);
    assert_eq!(all[0].status, IssueStatus::Converged);
}

/// S3 - two captures whose raw_error differs only in a home-directory path
/// fingerprint identically.
#[test]
fn s3_cosmetic_path_equivalence() {
    let a = sample_issue("issue_a", "ENOENT: /Users/alice/project/config.json not found", "Read");
    let b = sample_issue("issue_b", "ENOENT: /Users/bob/project/config.json not found", "Read");
    assert_eq!(a.fingerprint, b.fingerprint);
}

/// S4 - resuming a run whose checkpoint already records research as
/// completed (with artefacts present) skips straight to debate and
/// convergence, never re-running any research worker.
#[tokio::test]
async fn s4_resume_from_interruption_skips_completed_research() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    let issue = sample_issue("issue_resume", "permission denied writing to /etc/hosts", "Bash");
    store::append(&config.issues_path(), &issue).unwrap();

    let research_dir = config.research_dir(&issue.id);
    std::fs::create_dir_all(&research_dir).unwrap();
    std::fs::write(research_dir.join("root_cause.md"), "# Root cause\n\nprior run").unwrap();

    let checkpoint = CheckpointStore::new(research_dir.clone());
    checkpoint
        .save(&issue.id, Phase::Research, PhaseStatus::Completed, None)
        .unwrap();
    assert!(checkpoint.can_skip(&issue.id, Phase::Research));

    let outcome = pipeline::run_full(&config, &issue.id, None, false).await.unwrap();

    assert!(!outcome.research_ran, "research must not re-run when its checkpoint is satisfied");
    assert!(outcome.debate_ran, "debate should run since its own phase wasn't completed yet");
    assert!(outcome.convergence_ran);
}

/// S5 - when round 2 of the debate fails, the final debate.md is
/// byte-for-byte equal to round 1's output, and metrics are still written.
#[cfg(unix)]
#[tokio::test]
async fn s5_debate_round2_fallback_promotes_round1() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let bin_dir = dir.path().join("bin");
    std::fs::create_dir_all(&bin_dir).unwrap();
    let counter_path = dir.path().join("fake_claude_invocations");

    let script = format!(
        r#"#!/bin/sh
COUNT_FILE="{counter}"
if [ -f "$COUNT_FILE" ]; then
  COUNT=$(cat "$COUNT_FILE")
else
  COUNT=0
fi
COUNT=$((COUNT + 1))
echo "$COUNT" > "$COUNT_FILE"
cat > /dev/null
if [ "$COUNT" -eq 1 ]; then
  cat <<'JSON'
## Debate synthesis

===JSON_OUTPUT===
{{"agreements":["root cause is consistent"],"contradictions":[],"gaps":[],"revised_root_cause":"missing permission bit","revised_fix":"chmod the target","revised_priority":"P1","devil_advocate_challenges":[{{"claim":"fix works","challenge":"may not apply on windows","survived":true}}],"skeptic_concerns":[{{"concern":"untested on CI","severity":"high"}}],"confidence_after_debate":"high"}}
===JSON_OUTPUT_END===
JSON
  exit 0
else
  echo "round 2 exploded" 1>&2
  exit 7
fi
"#,
        counter = counter_path.display()
    );
    let fake_claude = bin_dir.join("claude");
    std::fs::write(&fake_claude, script).unwrap();
    let mut perms = std::fs::metadata(&fake_claude).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&fake_claude, perms).unwrap();

    let original_path = std::env::var("PATH").unwrap_or_default();
    std::env::set_var("PATH", format!("{}:{}", bin_dir.display(), original_path));

    let mut config = Config::default();
    config.project_root = dir.path().to_path_buf();
    config.sandbox_mode = false;
    config.budget.debate_rounds = 2;
    config.budget.timeout_seconds = 5;

    let issue = sample_issue("issue_round2", "permission denied writing to /etc/hosts", "Bash");
    store::append(&config.issues_path(), &issue).unwrap();
    let research_dir = config.research_dir(&issue.id);
    std::fs::create_dir_all(&research_dir).unwrap();
    std::fs::write(research_dir.join("root_cause.md"), "# Root cause\n\npermission bit missing").unwrap();

    let outcome = convergence_engine::debate::debate_issue(&issue, &config).await.unwrap();

    std::env::set_var("PATH", original_path);

    assert_eq!(outcome.rounds_run, 1, "round 2 failed, so only round 1 counts as having run");

    let final_debate = std::fs::read_to_string(research_dir.join("debate.md")).unwrap();
    let round1_debate = std::fs::read_to_string(research_dir.join("debate_round1.md")).unwrap();
    assert_eq!(final_debate, round1_debate);

    let metrics_raw = std::fs::read_to_string(research_dir.join("debate_metrics.json")).unwrap();
    let metrics: serde_json::Value = serde_json::from_str(&metrics_raw).unwrap();
    assert!(metrics["challenge_survival_rate"].is_number());
    assert_eq!(metrics["challenge_survival_rate"].as_f64().unwrap(), 1.0);
}

/// S6 - two consecutive knowledge-bridge writes preserve every byte of
/// user-owned content outside the markers and leave exactly one marker pair.
#[tokio::test]
async fn s6_bridge_idempotence_preserves_user_content() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());
    std::fs::create_dir_all(dir.path().join(".claude")).unwrap();

    let user_content = "# Project\n\nUser notes\n";
    std::fs::write(config.knowledge_doc_path(), user_content).unwrap();

    let mut issue = sample_issue("issue_kb", "connection refused talking to db", "Bash");
    issue.status = IssueStatus::Converged;
    store::append(&config.issues_path(), &issue).unwrap();

    convergence_engine::knowledge_bridge::refresh(&config).unwrap();
    convergence_engine::knowledge_bridge::refresh(&config).unwrap();

    let written = std::fs::read_to_string(config.knowledge_doc_path()).unwrap();
    assert!(written.starts_with(user_content.trim_end()));
    assert_eq!(written.matches("<!-- convergence-engine:start -->").count(), 1);
    assert_eq!(written.matches("<!-- convergence-engine:end -->").count(), 1);
}

/// End-to-end happy path: capture -> research -> debate -> converge, all
/// driven through sandboxed agents via a single `run_full` call, landing on
/// a converged status and a non-empty convergence report.
#[tokio::test]
async fn full_pipeline_converges_a_captured_issue() {
    let dir = tempfile::tempdir().unwrap();
    let config = sandbox_config(dir.path());

    let issue = sample_issue("issue_full", "TypeError: cannot read property of undefined", "Bash");
    store::append(&config.issues_path(), &issue).unwrap();

    let outcome = pipeline::run_full(&config, &issue.id, None, false).await.unwrap();
    assert!(outcome.research_ran);
    assert!(outcome.debate_ran);
    assert!(outcome.convergence_ran);

    let converged = pipeline::list(&config, Some(IssueStatus::Converged)).unwrap();
    assert_eq!(converged.len(), 1);

    let report = std::fs::read_to_string(config.output_dir().join("convergence.md")).unwrap();
    assert!(!report.trim().is_empty());
}
