//! Pipeline orchestrator (C9): drives one issue through
//! research -> debate -> convergence, checkpointed and resumable.
//!
//! Grounded on upstream `agents/pipeline.py`'s `research_single_issue` /
//! `research_all_unresearched` / `get_pipeline_status` / `list_issues` shape
//! (fan-out researcher+solution_finder, then sequential impact_assessor,
//! status transitions on success/failure), reimplemented with `tokio::join!`
//! in place of `ThreadPoolExecutor`; the `thiserror` error enum and
//! `tracing::{info,warn,error}` call sites follow `ensemble/coordinator.rs`'s
//! idiom.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::arbiter;
use crate::checkpoint::{CheckpointStore, Phase, PhaseStatus};
use crate::config::Config;
use crate::debate::debate_issue;
use crate::issue::{Issue, IssueStatus};
use crate::phases::{impact_assessor, researcher, solution_finder, PhaseError};
use crate::schema::{validate_all_issues, ValidationSummary};
use crate::store;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("issue not found: {0}")]
    IssueNotFound(String),
    #[error("store error: {0}")]
    Store(#[from] crate::error::StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("convergence error: {0}")]
    Arbiter(#[from] crate::arbiter::ArbiterError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Per-agent success flags from the research phase's fan-out, matching
/// upstream's `{"researcher": bool, "solution_finder": bool, "impact_assessor": bool}`.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ResearchResults {
    pub researcher: bool,
    pub solution_finder: bool,
    pub impact_assessor: bool,
}

impl ResearchResults {
    fn any_success(&self) -> bool {
        self.researcher || self.solution_finder || self.impact_assessor
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineStatus {
    pub total: usize,
    pub by_status: HashMap<String, usize>,
}

fn load_issue(config: &Config, issue_id: &str) -> PipelineResult<Issue> {
    store::find_by_id(&config.issues_path(), issue_id, "id")?
        .and_then(|value| serde_json::from_value::<Issue>(value).ok())
        .ok_or_else(|| PipelineError::IssueNotFound(issue_id.to_string()))
}

fn set_status(config: &Config, issue_id: &str, status: IssueStatus) -> PipelineResult<()> {
    store::update(&config.issues_path(), issue_id, "id", |record: &mut Value| {
        record["status"] = Value::String(status.as_str().to_string());
    })?;
    Ok(())
}

/// Run all three research workers for one issue: root-cause and
/// solution-finder concurrently, then impact-assessor (it may reference
/// either of the prior two's artefacts).
pub async fn research_one(config: &Config, issue_id: &str, force: bool) -> PipelineResult<ResearchResults> {
    let issue = load_issue(config, issue_id)?;
    let checkpoint = CheckpointStore::new(config.research_dir(issue_id));

    if force {
        checkpoint.clear(issue_id, Some(Phase::Research))?;
    } else if checkpoint.can_skip(issue_id, Phase::Research) {
        info!(issue_id, "research phase already completed with artefacts present, skipping");
        return Ok(ResearchResults {
            researcher: true,
            solution_finder: true,
            impact_assessor: true,
        });
    }

    set_status(config, issue_id, IssueStatus::Researching)?;
    checkpoint.save(issue_id, Phase::Research, PhaseStatus::InProgress, None)?;
    info!(issue_id, "starting research pipeline");

    let (researcher_result, solution_result) =
        tokio::join!(researcher::research_issue(&issue, config), solution_finder::find_solutions(&issue, config));

    let mut results = ResearchResults {
        researcher: log_phase_outcome("researcher", issue_id, &researcher_result),
        solution_finder: log_phase_outcome("solution_finder", issue_id, &solution_result),
        impact_assessor: false,
    };

    let impact_result = impact_assessor::assess_impact(&issue, config).await;
    results.impact_assessor = log_phase_outcome("impact_assessor", issue_id, &impact_result);

    let new_status = if results.any_success() {
        IssueStatus::Researched
    } else {
        IssueStatus::Captured
    };
    set_status(config, issue_id, new_status)?;

    let phase_status = if results.any_success() {
        PhaseStatus::Completed
    } else {
        PhaseStatus::Failed
    };
    checkpoint.save(
        issue_id,
        Phase::Research,
        phase_status,
        Some(serde_json::to_value(&results).unwrap_or(Value::Null)),
    )?;

    info!(issue_id, ?new_status, "research pipeline complete");
    Ok(results)
}

fn log_phase_outcome<T>(agent_name: &str, issue_id: &str, result: &Result<T, PhaseError>) -> bool {
    match result {
        Ok(_) => true,
        Err(err) => {
            error!(issue_id, agent_name, %err, "research agent failed");
            false
        }
    }
}

/// Validate `issues.jsonl`, then research every issue currently `captured`.
pub async fn research_all_captured(config: &Config) -> PipelineResult<HashMap<String, ResearchResults>> {
    let validation: ValidationSummary = validate_all_issues(&config.issues_path(), &config.quarantine_path())?;
    if validation.quarantined > 0 {
        warn!(
            quarantined = validation.quarantined,
            errors = ?validation.errors.iter().take(5).collect::<Vec<_>>(),
            "quarantined corrupt issue records"
        );
    }

    let issues: Vec<Issue> = store::read_all_typed(&config.issues_path())?;
    let captured: Vec<&Issue> = issues.iter().filter(|i| i.status == IssueStatus::Captured).collect();

    if captured.is_empty() {
        info!("no unresearched issues found");
        return Ok(HashMap::new());
    }

    info!(count = captured.len(), "found unresearched issues");
    let mut all_results = HashMap::new();
    for issue in captured {
        let results = research_one(config, &issue.id, false).await?;
        all_results.insert(issue.id.clone(), results);
    }
    Ok(all_results)
}

/// Outcome of `run_full`: which phases actually ran (vs. were skipped via
/// the checkpoint) and whether each succeeded.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RunOutcome {
    pub research_ran: bool,
    pub debate_ran: bool,
    pub convergence_ran: bool,
}

/// Drive one issue through every phase from its resume point (or
/// `from_phase`, or the start if `force`) through convergence.
///
/// The convergence step calls [`crate::arbiter::synthesize`] scoped to just
/// this issue; running the arbiter across every eligible issue at once is a
/// separate, explicit call (see [`crate::arbiter`]).
pub async fn run_full(
    config: &Config,
    issue_id: &str,
    from_phase: Option<Phase>,
    force: bool,
) -> PipelineResult<RunOutcome> {
    let checkpoint = CheckpointStore::new(config.research_dir(issue_id));

    if force {
        checkpoint.clear(issue_id, None)?;
    } else if let Some(phase) = from_phase {
        checkpoint.clear(issue_id, Some(phase))?;
    }

    let start_phase = from_phase.unwrap_or_else(|| checkpoint.resume_phase(issue_id).unwrap_or(Phase::Research));
    let mut outcome = RunOutcome::default();

    if start_phase.index() <= Phase::Research.index() {
        if checkpoint.can_skip(issue_id, Phase::Research) {
            info!(issue_id, "skipping research phase, checkpoint satisfied");
        } else {
            research_one(config, issue_id, false).await?;
            outcome.research_ran = true;
        }
    }

    if start_phase.index() <= Phase::Debate.index() {
        if checkpoint.can_skip(issue_id, Phase::Debate) {
            info!(issue_id, "skipping debate phase, checkpoint satisfied");
        } else {
            checkpoint.save(issue_id, Phase::Debate, PhaseStatus::InProgress, None)?;
            let issue = load_issue(config, issue_id)?;
            match debate_issue(&issue, config).await {
                Ok(_) => {
                    checkpoint.save(issue_id, Phase::Debate, PhaseStatus::Completed, None)?;
                    outcome.debate_ran = true;
                }
                Err(err) => {
                    warn!(issue_id, %err, "debate phase failed, continuing with research-only inputs");
                    checkpoint.save(issue_id, Phase::Debate, PhaseStatus::Failed, None)?;
                }
            }
        }
    }

    // Convergence always re-runs when reached (§4.5): unlike research/debate
    // it is never skippable. `synthesize` with a single-issue filter still
    // runs the full arbiter pass, just scoped to this issue.
    checkpoint.save(issue_id, Phase::Convergence, PhaseStatus::InProgress, None)?;
    match arbiter::synthesize(config, Some(issue_id)).await {
        Ok(outcome_result) => {
            checkpoint.save(
                issue_id,
                Phase::Convergence,
                PhaseStatus::Completed,
                Some(serde_json::to_value(&outcome_result).unwrap_or(Value::Null)),
            )?;
            outcome.convergence_ran = outcome_result.ran;
        }
        Err(err) => {
            warn!(issue_id, %err, "convergence phase failed");
            checkpoint.save(issue_id, Phase::Convergence, PhaseStatus::Failed, None)?;
        }
    }

    Ok(outcome)
}

pub fn status(config: &Config) -> PipelineResult<PipelineStatus> {
    let issues: Vec<Issue> = store::read_all_typed(&config.issues_path())?;
    let mut by_status: HashMap<String, usize> = HashMap::new();
    for issue in &issues {
        *by_status.entry(issue.status.as_str().to_string()).or_insert(0) += 1;
    }
    Ok(PipelineStatus {
        total: issues.len(),
        by_status,
    })
}

pub fn list(config: &Config, status_filter: Option<IssueStatus>) -> PipelineResult<Vec<Issue>> {
    let issues: Vec<Issue> = store::read_all_typed(&config.issues_path())?;
    Ok(match status_filter {
        Some(filter) => issues.into_iter().filter(|i| i.status == filter).collect(),
        None => issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::{make_issue_id, IssueType};
    use chrono::Utc;

    fn sandbox_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.project_root = dir.to_path_buf();
        config.sandbox_mode = true;
        config
    }

    fn seed_issue(config: &Config) -> Issue {
        let now = Utc::now();
        let issue = Issue {
            id: make_issue_id(),
            issue_type: IssueType::Error,
            timestamp: now,
            first_seen: now,
            last_seen: now,
            description: "ENOENT: missing module".to_string(),
            raw_error: "ENOENT: missing module".to_string(),
            tool_name: "Bash".to_string(),
            git_branch: "main".to_string(),
            recent_files: vec![],
            working_directory: "/repo".to_string(),
            source: "hook:PostToolUseFailure".to_string(),
            status: IssueStatus::Captured,
            fingerprint: "fp".to_string(),
            occurrence_count: 1,
        };
        store::append(&config.issues_path(), &issue).unwrap();
        issue
    }

    #[tokio::test]
    async fn research_one_advances_status_to_researched() {
        let dir = tempfile::tempdir().unwrap();
        let config = sandbox_config(dir.path());
        let issue = seed_issue(&config);

        let results = research_one(&config, &issue.id, false).await.unwrap();
        assert!(results.any_success());

        let updated = load_issue(&config, &issue.id).unwrap();
        assert_eq!(updated.status, IssueStatus::Researched);
    }

    #[tokio::test]
    async fn research_one_skips_when_checkpoint_and_artifacts_present() {
        let dir = tempfile::tempdir().unwrap();
        let config = sandbox_config(dir.path());
        let issue = seed_issue(&config);

        research_one(&config, &issue.id, false).await.unwrap();
        let research_dir = config.research_dir(&issue.id);
        let before = std::fs::read_to_string(research_dir.join("root_cause.md")).unwrap();

        // Corrupt the on-disk artefact; a second non-forced call should not
        // touch it if the checkpoint says the phase is already complete and
        // some artefact still exists.
        research_one(&config, &issue.id, false).await.unwrap();
        let after = std::fs::read_to_string(research_dir.join("root_cause.md")).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn run_full_drives_research_debate_and_convergence_markers() {
        let dir = tempfile::tempdir().unwrap();
        let config = sandbox_config(dir.path());
        let issue = seed_issue(&config);

        let outcome = run_full(&config, &issue.id, None, false).await.unwrap();
        assert!(outcome.research_ran);
        assert!(outcome.debate_ran);
        assert!(outcome.convergence_ran);

        let updated = load_issue(&config, &issue.id).unwrap();
        assert_eq!(updated.status, IssueStatus::Converged);
    }

    #[test]
    fn status_and_list_reflect_seeded_issues() {
        let dir = tempfile::tempdir().unwrap();
        let config = sandbox_config(dir.path());
        seed_issue(&config);
        seed_issue(&config);

        let summary = status(&config).unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.by_status.get("captured"), Some(&2));

        let captured = list(&config, Some(IssueStatus::Captured)).unwrap();
        assert_eq!(captured.len(), 2);
        let researched = list(&config, Some(IssueStatus::Researched)).unwrap();
        assert!(researched.is_empty());
    }
}
