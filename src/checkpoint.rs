//! Per-issue checkpoint store (C5).
//!
//! Ports `agents/checkpoint.py` verbatim: a phase-name -> status map plus an
//! append-only trajectory, written as `data/research/{issue_id}/checkpoint.json`.
//! Trajectory entries are tagged events, matching the teacher's
//! `events/types.rs` tagged-event idiom rather than a loosely-typed dict.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The three phases of one issue's pipeline, in execution order.
pub const PIPELINE_PHASES: [Phase; 3] = [Phase::Research, Phase::Debate, Phase::Convergence];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Research,
    Debate,
    Convergence,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Debate => "debate",
            Self::Convergence => "convergence",
        }
    }

    pub fn index(self) -> usize {
        PIPELINE_PHASES.iter().position(|p| *p == self).unwrap()
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub status: PhaseStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// One append-only trajectory entry. `phase` is `"all"` for a full clear,
/// matching upstream's sentinel, rather than a variant of [`Phase`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryEntry {
    pub phase: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub issue_id: String,
    #[serde(default)]
    pub phases: std::collections::HashMap<String, PhaseRecord>,
    #[serde(default)]
    pub trajectory: Vec<TrajectoryEntry>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Checkpoint {
    fn empty(issue_id: &str) -> Self {
        let now = Utc::now();
        Self {
            issue_id: issue_id.to_string(),
            phases: std::collections::HashMap::new(),
            trajectory: Vec::new(),
            created_at: now,
            last_updated: now,
        }
    }

    pub fn phase_status(&self, phase: Phase) -> Option<PhaseStatus> {
        self.phases.get(phase.as_str()).map(|r| r.status)
    }

    pub fn is_completed(&self, phase: Phase) -> bool {
        self.phase_status(phase) == Some(PhaseStatus::Completed)
    }
}

pub struct CheckpointStore {
    research_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(research_dir: impl Into<PathBuf>) -> Self {
        Self {
            research_dir: research_dir.into(),
        }
    }

    fn checkpoint_path(&self) -> PathBuf {
        self.research_dir.join("checkpoint.json")
    }

    /// Load the checkpoint, or an empty one if none exists or the file is
    /// corrupt (a corrupt checkpoint is treated as empty per §7).
    pub fn load(&self, issue_id: &str) -> Checkpoint {
        let path = self.checkpoint_path();
        let Ok(text) = std::fs::read_to_string(&path) else {
            return Checkpoint::empty(issue_id);
        };
        serde_json::from_str(&text).unwrap_or_else(|_| Checkpoint::empty(issue_id))
    }

    fn write(&self, checkpoint: &Checkpoint) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.research_dir)?;
        let text = serde_json::to_string_pretty(checkpoint)?;
        std::fs::write(self.checkpoint_path(), text)
    }

    /// Record a phase's status and append the corresponding trajectory entry.
    pub fn save(
        &self,
        issue_id: &str,
        phase: Phase,
        status: PhaseStatus,
        details: Option<Value>,
    ) -> std::io::Result<()> {
        let mut checkpoint = self.load(issue_id);
        let now = Utc::now();

        checkpoint.phases.insert(
            phase.as_str().to_string(),
            PhaseRecord {
                status,
                timestamp: now,
                details: details.clone(),
            },
        );
        checkpoint.last_updated = now;
        checkpoint.trajectory.push(TrajectoryEntry {
            phase: phase.as_str().to_string(),
            status: status.as_str().to_string(),
            timestamp: now,
            details,
        });

        self.write(&checkpoint)
    }

    /// True iff `phase` is recorded `completed` AND its expected output
    /// files exist on disk (deleting an artefact disables skipping).
    /// Convergence is never skippable — it always re-aggregates.
    pub fn can_skip(&self, issue_id: &str, phase: Phase) -> bool {
        if phase == Phase::Convergence {
            return false;
        }
        if !self.load(issue_id).is_completed(phase) {
            return false;
        }

        match phase {
            Phase::Research => ["root_cause.md", "solutions.md", "impact.md"]
                .iter()
                .any(|f| self.research_dir.join(f).exists()),
            Phase::Debate => self.research_dir.join("debate.md").exists(),
            Phase::Convergence => false,
        }
    }

    /// Clear checkpoint state from `from_phase` onward (inclusive), or
    /// everything if `None`. Appends a clearing event — history is never lost.
    pub fn clear(&self, issue_id: &str, from_phase: Option<Phase>) -> std::io::Result<()> {
        let mut checkpoint = self.load(issue_id);
        let now = Utc::now();

        match from_phase {
            None => {
                checkpoint.phases.clear();
                checkpoint.last_updated = now;
                checkpoint.trajectory.push(TrajectoryEntry {
                    phase: "all".to_string(),
                    status: "cleared".to_string(),
                    timestamp: now,
                    details: None,
                });
            }
            Some(phase) => {
                let cleared: Vec<&'static str> = PIPELINE_PHASES[phase.index()..]
                    .iter()
                    .map(|p| p.as_str())
                    .collect();
                for name in &cleared {
                    checkpoint.phases.remove(*name);
                }
                checkpoint.last_updated = now;
                checkpoint.trajectory.push(TrajectoryEntry {
                    phase: phase.as_str().to_string(),
                    status: "cleared_from".to_string(),
                    timestamp: now,
                    details: Some(serde_json::json!({ "cleared_phases": cleared })),
                });
            }
        }

        self.write(&checkpoint)
    }

    /// The earliest pipeline phase not yet completed, or `None` if all are.
    pub fn resume_phase(&self, issue_id: &str) -> Option<Phase> {
        let checkpoint = self.load(issue_id);
        PIPELINE_PHASES
            .into_iter()
            .find(|phase| !checkpoint.is_completed(*phase))
    }

    pub fn trajectory(&self, issue_id: &str) -> Vec<TrajectoryEntry> {
        self.load(issue_id).trajectory
    }
}

pub fn research_dir_for(data_dir: &Path, issue_id: &str) -> PathBuf {
    data_dir.join("research").join(issue_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_records_phase_and_trajectory() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store
            .save("issue_1", Phase::Research, PhaseStatus::Completed, None)
            .unwrap();

        let checkpoint = store.load("issue_1");
        assert!(checkpoint.is_completed(Phase::Research));
        assert_eq!(checkpoint.trajectory.len(), 1);
    }

    #[test]
    fn can_skip_requires_status_and_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store
            .save("issue_1", Phase::Research, PhaseStatus::Completed, None)
            .unwrap();

        assert!(!store.can_skip("issue_1", Phase::Research));

        std::fs::write(dir.path().join("root_cause.md"), "content").unwrap();
        assert!(store.can_skip("issue_1", Phase::Research));

        std::fs::remove_file(dir.path().join("root_cause.md")).unwrap();
        assert!(!store.can_skip("issue_1", Phase::Research));
    }

    #[test]
    fn convergence_never_skippable() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store
            .save("issue_1", Phase::Convergence, PhaseStatus::Completed, None)
            .unwrap();
        assert!(!store.can_skip("issue_1", Phase::Convergence));
    }

    #[test]
    fn clear_from_phase_clears_downstream_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store
            .save("issue_1", Phase::Research, PhaseStatus::Completed, None)
            .unwrap();
        store
            .save("issue_1", Phase::Debate, PhaseStatus::Completed, None)
            .unwrap();

        store.clear("issue_1", Some(Phase::Debate)).unwrap();

        let checkpoint = store.load("issue_1");
        assert!(checkpoint.is_completed(Phase::Research));
        assert!(!checkpoint.is_completed(Phase::Debate));
    }

    #[test]
    fn resume_phase_finds_first_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert_eq!(store.resume_phase("issue_1"), Some(Phase::Research));

        store
            .save("issue_1", Phase::Research, PhaseStatus::Completed, None)
            .unwrap();
        assert_eq!(store.resume_phase("issue_1"), Some(Phase::Debate));
    }

    #[test]
    fn corrupt_checkpoint_file_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("checkpoint.json"), "{not json").unwrap();
        let store = CheckpointStore::new(dir.path());
        let checkpoint = store.load("issue_1");
        assert!(checkpoint.phases.is_empty());
    }
}
