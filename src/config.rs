//! Configuration loading for the convergence engine.
//!
//! Mirrors `agents/config.py`'s `_DEFAULTS` + `_deep_merge` shape: a
//! `convergence` section of `config.json` at the project root is deep-merged
//! over built-in defaults, so a config file that only overrides one nested
//! field still gets defaults for everything else.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelMap {
    #[serde(default = "default_model")]
    pub research: String,
    #[serde(default = "default_model")]
    pub debate: String,
    #[serde(default = "default_model")]
    pub converge: String,
}

fn default_model() -> String {
    "default".to_string()
}

impl Default for ModelMap {
    fn default() -> Self {
        Self {
            research: default_model(),
            debate: default_model(),
            converge: default_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BudgetConfig {
    #[serde(default = "default_max_parallel")]
    pub max_parallel_agents: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_agent: u32,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_debate_rounds")]
    pub debate_rounds: u8,
    #[serde(default)]
    pub model_map: ModelMap,
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
}

fn default_max_parallel() -> usize {
    2
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_timeout() -> u64 {
    60
}
fn default_debate_rounds() -> u8 {
    1
}
fn default_fallback_model() -> String {
    "haiku".to_string()
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_parallel_agents: default_max_parallel(),
            max_tokens_per_agent: default_max_tokens(),
            timeout_seconds: default_timeout(),
            debate_rounds: default_debate_rounds(),
            model_map: ModelMap::default(),
            fallback_model: default_fallback_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SanitizerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub strip_paths: bool,
    #[serde(default = "default_true")]
    pub strip_tokens: bool,
    #[serde(default = "default_true")]
    pub strip_usernames: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strip_paths: true,
            strip_tokens: true,
            strip_usernames: true,
        }
    }
}

/// The `convergence` section of `config.json`, fully defaulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub auto_research: bool,
    #[serde(default = "default_true")]
    pub auto_converge_on_session_end: bool,
    #[serde(default = "default_min_issues")]
    pub min_issues_for_convergence: usize,
    #[serde(default)]
    pub sandbox_mode: bool,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub sanitizer: SanitizerConfig,

    /// Project root this config was resolved relative to; not part of
    /// `config.json` itself.
    #[serde(skip)]
    pub project_root: PathBuf,
}

fn default_min_issues() -> usize {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_research: true,
            auto_converge_on_session_end: true,
            min_issues_for_convergence: default_min_issues(),
            sandbox_mode: false,
            budget: BudgetConfig::default(),
            sanitizer: SanitizerConfig::default(),
            project_root: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Resolve the project root: `CONVERGENCE_PROJECT_ROOT` env var, else the
    /// current working directory, else `.` as a last resort.
    ///
    /// The CWD fallback is a retained compatibility behaviour (see
    /// DESIGN.md "Open Question (c)") — warn once so operators notice when
    /// the env var was expected but absent.
    pub fn resolve_project_root() -> PathBuf {
        if let Ok(root) = std::env::var("CONVERGENCE_PROJECT_ROOT") {
            return PathBuf::from(root);
        }
        match std::env::current_dir() {
            Ok(cwd) => {
                warn!("CONVERGENCE_PROJECT_ROOT unset; falling back to current working directory");
                cwd
            }
            Err(_) => PathBuf::from("."),
        }
    }

    /// Load `config.json` from the resolved project root, deep-merging the
    /// `convergence` section over defaults. A missing file is not an error —
    /// it simply yields all-defaults, matching upstream's `load_config`.
    pub fn load() -> ConfigResult<Self> {
        let root = Self::resolve_project_root();
        Self::load_from(&root)
    }

    pub fn load_from(project_root: &Path) -> ConfigResult<Self> {
        let config_path = project_root.join("config.json");
        let mut config = if config_path.exists() {
            let text = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
                path: config_path.clone(),
                source,
            })?;
            let full: serde_json::Value =
                serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: config_path.clone(),
                    source,
                })?;
            let section = full.get("convergence").cloned().unwrap_or_default();
            let defaults = serde_json::to_value(Config::default()).expect("Config always serialises");
            let merged = deep_merge(defaults, section);
            serde_json::from_value(merged).map_err(|source| ConfigError::Parse {
                path: config_path.clone(),
                source,
            })?
        } else {
            Config::default()
        };
        config.project_root = project_root.to_path_buf();
        Ok(config)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.project_root.join(".claude/convergence/data")
    }

    pub fn research_dir(&self, issue_id: &str) -> PathBuf {
        self.data_dir().join("research").join(issue_id)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.project_root.join(".claude/convergence/output")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.output_dir().join("archive")
    }

    pub fn issues_path(&self) -> PathBuf {
        self.data_dir().join("issues.jsonl")
    }

    pub fn quarantine_path(&self) -> PathBuf {
        self.data_dir().join("quarantine.jsonl")
    }

    pub fn knowledge_doc_path(&self) -> PathBuf {
        self.project_root.join("CLAUDE.md")
    }

    pub fn model_for_stage(&self, stage: &str) -> String {
        match stage {
            "research" => self.budget.model_map.research.clone(),
            "debate" => self.budget.model_map.debate.clone(),
            "converge" => self.budget.model_map.converge.clone(),
            _ => default_model(),
        }
    }
}

/// Recursively merge `override_val` into `base`, preferring override values,
/// matching `agents/config.py::_deep_merge`.
fn deep_merge(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, value) in override_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, value),
                    None => value,
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path()).unwrap();
        assert!(config.enabled);
        assert_eq!(config.budget.max_parallel_agents, 2);
        assert_eq!(config.budget.debate_rounds, 1);
    }

    #[test]
    fn deep_merge_overrides_nested_field_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"convergence": {"budget": {"max_parallel_agents": 5}}}"#,
        )
        .unwrap();
        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(config.budget.max_parallel_agents, 5);
        // untouched nested defaults survive the merge
        assert_eq!(config.budget.timeout_seconds, 60);
        assert!(config.sanitizer.strip_tokens);
    }

    #[test]
    fn sandbox_mode_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"convergence": {"sandbox_mode": true}}"#,
        )
        .unwrap();
        let config = Config::load_from(dir.path()).unwrap();
        assert!(config.sandbox_mode);
    }

    #[test]
    fn derived_paths_are_rooted_at_project_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(
            config.issues_path(),
            dir.path().join(".claude/convergence/data/issues.jsonl")
        );
        assert_eq!(
            config.research_dir("issue_1"),
            dir.path().join(".claude/convergence/data/research/issue_1")
        );
    }
}
