//! Operator-facing CLI for the pipeline orchestrator and arbiter,
//! generalising `agents/pipeline.py`'s `__main__` dispatch with `clap`.
//!
//! `research`/`research-all`/`status` mirror upstream one-for-one;
//! `run`/`converge`/`list` are additions this crate needs that the upstream
//! script left to ad-hoc invocation (`run` drives one issue end-to-end,
//! `converge` triggers the arbiter directly rather than only on session end).

use clap::{Parser, Subcommand};
use convergence_engine::arbiter::synthesize;
use convergence_engine::checkpoint::Phase;
use convergence_engine::config::Config;
use convergence_engine::issue::IssueStatus;
use convergence_engine::pipeline;

#[derive(Parser)]
#[command(name = "convergence-pipeline", about = "Drive the convergence engine's research/debate/convergence pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run root-cause/solution/impact research for one issue.
    Research {
        issue_id: String,
        #[arg(long)]
        force: bool,
    },
    /// Research every issue currently in `captured` status.
    #[command(name = "research-all")]
    ResearchAll,
    /// Drive one issue through research, debate, and up to convergence.
    Run {
        issue_id: String,
        #[arg(long)]
        force: bool,
        #[arg(long, value_enum)]
        from_phase: Option<CliPhase>,
    },
    /// Synthesize every eligible issue (or one, with `--issue-id`) into a
    /// convergence report and task list.
    Converge {
        #[arg(long)]
        issue_id: Option<String>,
    },
    /// Print a summary of issue counts by status.
    Status,
    /// List issues, optionally filtered by status.
    List {
        #[arg(long, value_enum)]
        status: Option<CliStatus>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliPhase {
    Research,
    Debate,
    Convergence,
}

impl From<CliPhase> for Phase {
    fn from(value: CliPhase) -> Self {
        match value {
            CliPhase::Research => Phase::Research,
            CliPhase::Debate => Phase::Debate,
            CliPhase::Convergence => Phase::Convergence,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliStatus {
    Captured,
    Researching,
    Researched,
    Debating,
    Debated,
    Converging,
    Converged,
    Resolved,
    Quarantined,
}

impl From<CliStatus> for IssueStatus {
    fn from(value: CliStatus) -> Self {
        match value {
            CliStatus::Captured => IssueStatus::Captured,
            CliStatus::Researching => IssueStatus::Researching,
            CliStatus::Researched => IssueStatus::Researched,
            CliStatus::Debating => IssueStatus::Debating,
            CliStatus::Debated => IssueStatus::Debated,
            CliStatus::Converging => IssueStatus::Converging,
            CliStatus::Converged => IssueStatus::Converged,
            CliStatus::Resolved => IssueStatus::Resolved,
            CliStatus::Quarantined => IssueStatus::Quarantined,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    convergence_engine::logging::init_tracing();
    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Research { issue_id, force } => {
            let results = pipeline::research_one(&config, &issue_id, force).await?;
            println!("Research results: {results:?}");
        }
        Commands::ResearchAll => {
            let all_results = pipeline::research_all_captured(&config).await?;
            println!("Researched {} issues", all_results.len());
            for (issue_id, results) in &all_results {
                println!("  {issue_id}: {results:?}");
            }
        }
        Commands::Run { issue_id, force, from_phase } => {
            let outcome = pipeline::run_full(&config, &issue_id, from_phase.map(Phase::from), force).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Converge { issue_id } => {
            let outcome = synthesize(&config, issue_id.as_deref()).await?;
            if outcome.ran {
                println!(
                    "Convergence complete: {} issues, {} tasks",
                    outcome.issue_count, outcome.task_count
                );
            } else {
                println!(
                    "No convergence run: only {} eligible issue(s), need {}",
                    outcome.issue_count, config.min_issues_for_convergence
                );
            }
        }
        Commands::Status => {
            let status = pipeline::status(&config)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::List { status } => {
            let issues = pipeline::list(&config, status.map(IssueStatus::from))?;
            for issue in issues {
                println!("{} [{}] {}", issue.id, issue.status, issue.tool_name);
            }
        }
    }

    Ok(())
}
