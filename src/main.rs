//! Nexus - Ralph Loop Orchestrator
//!
//! CLI entry point: wires the collaborator implementations shipped in this
//! crate (a mock LLM client, a no-op QA runner, a single-task decomposer)
//! into a `Coordinator` and drives a job to completion. A production
//! deployment swaps in real collaborators (a real `LLMClient`, a shelled-out
//! `QARunner`, an LLM-driven `Decomposer`) without touching the core.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use std::fs;
use tracing::info;

use nexus::agent::LlmAgentRunner;
use nexus::cli::{Cli, Command, OutputFormat};
use nexus::collab::{
    HashEmbeddingsService, MockLlmClient, NoopQaRunner, SingleTaskDecomposer, StdFilesystem, TracingEventSink,
};
use nexus::config::Config;
use nexus::coordinator::{Coordinator, CoordinatorConfig};
use nexus::tools::ToolExecutor;
use nexus::worktree::{WorktreeConfig, WorktreeManager};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nexus")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Logging initialized");
    Ok(())
}

/// Builds a `Coordinator` out of the reference collaborator implementations
/// shipped in `nexus::collab`. A real deployment constructs the same type
/// with production collaborators instead.
fn build_coordinator(config: &Config, repo_root: PathBuf) -> Coordinator {
    let worktrees = Arc::new(WorktreeManager::new(WorktreeConfig::with_repo(repo_root.clone())));
    let llm = Arc::new(MockLlmClient);
    let tools = Arc::new(ToolExecutor::standard());
    let agent = Arc::new(LlmAgentRunner::new(llm, tools, config.llm.max_tokens));

    let mut coordinator_config = CoordinatorConfig::default();
    coordinator_config.engine.max_iterations = config.validation.max_iterations;
    coordinator_config.engine.escalate_after = config.validation.escalate_after;
    coordinator_config.engine.timeout_minutes = config.validation.timeout_minutes;
    coordinator_config.engine.commit_each_iteration = config.validation.commit_each_iteration;
    coordinator_config.engine.include_diff_context = config.validation.include_diff_context;
    coordinator_config.engine.include_previous_errors = config.validation.include_previous_errors;
    coordinator_config.pool.default_capacity = config.concurrency.max_loops as usize;

    Coordinator::new(
        Arc::new(SingleTaskDecomposer::default()),
        Arc::new(NoopQaRunner),
        agent,
        Arc::new(HashEmbeddingsService::default()),
        Arc::new(StdFilesystem),
        Arc::new(TracingEventSink),
        worktrees,
        repo_root.join(".nexus").join("escalations"),
        coordinator_config,
    )
}

async fn run_job(job_spec: &str, repo_root: PathBuf, config: &Config) -> Result<()> {
    let coordinator = build_coordinator(config, repo_root);
    let outcome = coordinator
        .run_job(job_spec)
        .await
        .map_err(|e| eyre::eyre!("coordinator failed: {e}"))?;

    println!("Completed tasks: {}", outcome.completed_task_ids.len());
    for id in &outcome.completed_task_ids {
        println!("  ok  {id}");
    }
    for report in &outcome.escalations {
        println!("  escalated {} ({:?}): {}", report.task_id, report.reason, report.summary);
    }
    if !outcome.escalations.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_status(config: &Config, format: &OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "llm_provider": config.llm.provider,
                    "llm_model": config.llm.model,
                    "max_loops": config.concurrency.max_loops,
                    "max_iterations": config.validation.max_iterations,
                })
            );
        }
        _ => {
            println!("Nexus v{}", env!("CARGO_PKG_VERSION"));
            println!("  LLM: {} ({})", config.llm.provider, config.llm.model);
            println!("  Max loops: {}", config.concurrency.max_loops);
            println!("  Max iterations: {}", config.validation.max_iterations);
        }
    }
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!(
        "Nexus started with config: provider={}, model={}",
        config.llm.provider, config.llm.model
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;

    let repo_root = std::env::current_dir().context("Failed to resolve current directory")?;

    match cli.command {
        Some(Command::Run { task, .. }) => {
            runtime.block_on(run_job(&task, repo_root, &config))?;
        }
        Some(Command::Status { format, .. }) => {
            print_status(&config, &format);
        }
        Some(other) => {
            // Daemonization, the TUI and log tailing are the desktop/IPC
            // surface this core is built to sit underneath; not part of
            // the iteration-orchestration core itself.
            eprintln!(
                "'{}' is served by Nexus's surrounding application, not the orchestration core in this crate.",
                command_name(&other)
            );
        }
        None => {
            print_status(&config, &OutputFormat::Text);
        }
    }

    Ok(())
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Start { .. } => "start",
        Command::Stop => "stop",
        Command::Tui => "tui",
        Command::Logs { .. } => "logs",
        Command::RunDaemon => "run-daemon",
        Command::ListLoops => "list-loops",
        Command::Metrics { .. } => "metrics",
        Command::Run { .. } | Command::Status { .. } => unreachable!(),
    }
}
