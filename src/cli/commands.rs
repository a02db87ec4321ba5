//! CLI command definitions for agentarena.
//!
//! `run` races agents on the tasks of a bench file, `init` writes a starter
//! bench file and `history` lists saved runs. Tables and progress go to
//! stderr; exports (`--json`, `--csv`, `--md`) go to stdout so they can be
//! piped.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};

use crate::config::{self, BenchConfig, DEFAULT_CONFIG_FILE, STARTER_CONFIG};
use crate::history;
use crate::report;
use crate::runner::{BenchmarkResult, BenchmarkRunner};

/// Race your coding agents on your own tasks.
#[derive(Parser)]
#[command(name = "agentarena")]
#[command(about = "Race coding agents on your own tasks and pick a winner")]
#[command(version)]
#[command(
    long_about = "agentarena runs every agent in a bench file against every task, each in a fresh\nisolated copy of your project, and ranks them by pass rate, cost and time.\n\nExample usage:\n  agentarena init\n  agentarena run -c bench.yaml --md"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the benchmark: race agents on your tasks.
    Run(RunArgs),

    /// Create a starter bench file in your project.
    Init(InitArgs),

    /// List past benchmark runs.
    History(HistoryArgs),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Path to the bench file. Its directory is the project under test.
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Run only these tasks (repeatable).
    #[arg(short = 't', long = "task")]
    pub tasks: Vec<String>,

    /// Run only these agents by name, or add one as 'name:command' (repeatable).
    #[arg(short = 'a', long = "agent")]
    pub agents: Vec<String>,

    /// Override the global timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Number of agents racing the same task at once.
    #[arg(long, env = "AGENTARENA_PARALLEL")]
    pub parallel: Option<usize>,

    /// Print all runs as JSON to stdout.
    #[arg(long)]
    pub json: bool,

    /// Print all runs as CSV to stdout.
    #[arg(long)]
    pub csv: bool,

    /// Print the summary as a Markdown table to stdout.
    #[arg(long)]
    pub md: bool,

    /// Do not save this run under .agentarena/runs.
    #[arg(long)]
    pub no_history: bool,
}

/// Arguments for the `init` command.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the bench file.
    #[arg(short = 'o', long, default_value = DEFAULT_CONFIG_FILE)]
    pub output: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `history` command.
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Project directory whose history to list.
    #[arg(short = 'p', long, default_value = ".")]
    pub project: PathBuf,
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses CLI arguments and runs the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Runs the selected command.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_benchmark_command(args).await,
        Commands::Init(args) => run_init_command(args),
        Commands::History(args) => run_history_command(args),
    }
}

async fn run_benchmark_command(args: RunArgs) -> anyhow::Result<()> {
    let loaded = config::load_config(&args.config).with_context(|| {
        format!(
            "Failed to load {} (run `agentarena init` to create one)",
            args.config.display()
        )
    })?;
    let bench = apply_overrides(loaded, &args)?;
    let project_root = project_root_for(&args.config);

    eprint!(
        "{}",
        report::render_header(&bench.project, bench.agents.len(), bench.tasks.len())
    );

    let total = bench.tasks.len();
    let task_ids: Vec<String> = bench.tasks.iter().map(|t| t.id.clone()).collect();
    let runner = BenchmarkRunner::new(bench, &project_root)?.with_task_callback(Box::new(
        move |task, runs| {
            let index = task_ids.iter().position(|id| *id == task.id).unwrap_or(0) + 1;
            eprint!("{}", report::render_task(task, index, total, runs));
        },
    ));

    let result = runner.run().await?;
    eprint!("{}", report::render_summary(&result.summaries, result.winner()));

    write_exports(&result, &args)?;

    if !args.no_history {
        // A finished benchmark is still worth printing if history cannot be saved.
        if let Err(e) = history::save_run(&project_root, &result) {
            warn!("Failed to save run history: {}", e);
        }
    }
    Ok(())
}

/// Applies `--task`, `--agent`, `--timeout` and `--parallel` to a loaded config.
pub fn apply_overrides(mut bench: BenchConfig, args: &RunArgs) -> anyhow::Result<BenchConfig> {
    if let Some(timeout) = args.timeout {
        bench.timeout = timeout;
    }
    if let Some(parallel) = args.parallel {
        bench.parallel = parallel;
    }

    if !args.tasks.is_empty() {
        let unknown: Vec<&str> = args
            .tasks
            .iter()
            .filter(|name| !bench.tasks.iter().any(|t| &t.id == *name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            bail!(
                "Unknown task(s): {}. Available: {}",
                unknown.join(", "),
                bench.tasks.iter().map(|t| t.id.as_str()).collect::<Vec<_>>().join(", ")
            );
        }
        bench.tasks.retain(|t| args.tasks.contains(&t.id));
    }

    if !args.agents.is_empty() {
        let mut selected = Vec::with_capacity(args.agents.len());
        for flag in &args.agents {
            if flag.contains(':') {
                selected.push(config::parse_agent_flag(flag)?);
            } else {
                match bench.agents.iter().find(|a| &a.id == flag) {
                    Some(agent) => selected.push(agent.clone()),
                    None => bail!(
                        "Unknown agent: {}. Available: {}",
                        flag,
                        bench.agents.iter().map(|a| a.id.as_str()).collect::<Vec<_>>().join(", ")
                    ),
                }
            }
        }
        bench.agents = selected;
    }

    bench.validate()?;
    Ok(bench)
}

/// The project under test is the directory holding the bench file.
fn project_root_for(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn write_exports(result: &BenchmarkResult, args: &RunArgs) -> anyhow::Result<()> {
    if args.json {
        println!("{}", report::to_json(&result.runs)?);
    }
    if args.csv {
        print!("{}", report::to_csv(&result.runs));
    }
    if args.md {
        println!("{}", report::to_markdown(&result.summaries));
    }
    Ok(())
}

fn run_init_command(args: InitArgs) -> anyhow::Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite",
            args.output.display()
        );
    }

    std::fs::write(&args.output, STARTER_CONFIG)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!("Wrote starter config to {}", args.output.display());
    eprintln!(
        "Created {}. Edit it with your tasks and agents, then run: agentarena run",
        args.output.display()
    );
    Ok(())
}

fn run_history_command(args: HistoryArgs) -> anyhow::Result<()> {
    let entries = history::list_runs(&args.project)?;
    if entries.is_empty() {
        eprintln!("No runs yet. Run `agentarena run` first.");
        return Ok(());
    }

    println!(
        "{:<26} {:<20} {:<16} {:>6} {:>7} {:<16}",
        "File", "Date", "Project", "Tasks", "Agents", "Winner"
    );
    for entry in entries {
        println!(
            "{:<26} {:<20} {:<16} {:>6} {:>7} {:<16}",
            entry.file, entry.timestamp, entry.project, entry.num_tasks, entry.num_agents, entry.winner
        );
    }
    Ok(())
}
