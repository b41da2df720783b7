// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Concord main entry point - CLI and commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;

use concord::agent::{Agent, AgentSpec, AgentStatus, CycleOutcome};
use concord::config::{self, CliOptions, ResolvedConfig};
use concord::llm::{OpenAiCompatibleModel, SharedModel};
use concord::mutation::parse_sections;
use concord::pool::AgentPool;
use concord::store::{is_placeholder, DocumentStore, Missions, PLACEHOLDER, REQUIRED_DOCUMENTS};
use concord::telemetry::{init_telemetry, LogSettings};

/// Concord version string.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Concord - LLM agents converging on shared markdown documents.
#[derive(Parser)]
#[command(name = "concord")]
#[command(author, version, about = "LLM agents converging on shared markdown documents", long_about = None)]
struct Cli {
    /// Directory holding the missions
    #[arg(long, global = true, env = "CONCORD_MISSIONS_DIR")]
    missions_dir: Option<PathBuf>,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, global = true, env = "CONCORD_BASE_URL")]
    base_url: Option<String>,

    /// Model to use
    #[arg(short, long, global = true, env = "CONCORD_MODEL")]
    model: Option<String>,

    /// Environment variable holding the API key
    #[arg(long, global = true)]
    api_key_env: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for concord.
#[derive(Subcommand)]
enum Commands {
    /// Manage missions
    Mission {
        #[command(subcommand)]
        action: MissionAction,
    },

    /// Run the agent pool on a mission until interrupted
    Run {
        /// Mission name
        mission: String,

        /// Only run these agents (comma separated)
        #[arg(long, value_delimiter = ',')]
        agents: Vec<String>,

        /// Seconds between two cycles of an agent
        #[arg(long)]
        interval: Option<u64>,

        /// Seconds allowed for one model call
        #[arg(long)]
        llm_timeout: Option<u64>,

        /// Consecutive failures before an agent is reported unhealthy
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Run a single cycle of one agent and report the outcome
    Cycle {
        /// Mission name
        mission: String,

        /// Agent name
        agent: String,
    },

    /// Show the section overview of a mission's documents
    Status {
        /// Mission name
        mission: String,
    },

    /// Print one document of a mission
    Show {
        /// Mission name
        mission: String,

        /// Document name
        document: String,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Initialize a new configuration file
    Init,

    /// Show version information
    Version,
}

/// Mission subcommand actions.
#[derive(Subcommand)]
enum MissionAction {
    /// Create a mission with every required document
    Create {
        name: String,
    },
    /// List missions
    List,
    /// Delete a mission and all of its documents
    Delete {
        name: String,
    },
}

/// Config subcommand actions.
#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _telemetry = init_telemetry(&LogSettings::from_verbosity(cli.verbose))?;

    let cli_options = CliOptions {
        missions_dir: cli.missions_dir,
        base_url: cli.base_url,
        model: cli.model,
        api_key_env: cli.api_key_env,
        ..Default::default()
    };

    let current_dir = std::env::current_dir()?;
    let workspace_root = config::find_workspace_root(&current_dir).unwrap_or(current_dir);

    handle_command(cli.command, &workspace_root, cli_options).await
}

async fn handle_command(
    command: Commands,
    workspace_root: &Path,
    mut cli_options: CliOptions,
) -> anyhow::Result<()> {
    match command {
        Commands::Mission { action } => {
            let config = config::load_config(workspace_root, cli_options)?;
            handle_mission_command(&config, action).await?;
        }
        Commands::Run {
            mission,
            agents,
            interval,
            llm_timeout,
            max_retries,
        } => {
            cli_options.interval_secs = interval;
            cli_options.llm_timeout_secs = llm_timeout;
            cli_options.max_retries = max_retries;
            let config = config::load_config(workspace_root, cli_options)?;
            run_mission(&config, &mission, &agents).await?;
        }
        Commands::Cycle { mission, agent } => {
            let config = config::load_config(workspace_root, cli_options)?;
            run_single_cycle(&config, &mission, &agent).await?;
        }
        Commands::Status { mission } => {
            let config = config::load_config(workspace_root, cli_options)?;
            show_status(&config, &mission).await?;
        }
        Commands::Show { mission, document } => {
            let config = config::load_config(workspace_root, cli_options)?;
            let store = open_mission(&config, &mission)?;
            print!("{}", store.read(&document).await?);
        }
        Commands::Config { action } => match action {
            Some(ConfigAction::Show) | None => {
                let config = config::load_config(workspace_root, cli_options)?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },
        Commands::Init => {
            let path = config::init_config(workspace_root, None)?;
            println!("Created config file: {}", path.display());
        }
        Commands::Version => {
            println!("concord {VERSION}");
        }
    }
    Ok(())
}

async fn handle_mission_command(config: &ResolvedConfig, action: MissionAction) -> anyhow::Result<()> {
    let missions = Missions::with_options(&config.missions_dir, config.store_options());
    match action {
        MissionAction::Create { name } => {
            let store = missions.create(&name).await?;
            println!(
                "{} Created mission {} at {}",
                "✓".green(),
                name.bright_white(),
                store.root().display()
            );
        }
        MissionAction::List => {
            let names = missions.list().await?;
            if names.is_empty() {
                println!("{}", format!("No missions in {}", missions.root().display()).dimmed());
                println!("{}", "Create one with: concord mission create NAME".dimmed());
            }
            for name in names {
                println!("{}", name);
            }
        }
        MissionAction::Delete { name } => {
            missions.delete(&name).await?;
            println!("{} Deleted mission {}", "✓".green(), name.bright_white());
        }
    }
    Ok(())
}

fn open_mission(config: &ResolvedConfig, mission: &str) -> anyhow::Result<DocumentStore> {
    let missions = Missions::with_options(&config.missions_dir, config.store_options());
    missions
        .open(mission)
        .with_context(|| format!("cannot open mission '{mission}'"))
}

fn create_model(config: &ResolvedConfig) -> anyhow::Result<SharedModel> {
    let model = OpenAiCompatibleModel::new(config.model_settings())
        .context("failed to create the language model client")?;
    Ok(Arc::new(model))
}

fn select_agents(config: &ResolvedConfig, names: &[String]) -> anyhow::Result<Vec<AgentSpec>> {
    if names.is_empty() {
        return Ok(config.agents.clone());
    }
    names
        .iter()
        .map(|name| {
            config
                .agents
                .iter()
                .find(|spec| &spec.name == name)
                .map(|spec| AgentSpec {
                    enabled: true,
                    ..spec.clone()
                })
                .with_context(|| format!("unknown agent '{name}'"))
        })
        .collect()
}

async fn run_mission(config: &ResolvedConfig, mission: &str, names: &[String]) -> anyhow::Result<()> {
    let store = Arc::new(open_mission(config, mission)?);
    store.subscribe(Arc::new(|document: &str, _text: &str| {
        println!("{} {} updated", "→".cyan(), document.bright_white());
    }));

    let specs = select_agents(config, names)?;
    let options = config.agent_options(Arc::clone(&store), create_model(config)?);
    let mut pool = AgentPool::new(&specs, &options, config.pool_settings())?;

    let started = pool.start_all();
    if started == 0 {
        bail!("no enabled agents to run");
    }
    println!(
        "{} Running {} agent(s) on mission {} (Ctrl+C to stop)",
        "●".green(),
        started,
        mission.bright_white()
    );

    tokio::signal::ctrl_c().await?;
    println!("\n{}", "Stopping agents...".dimmed());
    pool.stop_all().await;

    print_pool_status(&pool);
    if !pool.abandoned().is_empty() {
        println!(
            "{} Abandoned (did not stop in time): {}",
            "⚠".yellow(),
            pool.abandoned().join(", ")
        );
    }

    let stats = store.stats();
    println!(
        "\nWrites: {}, unchanged: {}, lock timeouts: {}, failures: {}",
        stats.writes, stats.unchanged, stats.lock_timeouts, stats.failures
    );

    #[cfg(feature = "telemetry")]
    {
        let snapshot = concord::telemetry::GLOBAL_METRICS.snapshot();
        println!("\n{}", snapshot.format_report().dimmed());
    }

    Ok(())
}

fn print_pool_status(pool: &AgentPool) {
    println!("\n{}", "Agents".bright_cyan().bold());
    for (name, report) in pool.status() {
        let symbol = match report.status {
            AgentStatus::Completed => report.status.symbol().green(),
            AgentStatus::Error => report.status.symbol().red(),
            _ => report.status.symbol().normal(),
        };
        let health = if report.healthy {
            "healthy".green()
        } else {
            "unhealthy".red()
        };
        let last_change = report
            .last_change
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {symbol} {:<16} {:<10} retries {}/{}  last change {}  {}",
            name,
            report.status.to_string(),
            report.retries,
            report.max_retries,
            last_change,
            health
        );
        if let Some(message) = report.error_message {
            println!("      {}", message.red());
        }
    }
}

async fn run_single_cycle(config: &ResolvedConfig, mission: &str, agent_name: &str) -> anyhow::Result<()> {
    let store = Arc::new(open_mission(config, mission)?);
    let spec = select_agents(config, &[agent_name.to_string()])?
        .into_iter()
        .next()
        .with_context(|| format!("unknown agent '{agent_name}'"))?;
    let options = config.agent_options(store, create_model(config)?);

    let mut agent = Agent::new(&spec, &options);
    match agent.run_cycle().await {
        CycleOutcome::Written { applied, skipped } => {
            println!(
                "{} {} updated {}: {}",
                "✓".green(),
                agent.name(),
                agent.primary(),
                applied.join(", ")
            );
            if !skipped.is_empty() {
                println!("{} skipped: {}", "⚠".yellow(), skipped.join(", "));
            }
        }
        CycleOutcome::Unchanged => println!("{} no change proposed", "○".normal()),
        CycleOutcome::Skipped => {
            println!("{} nothing to work on yet (all documents pending)", "○".normal())
        }
        CycleOutcome::NoProposal(e) => bail!("no proposal: {e}"),
        CycleOutcome::WriteRejected => bail!("write to '{}' was rejected", agent.primary()),
        CycleOutcome::ReadFailed(e) => bail!("read failed: {e}"),
    }
    Ok(())
}

async fn show_status(config: &ResolvedConfig, mission: &str) -> anyhow::Result<()> {
    let store = open_mission(config, mission)?;
    println!("{} {}", "Mission".bright_blue().bold(), mission.bright_white());

    for name in REQUIRED_DOCUMENTS {
        let content = store.read(name).await?;
        let marker = if is_placeholder(&content) {
            "○".normal()
        } else {
            "●".green()
        };
        println!("\n{marker} {}", name.bright_cyan());
        for section in parse_sections(&content) {
            let body = section.body.trim();
            let state = if body.is_empty() || body == PLACEHOLDER {
                "pending".dimmed()
            } else {
                format!("{} lines", body.lines().count()).normal()
            };
            println!("    {:<32} {}", section.title, state);
        }
    }
    Ok(())
}
