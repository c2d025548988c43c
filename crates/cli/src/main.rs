//! ForgeLoop CLI entry point.
//!
//! Commands:
//! - `run`       Drive an objective through the ReAct loop
//! - `plan`      Print the task plan for an objective
//! - `classify`  Show whether an objective would be planned
//! - `config`    Print the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "forgeloop",
    about = "ForgeLoop: autonomous coding agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent on an objective
    Run {
        objective: String,

        /// Workspace directory (defaults to tools.workspace_root)
        #[arg(short, long, env = "FORGELOOP_WORKSPACE")]
        workspace: Option<PathBuf>,

        /// Override agent.max_steps
        #[arg(long)]
        max_steps: Option<u32>,

        /// Skip task planning
        #[arg(long)]
        no_plan: bool,

        /// Override llm.model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Generate and print a task plan
    Plan {
        objective: String,

        /// Plan even when the objective looks like a single action
        #[arg(short, long)]
        force: bool,
    },

    /// Print the planning classifier decision for a message
    Classify { message: String },

    /// Print the effective configuration
    Config {
        /// Print the built-in defaults instead
        #[arg(long)]
        defaults: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries progress events and answers.
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Commands::Run {
            objective,
            workspace,
            max_steps,
            no_plan,
            model,
        } => {
            commands::run::run(commands::run::RunArgs {
                objective,
                workspace,
                max_steps,
                no_plan,
                model,
            })
            .await?
        }
        Commands::Plan { objective, force } => commands::plan::run(&objective, force).await?,
        Commands::Classify { message } => commands::classify::run(&message),
        Commands::Config { defaults } => commands::config_cmd::show(defaults)?,
    }

    Ok(())
}
