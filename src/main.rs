use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use streamwatch::api::Platform;

mod cmd;

#[derive(Parser)]
#[command(name = "streamwatch")]
#[command(version, about = "Create monitored streams and follow their creation jobs")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to streamwatch.toml. If not provided, .streamwatch/streamwatch.toml and the user config dir are searched
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend base URL. Overrides streamwatch.toml and STREAMWATCH_API_URL
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a monitored stream and follow the creation job to completion
    Create {
        /// Room URL of the stream to monitor
        #[arg(long)]
        room_url: String,
        /// Platform (chaturbate, stripchat). Inferred from the URL when omitted
        #[arg(long)]
        platform: Option<Platform>,
        /// Agent to assign to the stream
        #[arg(long)]
        agent_id: Option<i64>,
    },
    /// Follow an existing creation job
    Watch { job_id: String },
    /// Print the current status of a creation job as JSON
    Status { job_id: String },
    /// Print the resolved configuration
    Config,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "streamwatch=debug"
    } else {
        "streamwatch=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let working_dir = std::env::current_dir().context("Failed to get current directory")?;
    let config = cmd::load_config(&cli, &working_dir)?;

    match &cli.command {
        Commands::Create {
            room_url,
            platform,
            agent_id,
        } => {
            cmd::cmd_create(&config, room_url, *platform, *agent_id, cli.verbose).await?;
        }
        Commands::Watch { job_id } => cmd::cmd_watch(&config, job_id, cli.verbose).await?,
        Commands::Status { job_id } => cmd::cmd_status(&config, job_id).await?,
        Commands::Config => cmd::cmd_config(&config, cli.config.as_deref(), &working_dir)?,
    }

    Ok(())
}
