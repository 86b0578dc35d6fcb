use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "claimboard")]
#[command(version, about = "Role-scoped restoration job board")]
pub struct Cli {
    /// Path to claimboard.toml (defaults to ./claimboard.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP/WebSocket board server
    Serve {
        /// Port to serve on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path (overrides config)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (permissive CORS, bind all interfaces)
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and optionally bootstrap the organization owner
    Init {
        /// Database path (overrides config)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Organization id for the bootstrap owner
        #[arg(long, requires = "owner")]
        org: Option<String>,

        /// User id of the bootstrap owner
        #[arg(long, requires = "org")]
        owner: Option<String>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Print the lane a job with the given status and assignment count lands in
    Lane {
        /// Job status (fnol, mitigation, reconstruction, review, closeout)
        status: String,

        /// Number of assigned users
        #[arg(default_value = "0")]
        assigned: usize,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default claimboard.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => std::env::current_dir()
            .context("Failed to get current directory")?
            .join(claimboard::config::CONFIG_FILE),
    };

    match &cli.command {
        Commands::Serve { port, db_path, dev } => {
            cmd::cmd_serve(&config_path, cli.verbose, *port, db_path.clone(), *dev).await?;
        }
        Commands::Init { db_path, org, owner } => {
            cmd::cmd_init(&config_path, db_path.clone(), org.as_deref(), owner.as_deref())?;
        }
        Commands::Config { command } => cmd::cmd_config(&config_path, command.clone())?,
        Commands::Lane { status, assigned } => cmd::cmd_lane(status, *assigned)?,
    }

    Ok(())
}
