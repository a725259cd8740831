use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "panichd")]
#[command(version, about = "Ticket helpdesk server")]
pub struct Cli {
    /// Path to panichd.toml
    #[arg(short, long, global = true, default_value = panichd::config::CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the helpdesk HTTP server
    Serve {
        /// Port to serve on (overrides panichd.toml)
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path (overrides panichd.toml)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (permissive CORS, listen on all interfaces)
        #[arg(long)]
        dev: bool,
    },
    /// Create the database schema and optionally seed default lookups
    Init {
        /// Database path (overrides panichd.toml)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Seed statuses, priorities, a category and an admin user
        #[arg(long)]
        seed: bool,

        /// Email of the seeded admin user
        #[arg(long, default_value = "admin@example.com")]
        admin_email: String,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default panichd.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { port, db_path, dev } => {
            cmd::cmd_serve(&cli.config, *port, db_path.clone(), *dev).await?;
        }
        Commands::Init {
            db_path,
            seed,
            admin_email,
        } => cmd::cmd_init(&cli.config, db_path.clone(), *seed, admin_email)?,
        Commands::Config { command } => cmd::cmd_config(&cli.config, command.clone())?,
    }

    Ok(())
}
