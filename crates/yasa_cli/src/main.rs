//! YASA CLI
//!
//! Command-line client for keeping a media library in sync with a YASA
//! server.
//!
//! # Commands
//!
//! - `sync` - Pull the server's changes, then push local ones
//! - `add` - Record files added to the library locally
//! - `remove` - Record files removed from the library locally
//! - `status` - Show what the next sync would announce

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use yasa_sync_engine::DEFAULT_SERVER_ADDR;

/// YASA media-library sync client.
#[derive(Parser)]
#[command(name = "yasa")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local state file
    #[arg(global = true, long, default_value = "yasaclient.db")]
    db: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull the server's changes, then push local ones
    Sync {
        /// Server address (host:port)
        #[arg(short, long, default_value = DEFAULT_SERVER_ADDR)]
        server: String,

        /// Directory to import pulled files into (defaults to the
        /// platform's media library)
        #[arg(short, long)]
        library: Option<PathBuf>,

        /// Directory for in-flight downloads (defaults to `yasa-incoming`
        /// beside the state file)
        #[arg(long)]
        temp_dir: Option<PathBuf>,

        /// Abort the sync after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Record files added to the library locally
    Add {
        /// Files to record
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Record files removed from the library locally
    Remove {
        /// Files to forget
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Show local sync state
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Sync {
            server,
            library,
            temp_dir,
            timeout,
        } => {
            commands::sync::run(&cli.db, &server, library, temp_dir, timeout)?;
        }
        Commands::Add { paths } => {
            commands::files::add(&cli.db, &paths)?;
        }
        Commands::Remove { paths } => {
            commands::files::remove(&cli.db, &paths)?;
        }
        Commands::Status { format } => {
            commands::status::run(&cli.db, &format)?;
        }
    }

    Ok(())
}
