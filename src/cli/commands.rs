//! CLI command definitions and argument parsing

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(name = "ragrun")]
#[command(about = "Run tracker for retrieval-augmented question answering")]
#[command(version)]
pub struct Cli {
    /// Enable verbose debug logging (default: level from config)
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP + WebSocket server
    Serve {
        /// Override `server.host`
        #[arg(long)]
        host: Option<String>,
        /// Override `server.port`
        #[arg(short, long)]
        port: Option<u16>,
        /// Disable CORS regardless of config
        #[arg(long)]
        no_cors: bool,
    },
    /// Create the database schema (safe to repeat)
    Init,
    /// Ask a question in-process and follow the run to completion
    Ask {
        /// The question to answer
        question: String,
        /// Use this run id instead of a generated one
        #[arg(long)]
        run_id: Option<String>,
        /// Print the final run record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the stored state of a run
    Status {
        /// Run id
        run_id: String,
    },
    /// List recent runs, newest first
    Runs {
        /// Only runs with this status (pending, running, completed, failed)
        #[arg(short, long)]
        status: Option<String>,
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show current configuration
    Config,
}
