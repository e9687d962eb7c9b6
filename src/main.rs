use anyhow::Context;
use clap::Parser;
use ragrun::cli::handle_ask;
use ragrun::cli::handle_config;
use ragrun::cli::handle_init;
use ragrun::cli::handle_runs;
use ragrun::cli::handle_serve;
use ragrun::cli::handle_status;
use ragrun::cli::Cli;
use ragrun::cli::Commands;
use ragrun::config::AppConfig;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize logging; the guard flushes the log file when main returns
    let _log_guard = if cli.verbose {
        ragrun::logging::init_logging_with_level("debug")
    } else {
        ragrun::logging::init_logging_with_config(Some(&config))
    }
    .context("Failed to initialize logging")?;
    info!("Configuration loaded successfully");

    match cli.command {
        Commands::Serve {
            host,
            port,
            no_cors,
        } => handle_serve(&config, host, port, no_cors)
            .await
            .context("API server failed")?,
        Commands::Init => handle_init(&config)
            .await
            .context("Database initialization failed")?,
        Commands::Ask {
            question,
            run_id,
            json,
        } => handle_ask(&config, question, run_id, json).await?,
        Commands::Status { run_id } => handle_status(&config, &run_id)
            .await
            .with_context(|| format!("Failed to load run {run_id}"))?,
        Commands::Runs { status, limit } => handle_runs(&config, status, limit).await?,
        Commands::Config => handle_config(&config).await?,
    }

    Ok(())
}
