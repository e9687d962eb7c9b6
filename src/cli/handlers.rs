//! CLI command handlers

use std::sync::Arc;

use crate::api::build_state;
use crate::api::serve_api;
use crate::cli::output::print_config;
use crate::cli::output::print_info;
use crate::cli::output::print_run;
use crate::cli::output::print_run_list;
use crate::cli::output::print_server_message;
use crate::cli::output::print_success;
use crate::cli::output::print_warning;
use crate::config::StoreBackend;
use crate::database::Database;
use crate::models::new_run_id;
use crate::models::RunStatus;
use crate::pipeline::RunOutcome;
use crate::store::RunStore;
use crate::AppConfig;
use crate::RagRunError;
use crate::Result;

pub async fn handle_serve(
    config: &AppConfig,
    host: Option<String>,
    port: Option<u16>,
    no_cors: bool,
) -> Result<()> {
    let mut config = config.clone();
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if no_cors {
        config.server.enable_cors = false;
    }

    println!("🚀 Starting ragrun API Server");
    println!("=============================\n");
    println!("📍 Address: {}", config.bind_address());
    println!(
        "🌐 CORS: {}",
        if config.server.enable_cors {
            "Enabled"
        } else {
            "Disabled"
        }
    );
    println!("🗃️  Run store: {:?}\n", config.store.backend);

    serve_api(&config).await
}

pub async fn handle_init(config: &AppConfig) -> Result<()> {
    print_info("🗄️  Initializing ragrun database...");
    let database = Database::from_config(config).await?;
    database.init_schema().await?;
    print_success("Tables and indexes created");

    let indexed = database.count_indexed_documents().await?;
    if indexed == 0 {
        print_warning("No embedded documents yet; every run will answer with insufficient information");
    } else {
        print_info(&format!("📚 {indexed} documents ready for retrieval"));
    }
    Ok(())
}

/// Run a question in this process, printing its updates as they arrive
pub async fn handle_ask(
    config: &AppConfig,
    question: String,
    run_id: Option<String>,
    json: bool,
) -> Result<()> {
    let state = build_state(config).await?;
    let run_id = run_id.unwrap_or_else(new_run_id);

    // Subscribe before launching so no update is missed
    let mut session = state.hub.connect().await;
    state
        .hub
        .subscribe(session.client_id, Some(&run_id))
        .await?;

    let (record, mut handle) = state.controller.submit(&run_id, &question).await?;
    if !json {
        print_info(&format!("Run {} is {}", record.id, record.status));
    }

    let joined = loop {
        tokio::select! {
            Some(text) = session.receiver.recv() => {
                if !json {
                    print_server_message(&text);
                }
            }
            joined = &mut handle => break joined,
        }
    };
    while let Ok(text) = session.receiver.try_recv() {
        if !json {
            print_server_message(&text);
        }
    }
    state.hub.disconnect(session.client_id).await;

    let outcome =
        joined.map_err(|e| RagRunError::Custom(format!("Run task did not finish: {e}")))?;
    let record = state.store.load_run(&run_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!();
        print_run(&record);
    }

    match outcome {
        RunOutcome::Completed => Ok(()),
        RunOutcome::Failed(message) => Err(RagRunError::Custom(format!("Run failed: {message}"))),
        RunOutcome::Skipped(status) => {
            print_warning(&format!("Run was already {status}; nothing executed"));
            Ok(())
        }
    }
}

pub async fn handle_status(config: &AppConfig, run_id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let record = store.load_run(run_id).await?;
    print_run(&record);
    Ok(())
}

pub async fn handle_runs(config: &AppConfig, status: Option<String>, limit: usize) -> Result<()> {
    let status = status
        .as_deref()
        .map(str::parse::<RunStatus>)
        .transpose()?;
    let store = open_store(config).await?;
    let runs = store.list_runs(status, limit).await?;
    print_run_list(&runs);
    Ok(())
}

pub async fn handle_config(config: &AppConfig) -> Result<()> {
    print_config(config);
    Ok(())
}

/// Runs only outlive a process in Postgres, so that is the only store worth reading
async fn open_store(config: &AppConfig) -> Result<Arc<dyn RunStore>> {
    match config.store.backend {
        StoreBackend::Postgres => {
            let database = Database::from_config(config).await?;
            database.verify_schema_or_error().await?;
            Ok(Arc::new(database))
        }
        StoreBackend::Memory => Err(RagRunError::ConfigError(
            "The in-memory run store is private to the serving process; \
             set store.backend = \"postgres\" to inspect runs from the CLI"
                .to_string(),
        )),
    }
}
