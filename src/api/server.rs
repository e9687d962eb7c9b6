//! HTTP server implementation

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing::warn;

use crate::api::handlers::AppState;
use crate::api::routes;
use crate::config::AppConfig;
use crate::config::StoreBackend;
use crate::database::Database;
use crate::embeddings::EmbeddingClient;
use crate::llm::LlmService;
use crate::notify::NotificationHub;
use crate::pipeline::PipelineController;
use crate::pipeline::PipelineOptions;
use crate::pipeline::StageSet;
use crate::store::MemoryRunStore;
use crate::store::RunStore;
use crate::Result;

/// Wire the store, stage capabilities, hub and controller from configuration
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let database = Arc::new(Database::from_config(config).await?);
    database.verify_schema_or_error().await?;

    let store: Arc<dyn RunStore> = match config.store.backend {
        StoreBackend::Postgres => database.clone() as Arc<dyn RunStore>,
        StoreBackend::Memory => {
            warn!("⚠️  Using in-memory run store; runs are lost on restart");
            Arc::new(MemoryRunStore::new())
        }
    };

    let stages = StageSet {
        embedder: Arc::new(EmbeddingClient::from_app_config(config)?),
        search: database.clone(),
        documents: database,
        synthesizer: Arc::new(LlmService::new(config)?),
    };

    let hub = Arc::new(NotificationHub::from_app_config(config));
    let controller = Arc::new(
        PipelineController::new(store, stages, PipelineOptions::from_app_config(config))
            .with_notifier(hub.clone()),
    );

    Ok(AppState::new(controller, hub))
}

/// Build the full router: REST under `/api`, WebSocket at `/ws`
pub fn build_router(state: AppState, enable_cors: bool) -> Router {
    let mut app = Router::new()
        .nest("/api", routes::api_routes(state.clone()))
        .layer(CompressionLayer::new())
        .merge(routes::ws_routes(state))
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        info!("✅ CORS enabled");
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Start the API server and run until Ctrl-C
pub async fn serve_api(config: &AppConfig) -> Result<()> {
    info!("🚀 Starting ragrun API server...");

    let state = build_state(config).await?;
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));

    serve_with_shutdown(config, state, shutdown).await
}

/// Serve `state` until `shutdown` is cancelled, then drain in-flight runs
pub async fn serve_with_shutdown(
    config: &AppConfig,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<()> {
    let controller = state.controller.clone();
    let hub = state.hub.clone();
    let app = build_router(state, config.server.enable_cors);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🌐 API server listening on http://{}", addr);
    info!("Available endpoints:");
    info!("  GET  /api/health    - Health check");
    info!("  POST /api/runs      - Submit a question");
    info!("  GET  /api/runs      - List runs");
    info!("  GET  /api/runs/:id  - Run status");
    info!("  GET  /ws            - Live run updates");

    // Live sockets would otherwise hold graceful shutdown open
    let closing = shutdown.clone();
    tokio::spawn(async move {
        closing.cancelled().await;
        let closed = hub.close_all().await;
        info!("🔌 Closed {} live session(s)", closed);
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    info!("⏳ Waiting up to {}s for in-flight runs", grace.as_secs());
    if controller.shutdown(grace).await {
        info!("👋 Server stopped cleanly");
    }

    Ok(())
}

async fn cancel_on_ctrl_c(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        return;
    }
    info!("🛑 Shutdown requested");
    token.cancel();
}
