//! CLI output formatting utilities

use crate::models::RunRecord;
use crate::notify::ServerMessage;
use crate::AppConfig;

/// Truncate at a character boundary, adding "..." when cut
#[must_use]
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        s.to_string()
    }
}

/// Print a run record in full
pub fn print_run(record: &RunRecord) {
    println!("🧾 Run {}", record.id);
    println!("  Question: {}", record.question);
    println!("  Status: {}", record.status);
    println!("  Created: {}", record.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(completed_at) = record.completed_at {
        println!("  Completed: {}", completed_at.format("%Y-%m-%d %H:%M:%S"));
    }

    if !record.progress.is_empty() {
        println!("  Progress:");
        for note in &record.progress {
            println!("    • {} ({}ms): {}", note.stage, note.elapsed_ms, note.summary);
        }
    }

    if let Some(result) = &record.result {
        println!();
        println!("💬 Answer:");
        println!("{}", result.answer);
        if !result.documents.is_empty() {
            println!();
            println!("📚 Sources ({}):", result.documents.len());
            for (idx, doc) in result.documents.iter().enumerate() {
                println!(
                    "  {}. {} ({}, score {:.3})",
                    idx + 1,
                    doc.title.as_deref().unwrap_or("untitled"),
                    doc.id,
                    doc.score
                );
            }
        }
        println!();
        println!("⏱️  Total: {}ms", result.total_ms);
    }

    if let Some(error) = &record.error {
        print_error(&format!("Error: {error}"));
    }
}

/// One line per run
pub fn print_run_list(records: &[RunRecord]) {
    println!("Found {} runs:", records.len());
    for record in records {
        println!(
            "  - {} | {} | {} | {}",
            record.id,
            record.status,
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            truncate_str(&record.question, 60)
        );
    }
}

/// Print a live hub message; acknowledgments are skipped
pub fn print_server_message(text: &str) {
    let Ok(message) = serde_json::from_str::<ServerMessage>(text) else {
        return;
    };
    if let ServerMessage::RunUpdate { update, .. } = message {
        let elapsed = update
            .elapsed_ms
            .map(|ms| format!(" ({ms}ms)"))
            .unwrap_or_default();
        match (update.stage, update.error) {
            (Some(stage), Some(error)) => println!("  ✗ {stage}{elapsed}: {error}"),
            (Some(stage), None) => println!("  ✓ {stage}{elapsed}"),
            (None, Some(error)) => println!("  {}{elapsed}: {error}", update.status),
            (None, None) => println!("  → {}{elapsed}", update.status),
        }
    }
}

pub fn print_config(config: &AppConfig) {
    println!("📋 ragrun Configuration:");
    println!();

    println!("🗄️  Database:");
    println!("  URL: {}", mask_database_url(config.database_url()));
    println!("  Max connections: {}", config.max_connections());
    println!("  Min connections: {}", config.min_connections());
    println!("  Connection timeout: {}s", config.connection_timeout());
    println!();

    println!("📝 Logging:");
    println!("  Level: {}", config.logging.level);
    println!("  Backtrace: {}", config.logging.backtrace);
    println!();

    println!("🧠 Embeddings:");
    println!("  Dimension: {}", config.embedding_dimension());
    println!("  Model: {}", config.embedding_model());
    println!("  Endpoint: {}", config.embedding_endpoint());
    println!();

    println!("🤖 LLM:");
    println!("  Endpoint: {}", config.llm_endpoint());
    println!("  Model: {}", config.llm_model());
    println!();

    println!("🔎 Retrieval:");
    println!("  Top k: {}", config.retrieval.top_k);
    match config.retrieval.min_score {
        Some(score) => println!("  Min score: {score}"),
        None => println!("  Min score: none"),
    }
    println!("  Max context chars: {}", config.retrieval.max_context_chars);
    println!();

    println!("⚙️  Pipeline:");
    println!("  Temperature: {}", config.pipeline.temperature);
    println!("  Max tokens: {}", config.pipeline.max_tokens);
    match config.pipeline.stage_timeout_secs {
        Some(secs) => println!("  Stage timeout: {secs}s"),
        None => println!("  Stage timeout: none"),
    }
    println!();

    println!("🌐 Server:");
    println!("  Address: {}", config.bind_address());
    println!("  CORS: {}", config.server.enable_cors);
    println!("  Shutdown grace: {}s", config.server.shutdown_grace_secs);
    println!("  Session buffer: {}", config.notifications.session_buffer);
    println!("  Run store: {:?}", config.store.backend);
}

/// Mask database URL for logging (hide password)
fn mask_database_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        if let Some(host) = parsed.host_str() {
            format!(
                "{}://{}@{}:{}",
                parsed.scheme(),
                parsed.username(),
                host,
                parsed.port().unwrap_or(5432)
            )
        } else {
            "***masked***".to_string()
        }
    } else {
        "***invalid***".to_string()
    }
}

pub fn print_info(msg: &str) {
    println!("ℹ️  {msg}");
}

pub fn print_success(msg: &str) {
    println!("✅ {msg}");
}

pub fn print_warning(msg: &str) {
    println!("⚠️  {msg}");
}

pub fn print_error(msg: &str) {
    println!("❌ {msg}");
}
