//! kbase: knowledge-base retrieval server.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use kbase_core::KbaseConfig;
use kbase_runtime::Orchestrator;
use kbase_server::{build_router, AppState};

fn resolve_data_dir() -> PathBuf {
    std::env::var("KBASE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--help" | "-h" | "help" => {
                println!("kbase: knowledge-base retrieval server");
                println!();
                println!("Usage: kbase");
                println!();
                println!("Environment:");
                println!("  KBASE_DATA_DIR        data directory (default ./data)");
                println!("  PORT                  listen port (default 3003)");
                println!("  OPENAI_API_KEY        enables the HTTP embedder and OpenAI chat");
                println!("  ANTHROPIC_API_KEY     enables Anthropic chat");
                println!("  GROQ_API_KEY          enables Groq chat");
                println!("  KBASE_RERANK_STAGES   e.g. dedup,keyword,embedding,llm");
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {}. Use 'kbase help' for usage.", other);
                std::process::exit(1);
            }
        }
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = KbaseConfig::from_env(&data_dir)?;
    let port = config.port;

    let orchestrator = Orchestrator::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to start orchestrator: {}", e))?;

    let state = Arc::new(AppState::new(config, orchestrator));
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("kbase server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
