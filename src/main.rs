//! Meta-prompter - planner/expert chat agent
//!
//! A Rust backend that drives a planner and an expert model through a
//! bounded turn loop, checkpointing every step to SQLite.

mod api;
mod config;
mod db;
mod llm;
mod runtime;
mod state_machine;
mod system_prompt;
mod tools;

use api::{create_router, AppState, ToolInfo};
use config::AppConfig;
use db::Database;
use llm::{build_service, LlmConfig};
use runtime::{AgentConfig, ServiceLlmClient, TurnController};
use std::net::SocketAddr;
use tools::{ToolConfig, ToolRegistry};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meta_prompter=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = AppConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database
    tracing::info!(
        path = %config.db_path.display(),
        max_connections = config.pool.max_connections,
        "Opening checkpoint store"
    );
    let db = Database::open(&config.db_path, &config.pool).await?;

    // Initialize LLM
    let service = build_service(&LlmConfig::from_env()).inspect_err(|e| {
        tracing::error!(error = %e, "No usable LLM provider. Set OPENAI_API_KEY or ANTHROPIC_API_KEY.");
    })?;

    // Initialize tools
    let registry = ToolRegistry::standard(&ToolConfig::from_env());
    if registry.names().is_empty() {
        tracing::warn!("No tools available; the expert will answer from the model alone");
    }
    let tools = registry
        .describe()
        .into_iter()
        .map(|(name, description)| ToolInfo { name, description })
        .collect();

    let agent_config = AgentConfig {
        max_turns: config.max_turns,
        planner_instructions: system_prompt::load_planner_instructions(
            config.planner_prompt_path.as_deref(),
        ),
    };
    tracing::info!(max_turns = agent_config.max_turns, "Turn controller configured");

    let controller = TurnController::new(
        db.clone(),
        ServiceLlmClient::new(service),
        registry,
        agent_config,
    );

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(AppState::new(controller, db, tools))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Meta-prompter server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
