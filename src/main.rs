use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tablebook::config::AppConfig;
use tablebook::db::{self, Store};
use tablebook::handlers;
use tablebook::services::ai::groq::GroqProvider;
use tablebook::services::ai::ollama::OllamaProvider;
use tablebook::services::ai::LlmProvider;
use tablebook::services::booking::BookingService;
use tablebook::services::conversation;
use tablebook::services::recommend::{CatalogRecommender, HttpRecommender, Recommender};
use tablebook::state::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let store = Store::open(&config.database_url, config.store_timeout)?;
    if let Some(seed_file) = &config.seed_file {
        db::seed_from_file(&store, seed_file).await?;
    }

    let llm: Box<dyn LlmProvider> = match config.llm_provider.as_str() {
        "groq" => {
            anyhow::ensure!(!config.groq_api_key.is_empty(), "GROQ_API_KEY must be set when LLM_PROVIDER=groq");
            tracing::info!("using Groq LLM provider (model: {})", config.groq_model);
            Box::new(GroqProvider::new(config.groq_api_key.clone(), config.groq_model.clone()))
        }
        _ => {
            tracing::info!("using Ollama LLM provider (url: {}, model: {})", config.ollama_url, config.ollama_model);
            Box::new(OllamaProvider::new(config.ollama_url.clone(), config.ollama_model.clone()))
        }
    };

    let recommender: Box<dyn Recommender> = match &config.recommender_url {
        Some(url) => {
            tracing::info!("using recommendation service at {url}");
            Box::new(HttpRecommender::new(url.clone()))
        }
        None => {
            tracing::info!("using catalog recommender");
            Box::new(CatalogRecommender::new(store.clone()))
        }
    };

    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
        None => CorsLayer::permissive(),
    };

    let state = Arc::new(AppState {
        bookings: BookingService::new(store.clone()),
        store,
        config: config.clone(),
        llm,
        recommender,
    });

    let sweeper = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = conversation::sweep_expired(&sweeper).await {
                tracing::warn!(error = %e, "conversation sweep failed");
            }
        }
    });

    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
