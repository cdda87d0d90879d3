use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use std::sync::Arc;

use crate::answer::AnswerPipeline;
use crate::config::Config;
use crate::llm::AnthropicClient;
use crate::relay::RelayConfig;
use crate::search::{SerpApiClient, SourceLookup};

pub mod handlers;
pub mod models;

/// Services shared by every handler. Built once per process; cloning only
/// bumps reference counts.
#[derive(Clone)]
pub struct AppState {
    pub sources: SourceLookup,
    pub pipeline: AnswerPipeline,
    pub relay: RelayConfig,
    pub credentials: Credentials,
}

impl AppState {
    /// Wires the real providers from configuration. Missing keys don't fail
    /// here; the affected endpoints report them per request.
    pub fn from_config(config: &Config) -> Self {
        let search = SerpApiClient::new(config.serpapi_key.clone(), &config.serpapi_base_url)
            .with_engine(&config.serpapi_engine);
        let generation = AnthropicClient::new(
            config.anthropic_api_key.clone(),
            &config.anthropic_base_url,
            &config.anthropic_model,
        )
        .with_max_tokens(config.max_tokens);

        let credentials = Credentials {
            search: search.has_api_key(),
            generation: generation.has_api_key(),
        };
        if !credentials.search {
            tracing::warn!("SERPAPI_KEY is not set, search requests will fail");
        }
        if !credentials.generation {
            tracing::warn!("ANTHROPIC_API_KEY is not set, answer requests will fail");
        }

        let sources = SourceLookup::new(Arc::new(search));
        let pipeline = AnswerPipeline::new(sources.clone(), Arc::new(generation));
        AppState {
            sources,
            pipeline,
            relay: RelayConfig::from(config),
            credentials,
        }
    }
}

/// Which provider keys were present at startup.
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials {
    pub search: bool,
    pub generation: bool,
}

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/sources", post(handlers::sources_handler))
        .route("/api/answer", post(handlers::answer_handler))
        .route("/api/query", post(handlers::query_handler))
        .route("/api/health", get(handlers::health_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}
