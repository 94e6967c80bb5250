use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use health_sales_ai::api;
use health_sales_ai::cache_validator::ResponseCache;
use health_sales_ai::config::Config;
use health_sales_ai::db::Database;
use health_sales_ai::db_storage::ProspectStorage;
use health_sales_ai::enrichment::EnrichmentPipeline;
use health_sales_ai::handlers::{self, AppState};
use health_sales_ai::llm_client::LlmClient;

/// Request bodies are small JSON documents.
const BODY_LIMIT: usize = 1024 * 1024;

/// Main entry point.
///
/// Initializes tracing, configuration, the database (creating the schema if
/// needed), the enrichment pipeline with its response cache and the optional
/// LLM client, then serves the API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "health_sales_ai=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    db.ensure_schema().await?;

    // Registry responses live 24h, CNES responses 7 days
    let pipeline = EnrichmentPipeline::new(&config).with_cache(ResponseCache::new());
    tracing::info!(
        "Enrichment pipeline ready (BrasilAPI: {}, CNES: {})",
        config.brasil_api_base_url,
        config.cnes_api_base_url
    );

    let llm = LlmClient::from_config(&config);
    match &llm {
        Some(client) => tracing::info!("✓ LLM client initialized (model: {})", client.model()),
        None => tracing::warn!("OPENROUTER_API_KEY not set, AI endpoints will answer 503"),
    }
    if config.api_token.is_none() {
        tracing::warn!("API_TOKEN not set, relying on the upstream auth layer only");
    }

    // Build application state
    let app_state = Arc::new(AppState {
        storage: ProspectStorage::new(db.pool.clone()),
        config: config.clone(),
        pipeline,
        llm,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    let protected_routes = api::routes().layer(
        ServiceBuilder::new()
            .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
