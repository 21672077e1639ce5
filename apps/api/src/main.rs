mod cache;
mod collaborators;
mod config;
mod errors;
mod llm_client;
mod models;
mod recommendations;
mod resilience;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::{MemoryTier, RedisTier, TieredCache};
use crate::collaborators::{InMemoryCvStore, TracingMetricsSink, UnmeteredLimiter};
use crate::config::Config;
use crate::llm_client::{AiClient, AnthropicProvider, ProviderRoute};
use crate::models::recommendation::SourceTier;
use crate::recommendations::fallback::FallbackTable;
use crate::recommendations::{Collaborators, RecommendationOrchestrator};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Recommendation API v{}", env!("CARGO_PKG_VERSION"));

    // Cache tiers: in-process moka over shared Redis
    let redis = redis::Client::open(config.redis_url.clone())?;
    let tier2 = Arc::new(RedisTier::connect(redis, config.tier2_timeout()).await?);
    info!("Redis tier-2 cache connected");
    let tier1 = Arc::new(MemoryTier::new(SourceTier::Tier1, config.tier1_max_entries));
    let cache = Arc::new(TieredCache::two_level(tier1, tier2, config.tier_ttls()));

    // AI providers, each behind its own circuit breaker
    let primary = AnthropicProvider::new(
        "anthropic-primary",
        config.anthropic_api_key.clone(),
        llm_client::MODEL,
        config.provider_timeout(),
    )?;
    let secondary = if config.enable_fallback_provider {
        let provider = AnthropicProvider::new(
            "anthropic-fallback",
            config.anthropic_api_key.clone(),
            llm_client::FALLBACK_MODEL,
            config.provider_timeout(),
        )?;
        Some(ProviderRoute::new(Arc::new(provider), config.breaker()))
    } else {
        warn!("Fallback provider disabled; primary outages degrade straight to static advice");
        None
    };
    let client = Arc::new(AiClient::new(
        ProviderRoute::new(Arc::new(primary), config.breaker()),
        secondary,
        config.retry(),
    ));
    info!("AI client initialized (model: {})", llm_client::MODEL);

    let cv_store = Arc::new(InMemoryCvStore::new());
    let orchestrator = Arc::new(RecommendationOrchestrator::new(
        cache,
        client,
        FallbackTable::builtin(),
        Collaborators {
            cv_store: cv_store.clone(),
            limiter: Arc::new(UnmeteredLimiter),
            metrics: Arc::new(TracingMetricsSink),
        },
        config.orchestrator(),
    ));

    // Build app state
    let state = AppState {
        orchestrator,
        cv_store,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
