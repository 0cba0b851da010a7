use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;

use fit_coach::auth::{IdentityProvider, StaticTokenIdentity, auth_middleware};
use fit_coach::chat::{ChatRouteState, ChatService, chat_routes};
use fit_coach::config::{LlmConfig, ServerConfig};
use fit_coach::llm::{AnthropicProvider, LlmProvider};
use fit_coach::onboarding::engine::ProgressionEngine;
use fit_coach::onboarding::{OnboardingRouteState, onboarding_routes};
use fit_coach::profile::{
    ProfileLedger, ProfileMaterializer, ProfileRouteState, profile_routes,
};
use fit_coach::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env()?;
    let llm_config = LlmConfig::from_env()?;

    eprintln!("🏋️ Fit Coach v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   API: http://0.0.0.0:{}/api", config.port);
    eprintln!("   Chat SSE: POST http://0.0.0.0:{}/api/chat", config.port);
    eprintln!("   Database: {}", config.db_path.display());

    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
    let llm: Arc<dyn LlmProvider> = Arc::new(AnthropicProvider::new(llm_config));

    let engine = Arc::new(ProgressionEngine::new(Arc::clone(&db)));
    let materializer = Arc::new(ProfileMaterializer::new(
        Arc::clone(&db),
        Arc::clone(&engine),
    ));
    let ledger = Arc::new(ProfileLedger::new(Arc::clone(&db)));
    let chat_service = Arc::new(ChatService::new(
        Arc::clone(&llm),
        Arc::clone(&engine),
        config.stream_idle_timeout,
    ));

    let identity: Arc<dyn IdentityProvider> =
        Arc::new(StaticTokenIdentity::from_env().ok_or_else(|| {
            anyhow::anyhow!(
                "FIT_COACH_TOKENS must be set to at least one token:user_id pair"
            )
        })?);

    let app = Router::new()
        .route("/health", get(health))
        .merge(onboarding_routes(OnboardingRouteState {
            engine: Arc::clone(&engine),
            materializer,
        }))
        .merge(profile_routes(ProfileRouteState { ledger }))
        .merge(chat_routes(ChatRouteState {
            service: chat_service,
            engine,
            history_limit: config.history_limit,
        }))
        .layer(axum::middleware::from_fn_with_state(
            identity,
            auth_middleware,
        ))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "Server started");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({"status": "ok"}))
}
