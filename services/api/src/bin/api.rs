//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, OpenAiEmbeddingAdapter, OpenAiExtractionAdapter},
    config::Config,
    error::ApiError,
    web::{self, rest::ApiDoc, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{extract::DefaultBodyLimit, Router};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::{str::FromStr, sync::Arc};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcript_insights_core::{AnalysisPipeline, InsightStore};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to the Database ---
    info!("Connecting to database...");
    let connect_options =
        PgConnectOptions::from_str(&config.database_url)?.password(&config.database_service_key);
    let db_pool = PgPoolOptions::new()
        .max_connections(config.max_db_connections)
        .connect_with(connect_options)
        .await?;
    let store: Arc<dyn InsightStore> = Arc::new(DbAdapter::new(db_pool));

    // --- 3. Initialize Service Adapters ---
    let openai_client =
        Client::with_config(OpenAIConfig::new().with_api_key(config.openai_api_key.clone()));
    let extraction_adapter = Arc::new(OpenAiExtractionAdapter::new(
        openai_client.clone(),
        config.extraction_model.clone(),
    ));
    let embedding_adapter = Arc::new(OpenAiEmbeddingAdapter::new(
        openai_client,
        config.embedding_model.clone(),
    ));

    // --- 4. Build the Pipeline and Shared AppState ---
    let pipeline = AnalysisPipeline::new(
        extraction_adapter,
        embedding_adapter,
        store.clone(),
        config.pipeline_settings(),
    );
    let app_state = Arc::new(AppState::new(pipeline, store));

    // --- 5. Create the Web Router ---
    let app = Router::new()
        .merge(web::router(app_state).layer(DefaultBodyLimit::max(10 * 1024 * 1024)))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
