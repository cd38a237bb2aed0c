//! Forum Bindings Backend
//!
//! REST backend that binds a company to one of its forum experiences, keeps
//! per-company custom post field schemas and stores field values per post.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod platform;
mod resolver;

use std::sync::Arc;

use axum::{
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Config, LogFormat};
use db::Repository;
use errors::AppError;
use platform::{HttpPlatformClient, PlatformApi};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub platform: Arc<dyn PlatformApi>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    tracing::info!("Starting Forum Bindings Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Platform API: {}", config.platform_base_url);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (FORUM_API_PSK). Service authentication is disabled!");
    }
    if config.default_company_id.is_some() {
        tracing::info!("Default company configured for unresolved requests");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Host platform client
    let platform = Arc::new(HttpPlatformClient::new(
        &config.platform_base_url,
        config.platform_api_key.clone(),
        config.platform_timeout,
    )?);

    // Create application state
    let state = AppState {
        repo,
        platform,
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();
    let request_timeout = state.config.request_timeout;

    // API routes
    let api_routes = Router::new()
        // Bindings
        .route(
            "/bindings",
            get(api::list_bindings).post(api::create_binding),
        )
        .route(
            "/bindings/{company_id}",
            get(api::list_company_bindings)
                .post(api::bind_company_forum)
                .delete(api::unbind_company_forum),
        )
        .route("/bindings/{company_id}/active", get(api::get_active_binding))
        // Schemas
        .route(
            "/schema/{company_id}",
            get(api::get_schema).put(api::save_schema),
        )
        // Post metadata
        .route(
            "/post-metadata",
            get(api::get_metadata_by_post).post(api::create_metadata),
        )
        .route(
            "/post-metadata/{id}",
            get(api::get_metadata).patch(api::attach_post),
        )
        // Platform listings and feeds
        .route("/company-experiences", get(api::list_company_experiences))
        .route("/company-forums", get(api::list_company_forums))
        .route("/forum", get(api::list_forum_posts))
        .route("/forum/{forum_id}/posts", post(api::create_post))
        .route("/feed", get(api::get_feed))
        .route("/feed/{experience_id}", get(api::get_experience_feed))
        .route(
            "/experiences/{experience_id}/forum",
            get(api::get_context_forum),
        )
        .route(
            "/experiences/{experience_id}/compose",
            get(api::get_compose_context),
        )
        // Dashboard
        .route("/dashboard/context", get(api::dashboard_context))
        .route(
            "/dashboard/{company_id}/context",
            get(api::dashboard_company_context),
        )
        .route("/dashboard/company", post(api::select_dashboard_company))
        .route("/me", get(api::get_me))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::map_response(timeout_envelope))
                .layer(cors)
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                )),
        )
        .with_state(state)
}

/// Wrap the bare timeout response in the error envelope.
async fn timeout_envelope(response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT
        && !response.headers().contains_key(header::CONTENT_TYPE)
    {
        tracing::warn!("Request timed out");
        return AppError::Timeout("Request timed out".to_string()).into_response();
    }
    response
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
