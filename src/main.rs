//! Taskforge Backend
//!
//! REST backend for projects, tasks and developer metrics with SQLite persistence.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod lifecycle;
mod mail;
mod metrics;
mod models;
mod notify;
mod requirements;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::TokenKeys;
use config::{Config, LogFormat};
use db::Repository;
use mail::{LogMailer, Mailer};
use notify::NotificationHub;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
    pub tokens: Arc<TokenKeys>,
    pub mailer: Arc<dyn Mailer>,
    pub notifications: Arc<NotificationHub>,
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

    tracing::info!("Starting Taskforge Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    let secret = match &config.jwt_secret {
        Some(secret) => secret.clone(),
        None => {
            tracing::warn!(
                "No JWT secret configured (PM_JWT_SECRET). Tokens will not survive a restart!"
            );
            auth::random_code(64)
        }
    };

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool, config.ownership_policy));

    let state = AppState {
        repo,
        tokens: Arc::new(TokenKeys::new(secret.as_bytes(), config.token_ttl_hours)),
        mailer: Arc::new(LogMailer),
        notifications: Arc::new(NotificationHub::new()),
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
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

    // Account routes reachable without a token
    let public_routes = Router::new()
        .route("/accounts/register", post(api::register))
        .route("/accounts/verify-email", post(api::verify_email))
        .route("/accounts/login", post(api::login))
        .route(
            "/accounts/password-reset-request",
            post(api::request_password_reset),
        )
        .route("/accounts/password-reset", post(api::reset_password));

    let protected_routes = Router::new()
        // Accounts
        .route("/accounts/me", get(api::get_me).delete(api::delete_me))
        // Projects
        .route(
            "/projects",
            get(api::list_projects).post(api::create_project),
        )
        .route(
            "/projects/{id}",
            get(api::get_project)
                .put(api::update_project)
                .delete(api::delete_project),
        )
        .route(
            "/projects/{id}/developers",
            get(api::list_project_developers).post(api::add_project_developers),
        )
        .route(
            "/projects/{id}/developers/{developer_id}",
            axum::routing::delete(api::remove_project_developer),
        )
        .route(
            "/projects/{id}/requirements",
            axum::routing::put(api::edit_requirements),
        )
        .route(
            "/projects/{id}/requirements/accept",
            post(api::accept_requirements),
        )
        .route(
            "/projects/{id}/tasks",
            get(api::list_project_tasks).post(api::create_task),
        )
        // Tasks
        .route("/tasks", get(api::list_tasks))
        .route(
            "/tasks/{id}",
            get(api::get_task)
                .put(api::update_task)
                .delete(api::delete_task),
        )
        .route(
            "/tasks/{id}/developers",
            post(api::assign_task_developers).delete(api::unassign_task_developers),
        )
        .route("/tasks/{id}/start", post(api::start_task))
        .route("/tasks/{id}/complete", post(api::complete_task))
        .route("/tasks/{id}/restart", post(api::restart_task))
        .route("/tasks/{id}/review", get(api::review_task))
        // Metrics
        .route("/metrics/developers", get(api::developer_metrics))
        .route("/metrics/me", get(api::my_metrics))
        // To-dos
        .route("/todos", get(api::list_todos).post(api::create_todo))
        .route(
            "/todos/{id}",
            get(api::get_todo)
                .put(api::update_todo)
                .delete(api::delete_todo),
        )
        // Notifications
        .route("/notifications/stream", get(api::notification_stream))
        // Apply bearer auth middleware
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", public_routes.merge(protected_routes))
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
