//! services/api/src/bin/api.rs

use api_lib::{
    adapters::db::DbAdapter,
    config::Config,
    error::ApiError,
    web::{
        auth::{login_handler, logout_handler, signup_handler},
        middleware::require_auth,
        rest::{
            activity_handler, complete_challenge_handler, complete_teachback_handler,
            create_challenge_handler, dashboard_handler, get_challenge_handler,
            get_feedback_handler, get_teachback_handler, leaderboard_handler,
            list_challenges_handler, list_feedback_handler, list_teachbacks_handler,
            save_challenge_progress_handler, save_teachback_progress_handler,
            start_challenge_handler, start_teachback_handler, submit_feedback_handler, ApiDoc,
        },
        state::AppState,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter
        .run_migrations()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    info!("Database migrations complete.");

    // --- 3. Build the Shared AppState (store + workflow components) ---
    let app_state = Arc::new(AppState::new(db_adapter, config.clone()));

    let cors = CorsLayer::new()
        .allow_origin("http://localhost:5173".parse::<HeaderValue>().unwrap())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 4. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/challenges", post(create_challenge_handler).get(list_challenges_handler))
        .route("/challenges/{id}", get(get_challenge_handler))
        .route("/challenges/{id}/start", post(start_challenge_handler))
        .route("/challenges/{id}/progress", post(save_challenge_progress_handler))
        .route("/challenges/{id}/complete", post(complete_challenge_handler))
        .route("/teachbacks", get(list_teachbacks_handler))
        .route("/teachbacks/{id}", get(get_teachback_handler))
        .route("/teachbacks/{id}/start", post(start_teachback_handler))
        .route("/teachbacks/{id}/progress", post(save_teachback_progress_handler))
        .route("/teachbacks/{id}/complete", post(complete_teachback_handler))
        .route("/feedback", get(list_feedback_handler))
        .route("/feedback/{id}", get(get_feedback_handler).post(submit_feedback_handler))
        .route("/activity", get(activity_handler))
        .route("/dashboard", get(dashboard_handler))
        .route("/leaderboard", get(leaderboard_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
