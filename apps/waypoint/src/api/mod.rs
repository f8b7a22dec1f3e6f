//! # Waypoint HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check (no owner required)
//! - `GET|POST /goals` - List (filtered) / create goals
//! - `GET /goals/tree`, `GET /goals/stats` - Nested tree, per-level stats
//! - `GET|PATCH|DELETE /goals/{id}` - Goal detail / update / cascading delete
//! - `GET /goals/{id}/children`, `GET /goals/{id}/path` - Children, ancestors
//! - `GET|POST /events`, `GET|PATCH|DELETE /events/{id}` - Calendar events
//! - `GET|POST /categories`, `GET|PATCH|DELETE /categories/{id}` - Categories
//! - `GET|PATCH /profile`, `PUT /profile/preferences` - Profile
//! - `GET /dashboard[/today|/overdue|/metrics]` - Dashboard aggregates
//!
//! ## Security Configuration
//!
//! - `[[accounts]]`: bearer tokens, each mapped to one owner
//! - `cors_origins` / `WAYPOINT_CORS_ORIGINS`: comma-separated origins, or "*" (default: localhost only)
//! - `rate_limit` / `WAYPOINT_RATE_LIMIT`: requests per second (default: 100, 0 to disable)

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{Accounts, Owner};
pub use middleware::create_rate_limiter;
pub use types::{
    ApiError, CategoryDeleted, ErrorBody, EventDeleted, EventQuery, GoalDeleted, GoalQuery,
    HealthResponse, NowQuery, OverdueQuery,
};

use crate::config::Config;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, put},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use waypoint_core::{Planner, WaypointError};

/// Maximum request body size (2 MiB).
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PATCH,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the planner.
#[derive(Clone)]
pub struct AppState {
    /// Reads share the lock; every mutation is exclusive.
    pub planner: Arc<RwLock<Planner>>,
    /// Backend name reported by `/health`.
    pub backend: &'static str,
}

impl AppState {
    #[must_use]
    pub fn new(planner: Planner) -> Self {
        let backend = planner.store().name();
        Self {
            planner: Arc::new(RwLock::new(planner)),
            backend,
        }
    }
}

/// Router settings taken from `[server]` and `[[accounts]]`.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub accounts: Accounts,
    pub cors_origins: Option<String>,
    pub rate_limit: u32,
}

impl ApiSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            accounts: Accounts::new(&config.accounts, config.dev_owner()),
            cors_origins: config.server.cors_origins.clone(),
            rate_limit: config.server.rate_limit,
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer.
///
/// - `Some("*")`: allows all origins (development only)
/// - `None`: localhost only
/// - Otherwise: the comma-separated list of origins
fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some("*") => {
            tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods(ALLOWED_METHODS)
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => build_localhost_cors(),
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(ALLOWED_METHODS)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Rate Limiting (if enabled)
/// 5. Owner resolution
pub fn create_router(state: AppState, settings: &ApiSettings) -> Router {
    if settings.accounts.is_development() {
        tracing::warn!(
            dev_owner = settings.accounts.dev_owner().0,
            "No accounts configured - every request acts as the development owner"
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/goals",
            get(handlers::list_goals_handler).post(handlers::create_goal_handler),
        )
        .route("/goals/tree", get(handlers::goal_tree_handler))
        .route("/goals/stats", get(handlers::goal_stats_handler))
        .route(
            "/goals/{id}",
            get(handlers::get_goal_handler)
                .patch(handlers::update_goal_handler)
                .delete(handlers::delete_goal_handler),
        )
        .route("/goals/{id}/children", get(handlers::goal_children_handler))
        .route("/goals/{id}/path", get(handlers::goal_path_handler))
        .route(
            "/events",
            get(handlers::list_events_handler).post(handlers::create_event_handler),
        )
        .route(
            "/events/{id}",
            get(handlers::get_event_handler)
                .patch(handlers::update_event_handler)
                .delete(handlers::delete_event_handler),
        )
        .route(
            "/categories",
            get(handlers::list_categories_handler).post(handlers::create_category_handler),
        )
        .route(
            "/categories/{id}",
            get(handlers::get_category_handler)
                .patch(handlers::update_category_handler)
                .delete(handlers::delete_category_handler),
        )
        .route(
            "/profile",
            get(handlers::get_profile_handler).patch(handlers::update_profile_handler),
        )
        .route(
            "/profile/preferences",
            put(handlers::update_preferences_handler),
        )
        .route("/dashboard", get(handlers::dashboard_handler))
        .route("/dashboard/today", get(handlers::today_handler))
        .route("/dashboard/overdue", get(handlers::overdue_handler))
        .route("/dashboard/metrics", get(handlers::metrics_handler));

    // Owner resolution runs innermost, right before the handler.
    router = router.layer(axum_middleware::from_fn_with_state(
        Arc::new(settings.accounts.clone()),
        auth::owner_auth_middleware,
    ));

    match create_rate_limiter(settings.rate_limit) {
        Some(limiter) => {
            tracing::info!("Rate limiting enabled: {} requests/second", settings.rate_limit);
            router = router.layer(axum_middleware::from_fn_with_state(
                limiter,
                middleware::rate_limit_middleware,
            ));
        }
        None => tracing::info!("Rate limiting disabled"),
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(settings.cors_origins.as_deref()))
                .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server and run until Ctrl+C.
pub async fn run_server(config: &Config, planner: Planner) -> Result<(), WaypointError> {
    let addr = config.bind_addr();
    let router = create_router(AppState::new(planner), &ApiSettings::from_config(config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| WaypointError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("Waypoint HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| WaypointError::Io(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
