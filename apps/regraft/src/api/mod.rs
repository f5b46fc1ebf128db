//! # Regraft HTTP API Module
//!
//! This module implements the HTTP REST API server using axum, serving a
//! local calculation store over the same contract as the remote service.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Store status
//! - `GET /calc/{id}` - Fetch a calculation
//! - `POST /calc` - Store a calculation
//! - `POST /calc/substitute` - Substitute one calculation for another
//! - `POST /calc/search` - Search a calculation graph by function name
//! - `GET /id/{id}/service` - Classify an identifier
//!
//! The `context` query parameter sent by clients is accepted and ignored.
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `REGRAFT_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `REGRAFT_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `REGRAFT_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{ApiKey, get_api_key_from_env};
pub use handlers::{
    get_calculation_handler, health_handler, post_calculation_handler, search_handler,
    service_handler, status_handler, substitute_handler,
};
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    ApiError, ErrorResponse, HealthResponse, PostResponse, SearchRequest, SearchResponse,
    ServiceResponse, StatusResponse, SubstituteRequest, SubstituteResponse,
};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use regraft_core::{RegraftError, StoreBackend};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Largest accepted request body: 2 MiB.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Origins allowed when no CORS configuration is given.
const LOCALHOST_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://localhost:8080",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:8080",
];

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the calculation store.
#[derive(Clone)]
pub struct AppState {
    /// The local store served to clients.
    pub store: Arc<RwLock<StoreBackend>>,
}

impl AppState {
    /// Create new app state around a store.
    #[must_use]
    pub fn new(store: StoreBackend) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }
}

// =============================================================================
// SECURITY SETTINGS
// =============================================================================

/// Allowed CORS origins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    /// Any origin (`REGRAFT_CORS_ORIGINS=*`).
    Any,
    /// The listed origins only.
    List(Vec<String>),
    /// The localhost development origins.
    Localhost,
}

impl CorsOrigins {
    /// Interpret a `REGRAFT_CORS_ORIGINS` value.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::Localhost,
            Some("*") => Self::Any,
            Some(list) => Self::List(
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
        }
    }

    fn layer(&self) -> CorsLayer {
        let allowed: Vec<HeaderValue> = match self {
            Self::Any => {
                tracing::warn!("CORS: allowing ALL origins; do not use this in production");
                return CorsLayer::permissive();
            }
            Self::Localhost => parse_header_values(&LOCALHOST_ORIGINS),
            Self::List(origins) => {
                let parsed = parse_header_values(origins);
                if parsed.is_empty() {
                    tracing::warn!("CORS: no valid origins configured, using localhost only");
                    parse_header_values(&LOCALHOST_ORIGINS)
                } else {
                    parsed
                }
            }
        };

        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    }
}

fn parse_header_values<S: AsRef<str>>(origins: &[S]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| {
            let origin = origin.as_ref();
            match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!("CORS: invalid origin '{}': {}", origin, e);
                    None
                }
            }
        })
        .collect()
}

/// Middleware settings for one server.
#[derive(Debug, Clone)]
pub struct ServerSecurity {
    pub cors: CorsOrigins,
    /// Requests per second; `0` disables rate limiting.
    pub rate_limit: u32,
    pub api_key: Option<ApiKey>,
}

impl ServerSecurity {
    /// Read every setting from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            cors: CorsOrigins::parse(std::env::var("REGRAFT_CORS_ORIGINS").ok().as_deref()),
            rate_limit: get_rate_limit_from_env(),
            api_key: get_api_key_from_env().map(ApiKey::new),
        }
    }

    /// No authentication, no rate limit, localhost CORS.
    #[must_use]
    pub fn open() -> Self {
        Self {
            cors: CorsOrigins::Localhost,
            rate_limit: 0,
            api_key: None,
        }
    }
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the router with security settings taken from the environment.
pub fn create_router(state: AppState) -> Router {
    create_router_with(state, &ServerSecurity::from_env())
}

/// Create the router with explicit security settings.
///
/// Middleware stack (outer to inner):
/// 1. Tracing
/// 2. CORS
/// 3. Body limit
/// 4. Rate Limiting (if enabled)
/// 5. Authentication (if configured)
pub fn create_router_with(state: AppState, security: &ServerSecurity) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/calc", post(handlers::post_calculation_handler))
        .route("/calc/substitute", post(handlers::substitute_handler))
        .route("/calc/search", post(handlers::search_handler))
        .route("/calc/{id}", get(handlers::get_calculation_handler))
        .route("/id/{id}/service", get(handlers::service_handler));

    match &security.api_key {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                key.clone(),
                auth::api_key_auth_middleware,
            ));
        }
        None => tracing::warn!(
            "API key authentication DISABLED; set REGRAFT_API_KEY to require a Bearer token"
        ),
    }

    if security.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", security.rate_limit);
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(security.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(security.cors.layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server and run until Ctrl+C.
pub async fn run_server(addr: &str, store: StoreBackend) -> Result<(), RegraftError> {
    let router = create_router(AppState::new(store));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| RegraftError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("Regraft HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| RegraftError::Io(format!("Server error: {}", e)))
}

/// Resolve when the process receives Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_origins_parse() {
        assert_eq!(CorsOrigins::parse(None), CorsOrigins::Localhost);
        assert_eq!(CorsOrigins::parse(Some(" ")), CorsOrigins::Localhost);
        assert_eq!(CorsOrigins::parse(Some("*")), CorsOrigins::Any);
        assert_eq!(
            CorsOrigins::parse(Some("https://a.example, https://b.example,")),
            CorsOrigins::List(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ])
        );
    }

    #[test]
    fn invalid_origins_are_dropped() {
        let parsed = parse_header_values(&["https://ok.example", "bad\norigin"]);
        assert_eq!(parsed.len(), 1);
    }
}
