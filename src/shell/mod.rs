//! HTTP shell over one process-wide [`AuthContext`].
//!
//! Handlers are thin: every decision (session state, role gating, navigation,
//! upload acceptance) lives in the library modules and is only rendered here.

pub mod auth;
pub mod response;
pub mod views;

use axum::{
    http::HeaderValue,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::UploadConfig;
use crate::context::AuthContext;

pub use response::{ApiResponse, ApiResult};

/// Shared handler state
#[derive(Clone)]
pub struct ShellState {
    pub auth: AuthContext,
    pub upload: UploadConfig,
}

impl ShellState {
    pub fn new(auth: AuthContext, upload: UploadConfig) -> Self {
        Self { auth, upload }
    }
}

/// Routes without global middleware
pub fn routes(state: ShellState) -> Router {
    Router::new()
        // Public
        .route("/health", get(health))
        // Session
        .route("/api/auth/state", get(auth::state))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/profile", put(auth::update_profile))
        // Role-driven surfaces
        .route("/api/nav", get(views::nav))
        .route("/api/directory", get(views::directory))
        .route("/api/uploads/validate", post(views::validate_upload))
        .route("/view", get(views::view_root))
        .route("/view/*path", get(views::view))
        .with_state(state)
}

/// Routes plus CORS and request tracing
pub fn app(state: ShellState, cors_origins: &[String], request_logging: bool) -> Router {
    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = routes(state).layer(cors);
    if request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
