#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use realty_insight::backend::memory::InMemoryBackend;
use realty_insight::config::{AuthConfig, UploadConfig};
use realty_insight::context::{AuthContext, AuthStatus};
use realty_insight::shell::{self, ShellState};
use realty_insight::types::Role;

pub const PASSWORD: &str = "secret123";

/// Fresh backend and context; not initialized
pub fn context() -> (Arc<InMemoryBackend>, AuthContext) {
    context_with(AuthConfig::default())
}

pub fn context_with(config: AuthConfig) -> (Arc<InMemoryBackend>, AuthContext) {
    let backend = Arc::new(InMemoryBackend::new(&config));
    let ctx = AuthContext::with_backend(backend.clone(), config);
    (backend, ctx)
}

/// Register one account per role and return their subject ids
pub struct Accounts {
    pub admin: String,
    pub landlord: String,
    pub tenant: String,
}

pub fn seed(backend: &InMemoryBackend) -> Accounts {
    Accounts {
        admin: backend.add_account("admin@example.com", PASSWORD, Some("Avery Admin"), Role::SuperAdmin),
        landlord: backend.add_account("landlord@example.com", PASSWORD, Some("Lee Landlord"), Role::Landlord),
        tenant: backend.add_account("tenant@example.com", PASSWORD, Some("Taylor Tenant"), Role::Tenant),
    }
}

/// Initialized context signed in as `email`
pub async fn signed_in(email: &str) -> Result<(Arc<InMemoryBackend>, AuthContext)> {
    let (backend, ctx) = context();
    seed(&backend);
    ctx.init().await;
    ctx.login(email, PASSWORD).await.context("login")?;
    assert_eq!(ctx.state().status, AuthStatus::Authenticated);
    Ok((backend, ctx))
}

pub fn router(ctx: &AuthContext) -> Router {
    shell::routes(ShellState::new(ctx.clone(), UploadConfig::default()))
}

pub async fn send(app: &Router, request: Request<Body>) -> Result<Response<Body>> {
    Ok(app.clone().oneshot(request).await?)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub async fn body_json(response: Response<Body>) -> Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
