use axum::{
    extract::{Path, Query, RawQuery, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiResponse, ApiResult, ShellState};
use crate::directory::{self, DirectoryEntry};
use crate::error::{ApiError, FieldErrors};
use crate::guard::{Guarded, RouteGuard};
use crate::nav::{nav_entries, portal_badge};
use crate::types::Role;
use crate::upload::{self, UploadCandidate};

#[derive(Debug, Deserialize)]
pub struct DirectoryQuery {
    pub role: Option<Role>,
}

/// GET /api/nav
pub async fn nav(State(shell): State<ShellState>) -> impl IntoResponse {
    let flags = shell.auth.flags();
    ApiResponse::success(json!({
        "entries": nav_entries(flags),
        "badge": portal_badge(flags),
        "flags": flags,
    }))
}

/// GET /api/directory?role=landlord
pub async fn directory(
    State(shell): State<ShellState>,
    Query(query): Query<DirectoryQuery>,
) -> ApiResult<Vec<DirectoryEntry>> {
    let entries = directory::list_directory(&shell.auth, query.role).await?;
    Ok(ApiResponse::success(entries))
}

/// POST /api/uploads/validate
pub async fn validate_upload(
    State(shell): State<ShellState>,
    Json(candidate): Json<UploadCandidate>,
) -> ApiResult<UploadCandidate> {
    match upload::validate_upload(&candidate, &shell.upload) {
        Ok(()) => Ok(ApiResponse::success(candidate)),
        Err(e) => {
            let message = e.to_string();
            let mut field_errors = FieldErrors::new();
            field_errors.insert("file".to_string(), message.clone());
            Err(ApiError::validation(message, field_errors))
        }
    }
}

/// GET /view
pub async fn view_root(State(shell): State<ShellState>, RawQuery(query): RawQuery) -> Response {
    resolve_view(&shell, "/", query)
}

/// GET /view/*path - resolve a page through the route guard
pub async fn view(State(shell): State<ShellState>, Path(path): Path<String>, RawQuery(query): RawQuery) -> Response {
    resolve_view(&shell, &format!("/{}", path.trim_start_matches('/')), query)
}

fn resolve_view(shell: &ShellState, path: &str, query: Option<String>) -> Response {
    let location = match query {
        Some(q) if !q.is_empty() => format!("{}?{}", path, q),
        _ => path.to_string(),
    };

    let state = shell.auth.state();
    let guard = RouteGuard::new(&shell.auth);
    let guarded = guard.guard_path(&state, &location, |route, user| {
        json!({
            "view": route.view,
            "route": route.pattern,
            "user": user,
        })
    });

    match guarded {
        None => ApiError::not_found(format!("No page at '{}'", path)).into_response(),
        Some(Guarded::Loading) => ApiResponse::accepted(json!({ "loading": true })).into_response(),
        Some(Guarded::Redirect(redirect)) => (
            [(header::LOCATION, redirect.location())],
            ApiResponse::with_status(StatusCode::SEE_OTHER, json!({ "redirect": redirect })),
        )
            .into_response(),
        Some(Guarded::Render(view)) => ApiResponse::success(view).into_response(),
    }
}
