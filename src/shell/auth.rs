use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ApiResponse, ApiResult, ShellState};
use crate::context::{AuthState, AuthStatus};
use crate::guard::post_login_target;
use crate::profile::User;
use crate::types::{Role, RoleFlags};

/// Externally visible slice of [`AuthState`]
#[derive(Debug, Serialize)]
pub struct AuthSnapshot {
    pub status: AuthStatus,
    pub loading: bool,
    pub user: Option<User>,
    pub flags: RoleFlags,
    pub error: Option<String>,
}

impl From<&AuthState> for AuthSnapshot {
    fn from(state: &AuthState) -> Self {
        Self {
            status: state.status,
            loading: state.is_loading(),
            user: state.user().cloned(),
            flags: state.flags(),
            error: state.error.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
    /// Location the login redirect remembered
    pub from: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignupBody {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct ProfileBody {
    pub full_name: Option<String>,
}

/// GET /api/auth/state
pub async fn state(State(shell): State<ShellState>) -> ApiResponse<AuthSnapshot> {
    ApiResponse::success(AuthSnapshot::from(&shell.auth.state()))
}

/// POST /api/auth/login
pub async fn login(State(shell): State<ShellState>, Json(body): Json<LoginBody>) -> ApiResult<Value> {
    let user = shell.auth.login(&body.email, &body.password).await?;
    let redirect_to = post_login_target(body.from.as_deref(), shell.auth.config());

    Ok(ApiResponse::success(json!({
        "user": user,
        "redirect_to": redirect_to,
    })))
}

/// POST /api/auth/signup - 201 with the user, or 202 while the address awaits confirmation
pub async fn signup(State(shell): State<ShellState>, Json(body): Json<SignupBody>) -> ApiResult<Value> {
    let created = shell
        .auth
        .signup_as(&body.email, &body.password, &body.name, body.role)
        .await?;

    Ok(match created {
        Some(user) => ApiResponse::created(json!({
            "user": user,
            "redirect_to": shell.auth.config().default_route,
        })),
        None => ApiResponse::accepted(json!({ "confirmation_required": true })),
    })
}

/// POST /api/auth/logout
pub async fn logout(State(shell): State<ShellState>) -> ApiResponse<Value> {
    let signed_out = shell.auth.logout().await;
    ApiResponse::success(json!({
        "signed_out": signed_out,
        "redirect_to": shell.auth.config().login_route,
    }))
}

/// POST /api/auth/refresh - re-read the profile
pub async fn refresh(State(shell): State<ShellState>) -> ApiResponse<AuthSnapshot> {
    shell.auth.refresh_profile().await;
    ApiResponse::success(AuthSnapshot::from(&shell.auth.state()))
}

/// PUT /api/auth/profile
pub async fn update_profile(State(shell): State<ShellState>, Json(body): Json<ProfileBody>) -> ApiResult<AuthSnapshot> {
    shell.auth.update_profile(body.full_name).await?;
    Ok(ApiResponse::success(AuthSnapshot::from(&shell.auth.state())))
}
