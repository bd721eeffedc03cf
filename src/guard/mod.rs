//! Gates protected views on session presence and an optional role.

pub mod routes;

use serde::Serialize;
use url::form_urlencoded;

use crate::config::AuthConfig;
use crate::context::{AuthContext, AuthState, Notification, Notifier};
use crate::profile::User;
use crate::types::Role;

pub use routes::{match_route, RouteSpec, ROUTES};

/// Navigation instruction produced instead of rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub to: String,
    /// Originally requested location, for returning after login
    pub from: Option<String>,
    /// Replace the history entry rather than push one
    pub replace: bool,
}

impl Redirect {
    /// `to`, carrying `from` as a query parameter when present
    pub fn location(&self) -> String {
        match &self.from {
            Some(from) => {
                let encoded: String = form_urlencoded::byte_serialize(from.as_bytes()).collect();
                format!("{}?from={}", self.to, encoded)
            }
            None => self.to.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Resolution pending: neither the child nor a redirect
    Loading,
    RedirectToLogin(Redirect),
    AccessDenied(Redirect),
    Allow,
}

/// Outcome of guarding a child view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    Loading,
    Redirect(Redirect),
    Render(T),
}

pub struct RouteGuard {
    login_route: String,
    default_route: String,
    notifier: Notifier,
}

impl RouteGuard {
    pub fn new(ctx: &AuthContext) -> Self {
        Self::with_config(ctx.config(), ctx.notifier().clone())
    }

    pub fn with_config(config: &AuthConfig, notifier: Notifier) -> Self {
        Self {
            login_route: config.login_route.clone(),
            default_route: config.default_route.clone(),
            notifier,
        }
    }

    /// Pure decision for `location` under `state`
    pub fn decide(&self, state: &AuthState, location: &str, required: Option<Role>) -> GuardDecision {
        if state.is_loading() {
            return GuardDecision::Loading;
        }

        if state.user().is_none() {
            return GuardDecision::RedirectToLogin(Redirect {
                to: self.login_route.clone(),
                from: Some(location.to_string()),
                replace: true,
            });
        }

        match required {
            Some(role) if !state.flags().satisfies(role) => GuardDecision::AccessDenied(Redirect {
                to: self.default_route.clone(),
                from: None,
                replace: true,
            }),
            _ => GuardDecision::Allow,
        }
    }

    /// Render `child` only when allowed. A denied role check also emits one
    /// access-denied notification.
    pub fn guard<T, F>(&self, state: &AuthState, location: &str, required: Option<Role>, child: F) -> Guarded<T>
    where
        F: FnOnce(&User) -> T,
    {
        match self.decide(state, location, required) {
            GuardDecision::Loading => Guarded::Loading,
            GuardDecision::RedirectToLogin(redirect) => Guarded::Redirect(redirect),
            GuardDecision::AccessDenied(redirect) => {
                tracing::warn!(
                    "Access to '{}' denied: requires {:?}, have {:?}",
                    location,
                    required,
                    state.flags().role()
                );
                self.notifier.notify(Notification::access_denied());
                Guarded::Redirect(redirect)
            }
            GuardDecision::Allow => match state.user() {
                Some(user) => Guarded::Render(child(user)),
                None => Guarded::Loading,
            },
        }
    }

    /// Guard a path from the route table; unknown paths fall through as `None`
    pub fn guard_path<T, F>(&self, state: &AuthState, path: &str, child: F) -> Option<Guarded<T>>
    where
        F: FnOnce(&RouteSpec, Option<&User>) -> T,
    {
        let route = match_route(path)?;
        if route.public {
            return Some(Guarded::Render(child(route, state.user())));
        }
        Some(self.guard(state, path, route.required_role, |user| child(route, Some(user))))
    }
}

/// Where to go after a successful login: the remembered location, unless it
/// is missing or itself an auth page
pub fn post_login_target(from: Option<&str>, config: &AuthConfig) -> String {
    match from {
        Some(from) if from.starts_with('/') && !from.starts_with("//") && !match_route(from).is_some_and(|r| r.public) => {
            from.to_string()
        }
        _ => config.default_route.clone(),
    }
}
