//! Administrative account directory: profile rows joined with account emails

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::backend::{AccountIdentity, ProfileRecord};
use crate::context::AuthContext;
use crate::error::{ApiError, AuthError};
use crate::types::Role;

const UNKNOWN_EMAIL: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Attach each profile's account email, keeping the profile order
pub fn join_emails(profiles: Vec<ProfileRecord>, accounts: &[AccountIdentity]) -> Vec<DirectoryEntry> {
    let emails: HashMap<&str, &str> = accounts
        .iter()
        .filter_map(|a| a.email.as_deref().map(|email| (a.id.as_str(), email)))
        .collect();

    profiles
        .into_iter()
        .map(|p| DirectoryEntry {
            email: emails.get(p.id.as_str()).copied().unwrap_or(UNKNOWN_EMAIL).to_string(),
            id: p.id,
            full_name: p.full_name,
            role: p.role,
            created_at: p.created_at,
        })
        .collect()
}

/// List accounts, newest first. Only administrators may list.
pub async fn list_directory(ctx: &AuthContext, role: Option<Role>) -> Result<Vec<DirectoryEntry>, ApiError> {
    if !ctx.flags().is_admin {
        return Err(ApiError::forbidden("You don't have permission to access this page"));
    }

    let profiles = ctx.profiles().list_profiles(role).await.map_err(AuthError::from)?;
    let accounts = ctx.sessions().backend().list_accounts().await.map_err(AuthError::from)?;
    Ok(join_emails(profiles, &accounts))
}
