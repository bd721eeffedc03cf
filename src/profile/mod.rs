use serde::Serialize;
use std::sync::Arc;

use crate::backend::{ProfileRecord, ProfileStore, Session};
use crate::types::Role;

/// Role-bearing application profile. `id` always equals the owning
/// session's subject id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub id: String,
    pub full_name: Option<String>,
    pub role: Role,
}

impl Profile {
    /// Transient stand-in used until the record is provisioned. Never persisted.
    pub fn default_for(subject_id: &str) -> Self {
        Self {
            id: subject_id.to_string(),
            full_name: None,
            role: Role::Tenant,
        }
    }
}

impl From<ProfileRecord> for Profile {
    fn from(record: ProfileRecord) -> Self {
        Self {
            id: record.id,
            full_name: record.full_name,
            role: record.role,
        }
    }
}

/// Identity exposed to the rest of the application: session email plus profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Role,
}

impl User {
    pub fn from_parts(session: &Session, profile: &Profile) -> Self {
        Self {
            id: profile.id.clone(),
            email: session.email.clone(),
            full_name: profile.full_name.clone(),
            role: profile.role,
        }
    }
}

/// Maps a subject id to its profile record, degrading to a default profile
/// when the record is missing or the query fails.
#[derive(Clone)]
pub struct ProfileResolver {
    store: Arc<dyn ProfileStore>,
}

impl ProfileResolver {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// `None` for both "no record yet" and a failed query; failures are logged
    pub async fn fetch_profile(&self, subject_id: &str) -> Option<Profile> {
        match self.store.fetch_profile(subject_id).await {
            Ok(Some(record)) if record.id == subject_id => Some(record.into()),
            Ok(Some(record)) => {
                tracing::error!(
                    "Profile store returned record '{}' for subject '{}', ignoring it",
                    record.id,
                    subject_id
                );
                None
            }
            Ok(None) => {
                tracing::warn!("No profile record for subject '{}' yet", subject_id);
                None
            }
            Err(e) => {
                tracing::error!("Error fetching profile for subject '{}': {}", subject_id, e);
                None
            }
        }
    }

    /// Profile for the session's subject, synthesized when unavailable
    pub async fn resolve_profile(&self, session: &Session) -> Profile {
        self.fetch_profile(&session.subject_id)
            .await
            .unwrap_or_else(|| Profile::default_for(&session.subject_id))
    }

    pub async fn resolve_user(&self, session: &Session) -> User {
        let profile = self.resolve_profile(session).await;
        User::from_parts(session, &profile)
    }
}
