//! Seams to the hosted auth+database platform.
//!
//! The application owns no persistence: credentials, sessions and profile
//! records all live behind [`AuthBackend`] and [`ProfileStore`].

pub mod error;
pub mod hosted;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::types::Role;

pub use error::BackendError;
pub use hosted::HostedBackend;
pub use memory::InMemoryBackend;

/// Authenticated session issued by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Stable user id; profile records are keyed by it
    pub subject_id: String,
    pub email: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|at| at <= Utc::now()).unwrap_or(false)
    }
}

/// Session transitions in the order the backend emits them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    InitialSession(Option<Session>),
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
    UserUpdated(Session),
}

impl SessionEvent {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionEvent::InitialSession(session) => session.as_ref(),
            SessionEvent::SignedIn(session)
            | SessionEvent::TokenRefreshed(session)
            | SessionEvent::UserUpdated(session) => Some(session),
            SessionEvent::SignedOut => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::InitialSession(_) => "INITIAL_SESSION",
            SessionEvent::SignedIn(_) => "SIGNED_IN",
            SessionEvent::SignedOut => "SIGNED_OUT",
            SessionEvent::TokenRefreshed(_) => "TOKEN_REFRESHED",
            SessionEvent::UserUpdated(_) => "USER_UPDATED",
        }
    }
}

pub type SessionEventStream = BoxStream<'static, SessionEvent>;

/// Row of the `profiles` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
}

/// Signup payload; `full_name` and `role` are handed to backend-side
/// profile provisioning as user metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
}

/// Account as listed by the backend's administrative user listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdentity {
    pub id: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Session the backend currently considers valid, if any
    async fn current_session(&self) -> Result<Option<Session>, BackendError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    /// `Ok(None)` when the account was created but needs email confirmation
    async fn sign_up(&self, request: &SignUpRequest) -> Result<Option<Session>, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Stream of every session transition from now on
    fn subscribe(&self) -> SessionEventStream;

    /// Session held locally right now, without contacting the platform.
    /// Updated before the event announcing the change is emitted.
    fn cached_session(&self) -> Option<Session>;

    async fn list_accounts(&self) -> Result<Vec<AccountIdentity>, BackendError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// At most one record; `Ok(None)` when the subject has no profile yet
    async fn fetch_profile(&self, subject_id: &str) -> Result<Option<ProfileRecord>, BackendError>;

    async fn update_profile(&self, subject_id: &str, update: &ProfileUpdate) -> Result<(), BackendError>;

    /// Newest first, optionally restricted to one role
    async fn list_profiles(&self, role: Option<Role>) -> Result<Vec<ProfileRecord>, BackendError>;
}

/// Fan-out of session events to every live subscriber, preserving emission order
#[derive(Default)]
pub struct SessionEventHub {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
}

impl SessionEventHub {
    pub fn subscribe(&self) -> SessionEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers().push(tx);

        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        }))
    }

    pub fn emit(&self, event: SessionEvent) {
        tracing::debug!("Session event {}", event.kind());
        // Closed receivers belong to dropped subscriptions
        self.subscribers().retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().iter().filter(|tx| !tx.is_closed()).count()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<SessionEvent>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
